//! Control socket: server (during `pagemirror serve`) and line-protocol client.
//!
//! One request per line; every well-formed request is answered with a single
//! JSON reply line. A `watch` line switches the connection into event
//! streaming until the client disconnects. Malformed lines are dropped.

use anyhow::{Context, Result};
use pagemirror_core::control::{self, Reply, Request};
use pagemirror_core::event::Event;
use pagemirror_core::service::ServiceHandle;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

/// Spawns a task that listens on `path` and forwards requests into the
/// running service. Each connection gets its own task.
pub fn spawn_listener(
    service: ServiceHandle,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let handle = tokio::spawn(async move {
        let _ = std::fs::remove_file(&path);
        let listener = match UnixListener::bind(&path) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(path = %path.display(), "control socket bind: {}", e);
                return;
            }
        };
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let service = service.clone();
                    tokio::spawn(async move {
                        serve_connection(stream, service).await;
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve_connection(stream: UnixStream, service: ServiceHandle) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "watch" {
            stream_events(service.subscribe(), &mut write_half).await;
            return;
        }
        let Some(request) = Request::parse(line) else {
            tracing::debug!("dropping malformed control line: {}", line);
            continue;
        };
        let reply = match service.request(request).await {
            Ok(reply) => reply,
            Err(_) => return,
        };
        let Ok(json) = serde_json::to_string(&reply) else {
            return;
        };
        if write_line(&mut write_half, &json).await.is_err() {
            return;
        }
    }
}

async fn stream_events(
    mut events: broadcast::Receiver<Event>,
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let Ok(json) = serde_json::to_string(&event) else {
                    continue;
                };
                if write_line(write_half, &json).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("event subscriber lagged by {} event(s)", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn write_line(
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
    json: &str,
) -> std::io::Result<()> {
    write_half.write_all(format!("{json}\n").as_bytes()).await
}

/// Connects to the control socket, sends one request, reads the JSON reply.
pub async fn send_request(request: &Request) -> Result<Reply> {
    let path = control::default_socket_path()?;
    let mut stream = UnixStream::connect(&path).await.with_context(|| {
        format!(
            "connect to {} (is `pagemirror serve` running?)",
            path.display()
        )
    })?;
    stream
        .write_all(format!("{}\n", request.to_line()).as_bytes())
        .await?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        anyhow::bail!("service closed the connection without replying");
    }
    let reply: Reply =
        serde_json::from_str(line.trim()).context("malformed reply from service")?;
    Ok(reply)
}

/// Prints a reply in a form suitable for the terminal.
pub fn print_reply(reply: &Reply) {
    match reply {
        Reply::Status { status } => println!("{}", status.as_str()),
        Reply::Urls { urls } => {
            if urls.is_empty() {
                println!("no urls recorded");
            } else {
                for url in urls {
                    println!("{url}");
                }
            }
        }
        Reply::State { state } => {
            println!("detecting:      {}", state.is_detecting);
            println!(
                "active context: {}",
                state
                    .active_context_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!("downloading:    {}", state.is_downloading);
            println!(
                "progress:       {}/{}",
                state.downloaded_count, state.total_files
            );
        }
        Reply::Ack {} => println!("ok"),
    }
}
