//! `pagemirror watch` – stream service events to stdout.

use anyhow::{Context, Result};
use pagemirror_core::control;
use pagemirror_core::event::Event;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub async fn run_watch() -> Result<()> {
    let path = control::default_socket_path()?;
    let mut stream = UnixStream::connect(&path).await.with_context(|| {
        format!(
            "connect to {} (is `pagemirror serve` running?)",
            path.display()
        )
    })?;
    stream.write_all(b"watch\n").await?;

    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        let Ok(event) = serde_json::from_str::<Event>(line.trim()) else {
            continue;
        };
        render(&event);
    }
    Ok(())
}

fn render(event: &Event) {
    match event {
        Event::DownloadProgress {
            downloaded_count,
            total_files,
        } => {
            let pct = if *total_files > 0 {
                downloaded_count * 100 / total_files
            } else {
                0
            };
            println!("{:>3}% ({}/{})", pct, downloaded_count, total_files);
        }
        Event::DownloadComplete {} => println!("download complete"),
        Event::NewUrl { context_id, url } => println!("new url [{}] {}", context_id, url),
        Event::Notification { title, message } => println!("{}: {}", title, message),
    }
}
