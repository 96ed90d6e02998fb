//! Control protocol shared by the service and its clients.
//!
//! Requests travel as single text lines (`start-detecting 12`); every
//! request is answered with one JSON-encoded [`Reply`] line. Replies carry
//! a one-word status, a URL list, or a session snapshot.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque identifier of the browsing context (tab) a request belongs to.
pub type ContextId = i64;

/// Inbound control request, one per socket line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    StartDetecting { context_id: ContextId },
    StopDetecting,
    GetRequests,
    ClearRequests,
    GetState,
    StartDownload,
    StopDownload,
    ManualDownload { url: String },
    /// Request Observer feed: one completed network fetch seen by the page.
    Observed { context_id: ContextId, url: String },
    /// The browsing context went away; its recorded URLs are dropped.
    ContextClosed { context_id: ContextId },
}

impl Request {
    /// Parses one protocol line. Returns `None` for unknown or malformed
    /// input; the server drops such lines without replying.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (cmd, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };
        match cmd {
            "start-detecting" => {
                let context_id = rest.parse().ok()?;
                Some(Request::StartDetecting { context_id })
            }
            "stop-detecting" => Some(Request::StopDetecting),
            "get-requests" => Some(Request::GetRequests),
            "clear-requests" => Some(Request::ClearRequests),
            "get-state" => Some(Request::GetState),
            "start-download" => Some(Request::StartDownload),
            "stop-download" => Some(Request::StopDownload),
            "manual-download" if !rest.is_empty() => Some(Request::ManualDownload {
                url: rest.to_string(),
            }),
            "observed" => {
                let (context_id, url) = rest.split_once(' ')?;
                let context_id = context_id.trim().parse().ok()?;
                let url = url.trim();
                if url.is_empty() {
                    return None;
                }
                Some(Request::Observed {
                    context_id,
                    url: url.to_string(),
                })
            }
            "context-closed" => {
                let context_id = rest.parse().ok()?;
                Some(Request::ContextClosed { context_id })
            }
            _ => None,
        }
    }

    /// Serializes back to the protocol line (client side).
    pub fn to_line(&self) -> String {
        match self {
            Request::StartDetecting { context_id } => format!("start-detecting {context_id}"),
            Request::StopDetecting => "stop-detecting".to_string(),
            Request::GetRequests => "get-requests".to_string(),
            Request::ClearRequests => "clear-requests".to_string(),
            Request::GetState => "get-state".to_string(),
            Request::StartDownload => "start-download".to_string(),
            Request::StopDownload => "stop-download".to_string(),
            Request::ManualDownload { url } => format!("manual-download {url}"),
            Request::Observed { context_id, url } => format!("observed {context_id} {url}"),
            Request::ContextClosed { context_id } => format!("context-closed {context_id}"),
        }
    }
}

/// One-word status outcomes mirrored back to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Detecting,
    AlreadyDetecting,
    Stopped,
    NotDetecting,
    Cleared,
    DownloadStarted,
    DownloadNotStarted,
    DownloadStopped,
    DownloadNotActive,
    ManualDownloadStarted,
    InvalidUrl,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Detecting => "detecting",
            Status::AlreadyDetecting => "already_detecting",
            Status::Stopped => "stopped",
            Status::NotDetecting => "not_detecting",
            Status::Cleared => "cleared",
            Status::DownloadStarted => "download_started",
            Status::DownloadNotStarted => "download_not_started",
            Status::DownloadStopped => "download_stopped",
            Status::DownloadNotActive => "download_not_active",
            Status::ManualDownloadStarted => "manual_download_started",
            Status::InvalidUrl => "invalid_url",
        }
    }
}

/// Session snapshot returned by `get-state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub is_detecting: bool,
    pub active_context_id: Option<ContextId>,
    pub is_downloading: bool,
    pub downloaded_count: u64,
    pub total_files: u64,
}

/// Reply to one request, sent as a single JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Status { status: Status },
    Urls { urls: Vec<String> },
    State { state: StateSnapshot },
    /// Acknowledgement for feed messages (`observed`, `context-closed`).
    Ack {},
}

impl Reply {
    pub fn status(status: Status) -> Self {
        Reply::Status { status }
    }
}

/// Default path for the control socket (same XDG state dir as the DB).
pub fn default_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("pagemirror")?.get_state_home();
    Ok(dir.join("control.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        let requests = [
            Request::StartDetecting { context_id: 12 },
            Request::StopDetecting,
            Request::GetRequests,
            Request::ClearRequests,
            Request::GetState,
            Request::StartDownload,
            Request::StopDownload,
            Request::ManualDownload {
                url: "https://example.com/a.png".to_string(),
            },
            Request::Observed {
                context_id: 3,
                url: "https://example.com/x".to_string(),
            },
            Request::ContextClosed { context_id: 7 },
        ];
        for request in requests {
            assert_eq!(Request::parse(&request.to_line()), Some(request));
        }
    }

    #[test]
    fn parse_keeps_spaces_in_manual_url() {
        // A malformed URL still travels whole; the service settles it as failed.
        assert_eq!(
            Request::parse("manual-download not a url"),
            Some(Request::ManualDownload {
                url: "not a url".to_string()
            })
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Request::parse(""), None);
        assert_eq!(Request::parse("start-detecting"), None);
        assert_eq!(Request::parse("start-detecting abc"), None);
        assert_eq!(Request::parse("observed 3"), None);
        assert_eq!(Request::parse("frobnicate"), None);
    }

    #[test]
    fn status_strings() {
        assert_eq!(Status::Detecting.as_str(), "detecting");
        assert_eq!(Status::AlreadyDetecting.as_str(), "already_detecting");
        assert_eq!(Status::DownloadNotActive.as_str(), "download_not_active");
        assert_eq!(Status::ManualDownloadStarted.as_str(), "manual_download_started");
        assert_eq!(Status::InvalidUrl.as_str(), "invalid_url");
    }

    #[test]
    fn reply_json_shape() {
        let json = serde_json::to_string(&Reply::status(Status::DownloadStarted)).unwrap();
        assert_eq!(json, r#"{"reply":"status","status":"download_started"}"#);

        let json = serde_json::to_string(&Reply::Urls {
            urls: vec!["https://example.com/".to_string()],
        })
        .unwrap();
        assert_eq!(json, r#"{"reply":"urls","urls":["https://example.com/"]}"#);
    }
}
