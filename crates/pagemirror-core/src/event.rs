//! Outbound service events, broadcast to `watch` subscribers.
//!
//! Consumers render these however they like (progress line, desktop alert);
//! the service itself never blocks on a slow or absent subscriber.

use serde::{Deserialize, Serialize};

use crate::control::ContextId;

/// One event emitted by the service, serialized as a JSON line on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Batch progress after each settled transfer (and once at batch start).
    DownloadProgress {
        downloaded_count: u64,
        total_files: u64,
    },
    /// The batch reached its total; follows the terminal notification.
    DownloadComplete {},
    /// A URL was recorded for a context during detection.
    NewUrl { context_id: ContextId, url: String },
    /// User-facing alert (batch completion, stop, manual download result).
    Notification { title: String, message: String },
}
