//! Transfer execution: the seam to the byte-moving backend.
//!
//! The queue manager never talks to the network itself; it hands dispatch
//! instructions to an executor. Implementations are blocking and run on the
//! blocking thread pool, resolving exactly once per transfer.

mod curl;

pub use curl::CurlExecutor;

use std::path::Path;
use thiserror::Error;

/// Error from a single transfer attempt. There are no retries; the queue
/// manager folds every failure into batch accounting the same as a success.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("HTTP status {0}")]
    HttpStatus(u32),
    #[error("curl: {0}")]
    Curl(#[from] ::curl::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Executes one transfer of `url` to the local path `dest`.
pub trait TransferExecutor: Send + Sync + 'static {
    fn execute(&self, url: &str, dest: &Path) -> Result<(), TransferError>;
}
