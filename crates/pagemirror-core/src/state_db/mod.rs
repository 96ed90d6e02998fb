//! Persistent session state (SQLite via sqlx).
//!
//! Write-through mirror of the detection flags, batch progress counters,
//! the queued-URL snapshot, and per-context URL lists. The service is the
//! only writer; reads happen once at startup to restore a session.

mod db;
mod session;

pub use db::StateDb;
pub use session::SessionRow;
