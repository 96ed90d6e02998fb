//! Download queue management.
//!
//! The manager is a pure state machine: it hands out dispatch instructions
//! and accounts settlements, while all task spawning and channel plumbing
//! lives in the service loop. This keeps the concurrency-cap and batch
//! accounting logic directly testable.

mod batch;
mod manager;

pub use batch::{BatchPhase, BatchState};
pub use manager::{
    Dispatch, QueueManager, Settled, Settlement, TransferId, TransferKind, TransferOutcome,
};
