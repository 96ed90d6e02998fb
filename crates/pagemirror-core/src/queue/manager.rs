//! FIFO dispatch under a fixed concurrency cap.
//!
//! Batch and manual transfers share one queue and one cap. Manual transfers
//! do not take part in batch accounting; their settlements are reported
//! individually by the service instead.

use std::collections::VecDeque;

use super::batch::{BatchPhase, BatchState};

/// Identifies one dispatched transfer.
pub type TransferId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Batch,
    Manual,
}

/// Terminal outcome of one transfer. Failures are not retried; every
/// outcome counts toward batch completion the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Complete,
    Interrupted,
    DispatchFailed,
}

/// Instruction to start one transfer. The caller spawns the executor task
/// and feeds the resolution back via [`QueueManager::on_settled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub id: TransferId,
    pub url: String,
    pub kind: TransferKind,
}

/// Resolution of a previously dispatched transfer.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub id: TransferId,
    pub url: String,
    pub kind: TransferKind,
    pub outcome: TransferOutcome,
}

/// What the caller must act on after a settlement was accounted.
#[derive(Debug, Default)]
pub struct Settled {
    /// Queue refill: new transfers to start.
    pub dispatches: Vec<Dispatch>,
    /// This settlement finished the batch; the terminal notification is due.
    pub batch_completed: bool,
    /// The last in-flight transfer of a cancelled batch drained; counters
    /// were reset to zero.
    pub cancelled_drained: bool,
}

/// The download queue manager.
///
/// Owns the pending queue, the in-flight count, and the batch counters.
/// Single-owner: the service loop is the only caller, so there is no
/// locking here.
#[derive(Debug)]
pub struct QueueManager {
    max_concurrent: usize,
    queue: VecDeque<(String, TransferKind)>,
    active_batch: usize,
    active_manual: usize,
    batch: BatchState,
    generation: u64,
    next_id: TransferId,
}

impl QueueManager {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            queue: VecDeque::new(),
            active_batch: 0,
            active_manual: 0,
            batch: BatchState::default(),
            generation: 0,
            next_id: 0,
        }
    }

    pub fn batch(&self) -> &BatchState {
        &self.batch
    }

    /// Transfers currently in flight (batch and manual).
    pub fn active(&self) -> usize {
        self.active_batch + self.active_manual
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Monotonic batch generation, bumped when a new batch starts. Guards
    /// the delayed counter reset against a batch started in the meantime.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queued batch URLs in dispatch order (persisted as the queue snapshot).
    pub fn queued_batch_urls(&self) -> Vec<String> {
        self.queue
            .iter()
            .filter(|(_, kind)| *kind == TransferKind::Batch)
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// Starts a new batch (or extends the running one) with `urls`, then
    /// drains the pipeline. `total` grows by the number of URLs enqueued.
    pub fn enqueue_batch(&mut self, urls: Vec<String>) -> Vec<Dispatch> {
        if !urls.is_empty() {
            if self.batch.phase != BatchPhase::Active {
                self.batch = BatchState {
                    total: 0,
                    completed: 0,
                    phase: BatchPhase::Active,
                };
                self.generation += 1;
            }
            self.batch.total += urls.len() as u64;
            for url in urls {
                self.queue.push_back((url, TransferKind::Batch));
            }
        }
        self.drain()
    }

    /// Enqueues one manual transfer. Shares the queue and the cap with the
    /// batch but stays out of its counters.
    pub fn enqueue_manual(&mut self, url: String) -> Vec<Dispatch> {
        self.queue.push_back((url, TransferKind::Manual));
        self.drain()
    }

    /// Accounts one settlement and refills the pipeline.
    pub fn on_settled(&mut self, settlement: &Settlement) -> Settled {
        let mut settled = Settled::default();
        match settlement.kind {
            TransferKind::Manual => {
                self.active_manual = self.active_manual.saturating_sub(1);
            }
            TransferKind::Batch => {
                self.active_batch = self.active_batch.saturating_sub(1);
                settled.batch_completed = self.batch.settle();
                if self.batch.phase == BatchPhase::Cancelled && self.active_batch == 0 {
                    self.batch.reset();
                    settled.cancelled_drained = true;
                }
            }
        }
        settled.dispatches = self.drain();
        settled
    }

    /// Stops pulling new batch items and drops the queued backlog. In-flight
    /// transfers are not recalled; they settle normally, freeing their slot
    /// and still counting toward `completed`. Counters reset once the last
    /// in-flight transfer has drained (immediately if none is).
    /// Returns the number of queued URLs dropped.
    pub fn cancel_batch(&mut self) -> usize {
        let before = self.queue.len();
        self.queue.retain(|(_, kind)| *kind == TransferKind::Manual);
        let dropped = before - self.queue.len();
        if self.batch.phase == BatchPhase::Active {
            if self.active_batch == 0 {
                self.batch.reset();
            } else {
                self.batch.phase = BatchPhase::Cancelled;
            }
        }
        dropped
    }

    /// Resets batch counters after the completion grace delay. No-op unless
    /// the generation still matches and the batch is in its terminal phase.
    pub fn reset_if_generation(&mut self, generation: u64) -> bool {
        if self.generation == generation && self.batch.phase == BatchPhase::Completed {
            self.batch.reset();
            return true;
        }
        false
    }

    fn drain(&mut self) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();
        while self.active() < self.max_concurrent {
            let Some((url, kind)) = self.queue.pop_front() else {
                break;
            };
            match kind {
                TransferKind::Batch => self.active_batch += 1,
                TransferKind::Manual => self.active_manual += 1,
            }
            let id = self.next_id;
            self.next_id += 1;
            dispatches.push(Dispatch { id, url, kind });
        }
        dispatches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(dispatch: &Dispatch, outcome: TransferOutcome) -> Settlement {
        Settlement {
            id: dispatch.id,
            url: dispatch.url.clone(),
            kind: dispatch.kind,
            outcome,
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://example.com/{i}")).collect()
    }

    #[test]
    fn cap_limits_initial_dispatch() {
        let mut manager = QueueManager::new(5);
        let dispatches = manager.enqueue_batch(urls(12));
        assert_eq!(dispatches.len(), 5);
        assert_eq!(manager.active(), 5);
        assert_eq!(manager.queued(), 7);
        assert_eq!(manager.batch().total, 12);
    }

    #[test]
    fn dispatch_order_is_fifo() {
        let mut manager = QueueManager::new(2);
        let first = manager.enqueue_batch(urls(4));
        assert_eq!(first[0].url, "https://example.com/0");
        assert_eq!(first[1].url, "https://example.com/1");

        let next = manager.on_settled(&settle(&first[1], TransferOutcome::Complete));
        assert_eq!(next.dispatches.len(), 1);
        assert_eq!(next.dispatches[0].url, "https://example.com/2");
    }

    #[test]
    fn settlement_refills_one_slot() {
        let mut manager = QueueManager::new(5);
        let dispatches = manager.enqueue_batch(urls(8));
        let settled = manager.on_settled(&settle(&dispatches[0], TransferOutcome::Complete));
        assert_eq!(settled.dispatches.len(), 1);
        assert_eq!(manager.active(), 5);
        assert!(!settled.batch_completed);
    }

    #[test]
    fn batch_completes_exactly_once_in_any_order() {
        let mut manager = QueueManager::new(5);
        let mut outstanding = manager.enqueue_batch(urls(7));
        let mut completions = 0;
        // Settle out of dispatch order: always resolve the newest first.
        while let Some(dispatch) = outstanding.pop() {
            let outcome = if dispatch.url.ends_with('3') {
                TransferOutcome::Interrupted
            } else {
                TransferOutcome::Complete
            };
            let settled = manager.on_settled(&settle(&dispatch, outcome));
            outstanding.extend(settled.dispatches);
            if settled.batch_completed {
                completions += 1;
            }
            assert!(manager.active() <= 5);
            assert!(manager.batch().completed <= manager.batch().total);
        }
        assert_eq!(completions, 1);
        assert_eq!(manager.batch().completed, 7);
        assert_eq!(manager.batch().phase, BatchPhase::Completed);
    }

    #[test]
    fn failures_count_toward_completion() {
        let mut manager = QueueManager::new(5);
        let dispatches = manager.enqueue_batch(urls(2));
        manager.on_settled(&settle(&dispatches[0], TransferOutcome::DispatchFailed));
        let settled = manager.on_settled(&settle(&dispatches[1], TransferOutcome::Interrupted));
        assert!(settled.batch_completed);
        assert_eq!(manager.batch().completed, 2);
    }

    #[test]
    fn enqueue_during_active_batch_extends_total() {
        let mut manager = QueueManager::new(5);
        manager.enqueue_batch(urls(3));
        let generation = manager.generation();
        manager.enqueue_batch(vec!["https://example.com/extra".to_string()]);
        assert_eq!(manager.batch().total, 4);
        assert_eq!(manager.generation(), generation);
    }

    #[test]
    fn cancel_stops_dispatch_but_in_flight_still_settle() {
        let mut manager = QueueManager::new(2);
        let dispatches = manager.enqueue_batch(urls(6));
        assert_eq!(dispatches.len(), 2);

        let dropped = manager.cancel_batch();
        assert_eq!(dropped, 4);
        assert_eq!(manager.queued(), 0);
        assert_eq!(manager.batch().phase, BatchPhase::Cancelled);

        let first = manager.on_settled(&settle(&dispatches[0], TransferOutcome::Complete));
        assert!(first.dispatches.is_empty());
        assert!(!first.batch_completed);
        assert!(!first.cancelled_drained);
        assert_eq!(manager.batch().completed, 1);

        let last = manager.on_settled(&settle(&dispatches[1], TransferOutcome::Complete));
        assert!(last.cancelled_drained);
        assert!(!last.batch_completed);
        assert_eq!(manager.batch(), &BatchState::default());
    }

    #[test]
    fn cancel_with_nothing_in_flight_resets_immediately() {
        let mut manager = QueueManager::new(1);
        let manual = manager.enqueue_manual("https://example.com/manual".to_string());
        assert_eq!(manual.len(), 1);

        // The manual transfer holds the only slot, so the whole batch queues.
        assert!(manager.enqueue_batch(urls(2)).is_empty());
        assert_eq!(manager.cancel_batch(), 2);
        assert_eq!(manager.batch(), &BatchState::default());
        assert_eq!(manager.active(), 1);
    }

    #[test]
    fn manual_shares_cap_but_not_counters() {
        let mut manager = QueueManager::new(2);
        let dispatches = manager.enqueue_batch(urls(2));
        assert_eq!(manager.active(), 2);

        // Cap is full: the manual transfer waits for a slot.
        assert!(manager
            .enqueue_manual("https://example.com/manual".to_string())
            .is_empty());
        let settled = manager.on_settled(&settle(&dispatches[0], TransferOutcome::Complete));
        assert_eq!(settled.dispatches.len(), 1);
        assert_eq!(settled.dispatches[0].kind, TransferKind::Manual);
        assert_eq!(manager.batch().total, 2);

        // Manual settlement leaves batch counters alone.
        let manual = settle(&settled.dispatches[0], TransferOutcome::Complete);
        let after = manager.on_settled(&manual);
        assert!(!after.batch_completed);
        assert_eq!(manager.batch().completed, 1);
    }

    #[test]
    fn delayed_reset_skipped_when_new_batch_started() {
        let mut manager = QueueManager::new(5);
        let dispatches = manager.enqueue_batch(urls(1));
        let generation = manager.generation();
        let settled = manager.on_settled(&settle(&dispatches[0], TransferOutcome::Complete));
        assert!(settled.batch_completed);

        // A new batch starts before the grace delay fires.
        manager.enqueue_batch(urls(2));
        assert!(!manager.reset_if_generation(generation));
        assert_eq!(manager.batch().total, 2);
    }

    #[test]
    fn queued_batch_urls_snapshot() {
        let mut manager = QueueManager::new(1);
        manager.enqueue_batch(urls(3));
        manager.enqueue_manual("https://example.com/manual".to_string());
        assert_eq!(
            manager.queued_batch_urls(),
            vec![
                "https://example.com/1".to_string(),
                "https://example.com/2".to_string()
            ]
        );
    }
}
