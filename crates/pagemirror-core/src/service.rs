//! Background service: one event loop owning detection and downloads.
//!
//! All mutable state (the detection session, the queue manager, the
//! counters) is owned by the loop task. Control requests and transfer
//! settlements arrive over a single mpsc channel, so settlement order is
//! whatever order the executor tasks finish in. Transfers run on the
//! blocking pool and resolve exactly once back into the loop. The state DB
//! is a write-through mirror: persistence failures are logged, never fatal.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::MirrorConfig;
use crate::control::{Reply, Request, StateSnapshot, Status};
use crate::detect::{DetectionSession, SessionPhase};
use crate::event::Event;
use crate::executor::TransferExecutor;
use crate::mirror_path::mirror_path;
use crate::queue::{BatchPhase, Dispatch, QueueManager, Settlement, TransferKind, TransferOutcome};
use crate::state_db::{SessionRow, StateDb};

/// Message consumed by the service loop.
enum Msg {
    Request {
        request: Request,
        reply: oneshot::Sender<Reply>,
    },
    Settled(Settlement),
    ResetBatch {
        generation: u64,
    },
    Shutdown,
}

/// Cheap cloneable handle for talking to a running service.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Msg>,
    events: broadcast::Sender<Event>,
}

impl ServiceHandle {
    /// Sends one control request and awaits its reply.
    pub async fn request(&self, request: Request) -> Result<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Msg::Request {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("service stopped"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("service dropped the request"))
    }

    /// Subscribes to outbound events (progress, notifications, new URLs).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Asks the loop to exit after draining already-queued messages.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Msg::Shutdown).await;
    }
}

/// The mirroring service. Built once, then consumed by [`MirrorService::run`].
pub struct MirrorService {
    db: StateDb,
    executor: Arc<dyn TransferExecutor>,
    session: DetectionSession,
    manager: QueueManager,
    destination_root: PathBuf,
    reset_delay: Duration,
    rx: mpsc::Receiver<Msg>,
    tx: mpsc::Sender<Msg>,
    events: broadcast::Sender<Event>,
}

impl MirrorService {
    /// Builds a service and its handle, restoring persisted context URL
    /// sets. Stale flags from a previous process are reset first.
    pub async fn new(
        cfg: MirrorConfig,
        db: StateDb,
        executor: Arc<dyn TransferExecutor>,
    ) -> Result<(Self, ServiceHandle)> {
        db.recover_session().await?;
        let row = db.load_session().await?;
        let contexts = db.load_context_urls().await?;
        let mut session = DetectionSession::new();
        session.restore(row.active_context_id, contexts);

        let (tx, rx) = mpsc::channel(64);
        let (events, _) = broadcast::channel(256);
        let handle = ServiceHandle {
            tx: tx.clone(),
            events: events.clone(),
        };
        let service = MirrorService {
            db,
            executor,
            session,
            manager: QueueManager::new(cfg.max_concurrent_downloads),
            destination_root: cfg.destination_root,
            reset_delay: Duration::from_millis(cfg.batch_reset_delay_ms),
            rx,
            tx,
            events,
        };
        Ok((service, handle))
    }

    /// Runs the loop until a shutdown message arrives.
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                Msg::Request { request, reply } => {
                    let outcome = self.handle_request(request).await;
                    let _ = reply.send(outcome);
                }
                Msg::Settled(settlement) => self.handle_settled(settlement).await,
                Msg::ResetBatch { generation } => self.handle_reset(generation).await,
                Msg::Shutdown => break,
            }
        }
    }

    async fn handle_request(&mut self, request: Request) -> Reply {
        match request {
            Request::StartDetecting { context_id } => {
                if self.session.start_detecting(context_id) {
                    if let Err(e) = self.db.clear_context_urls(context_id).await {
                        tracing::warn!("state mirror write failed: {}", e);
                    }
                    self.persist_session().await;
                    tracing::info!("detection started for context {}", context_id);
                    Reply::status(Status::Detecting)
                } else {
                    Reply::status(Status::AlreadyDetecting)
                }
            }
            Request::StopDetecting => {
                if self.session.stop_detecting() {
                    self.persist_session().await;
                    tracing::info!(
                        "detection stopped with {} url(s) recorded",
                        self.session.active_urls().len()
                    );
                    Reply::status(Status::Stopped)
                } else {
                    Reply::status(Status::NotDetecting)
                }
            }
            Request::GetRequests => Reply::Urls {
                urls: self.session.active_urls(),
            },
            Request::ClearRequests => {
                self.session.clear();
                if let Err(e) = self.db.clear_all_context_urls().await {
                    tracing::warn!("state mirror write failed: {}", e);
                }
                self.persist_session().await;
                Reply::status(Status::Cleared)
            }
            Request::GetState => Reply::State {
                state: self.snapshot(),
            },
            Request::StartDownload => {
                // A cancelled batch may still have transfers draining; a new
                // batch must not start until its counters have reset.
                if self.manager.batch().phase == BatchPhase::Cancelled {
                    return Reply::status(Status::DownloadNotStarted);
                }
                match self.session.begin_download() {
                    Some(urls) => {
                        tracing::info!("starting batch of {} file(s)", urls.len());
                        let dispatches = self.manager.enqueue_batch(urls);
                        self.spawn_dispatches(dispatches);
                        self.persist_session().await;
                        self.emit_progress();
                        Reply::status(Status::DownloadStarted)
                    }
                    None => Reply::status(Status::DownloadNotStarted),
                }
            }
            Request::StopDownload => {
                if self.session.phase() == SessionPhase::Downloading {
                    let dropped = self.manager.cancel_batch();
                    self.session.finish_download();
                    tracing::info!("batch stopped, {} queued url(s) dropped", dropped);
                    self.persist_session().await;
                    self.emit(Event::Notification {
                        title: "Download stopped".to_string(),
                        message: "Remaining files will not be downloaded.".to_string(),
                    });
                    Reply::status(Status::DownloadStopped)
                } else {
                    Reply::status(Status::DownloadNotActive)
                }
            }
            Request::ManualDownload { url } => {
                if mirror_path(&url, &self.destination_root).is_err() {
                    return Reply::status(Status::InvalidUrl);
                }
                let dispatches = self.manager.enqueue_manual(url);
                self.spawn_dispatches(dispatches);
                Reply::status(Status::ManualDownloadStarted)
            }
            Request::Observed { context_id, url } => {
                if self.session.record(context_id, &url) {
                    if let Err(e) = self.db.append_context_url(context_id, &url).await {
                        tracing::warn!("state mirror write failed: {}", e);
                    }
                    tracing::debug!("url recorded for context {}: {}", context_id, url);
                    self.emit(Event::NewUrl { context_id, url });
                }
                Reply::Ack {}
            }
            Request::ContextClosed { context_id } => {
                self.session.context_closed(context_id);
                if let Err(e) = self.db.clear_context_urls(context_id).await {
                    tracing::warn!("state mirror write failed: {}", e);
                }
                tracing::debug!("urls cleared for closed context {}", context_id);
                Reply::Ack {}
            }
        }
    }

    async fn handle_settled(&mut self, settlement: Settlement) {
        let settled = self.manager.on_settled(&settlement);
        match settlement.kind {
            TransferKind::Manual => {
                let (title, message) = match settlement.outcome {
                    TransferOutcome::Complete => (
                        "Download complete",
                        format!("Downloaded {}", settlement.url),
                    ),
                    _ => (
                        "Download failed",
                        format!("Could not download {}", settlement.url),
                    ),
                };
                self.emit(Event::Notification {
                    title: title.to_string(),
                    message,
                });
            }
            TransferKind::Batch => {
                self.persist_progress().await;
                self.emit_progress();
                if settled.batch_completed {
                    let batch = self.manager.batch();
                    tracing::info!("batch completed ({}/{})", batch.completed, batch.total);
                    self.emit(Event::Notification {
                        title: "Download complete".to_string(),
                        message: "All files have been downloaded successfully.".to_string(),
                    });
                    self.emit(Event::DownloadComplete {});
                    self.session.finish_download();
                    self.persist_session().await;
                    self.schedule_reset();
                }
                if settled.cancelled_drained {
                    self.persist_progress().await;
                }
            }
        }
        self.spawn_dispatches(settled.dispatches);
    }

    async fn handle_reset(&mut self, generation: u64) {
        if self.manager.reset_if_generation(generation) {
            self.persist_progress().await;
            tracing::debug!("batch counters reset");
        }
    }

    /// Spawns one task per dispatch. Each task resolves exactly once by
    /// sending a settlement back into the loop; a URL that fails path
    /// derivation settles immediately without reaching the executor.
    fn spawn_dispatches(&self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            let tx = self.tx.clone();
            let executor = Arc::clone(&self.executor);
            let root = self.destination_root.clone();
            tokio::spawn(async move {
                let outcome = match mirror_path(&dispatch.url, &root) {
                    Err(e) => {
                        tracing::warn!("skipping transfer: {}", e);
                        TransferOutcome::DispatchFailed
                    }
                    Ok(dest) => {
                        let url = dispatch.url.clone();
                        let task =
                            tokio::task::spawn_blocking(move || executor.execute(&url, &dest));
                        match task.await {
                            Ok(Ok(())) => {
                                tracing::debug!("transfer complete: {}", dispatch.url);
                                TransferOutcome::Complete
                            }
                            Ok(Err(e)) => {
                                tracing::warn!("transfer interrupted for {}: {}", dispatch.url, e);
                                TransferOutcome::Interrupted
                            }
                            Err(e) => {
                                tracing::error!("transfer task join: {}", e);
                                TransferOutcome::DispatchFailed
                            }
                        }
                    }
                };
                let _ = tx
                    .send(Msg::Settled(Settlement {
                        id: dispatch.id,
                        url: dispatch.url,
                        kind: dispatch.kind,
                        outcome,
                    }))
                    .await;
            });
        }
    }

    /// Schedules the post-completion counter reset; the generation guard
    /// keeps a batch started inside the grace window from being clobbered.
    fn schedule_reset(&self) {
        let generation = self.manager.generation();
        let delay = self.reset_delay;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Msg::ResetBatch { generation }).await;
        });
    }

    fn snapshot(&self) -> StateSnapshot {
        let batch = self.manager.batch();
        StateSnapshot {
            is_detecting: self.session.phase() == SessionPhase::Detecting,
            active_context_id: self.session.active_context(),
            is_downloading: self.session.phase() == SessionPhase::Downloading,
            downloaded_count: batch.completed,
            total_files: batch.total,
        }
    }

    async fn persist_session(&self) {
        let batch = self.manager.batch();
        let row = SessionRow {
            is_detecting: self.session.phase() == SessionPhase::Detecting,
            active_context_id: self.session.active_context(),
            is_downloading: self.session.phase() == SessionPhase::Downloading,
            downloaded_count: batch.completed as i64,
            total_files: batch.total as i64,
            download_queue: self.manager.queued_batch_urls(),
        };
        if let Err(e) = self.db.save_session(&row).await {
            tracing::warn!("state mirror write failed: {}", e);
        }
    }

    async fn persist_progress(&self) {
        let batch = self.manager.batch();
        if let Err(e) = self
            .db
            .save_progress(
                batch.completed as i64,
                batch.total as i64,
                &self.manager.queued_batch_urls(),
            )
            .await
        {
            tracing::warn!("state mirror write failed: {}", e);
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    fn emit_progress(&self) {
        let batch = self.manager.batch();
        self.emit(Event::DownloadProgress {
            downloaded_count: batch.completed,
            total_files: batch.total,
        });
    }
}
