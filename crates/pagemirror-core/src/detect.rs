//! Detection sessions: record distinct resource URLs per browsing context.
//!
//! The session is a small state machine driven only by control requests;
//! observer events append URLs while detection is active but never change
//! the phase. Insertion order is preserved for display.

use std::collections::{HashMap, HashSet};

use crate::control::ContextId;

/// Phase of the detect → download cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Detecting,
    ReadyToDownload,
    Downloading,
}

/// Insertion-ordered set of URLs recorded for one context.
#[derive(Debug, Clone, Default)]
pub struct UrlSet {
    urls: Vec<String>,
    seen: HashSet<String>,
}

impl UrlSet {
    /// Appends `url` if not already present. Returns true when newly inserted.
    pub fn insert(&mut self, url: &str) -> bool {
        if self.seen.contains(url) {
            return false;
        }
        self.seen.insert(url.to_string());
        self.urls.push(url.to_string());
        true
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl FromIterator<String> for UrlSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        let mut set = UrlSet::default();
        for url in iter {
            set.insert(&url);
        }
        set
    }
}

/// State machine driving one detect → download cycle.
#[derive(Debug, Default)]
pub struct DetectionSession {
    phase: SessionPhase,
    active_context: Option<ContextId>,
    sets: HashMap<ContextId, UrlSet>,
}

impl DetectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn active_context(&self) -> Option<ContextId> {
        self.active_context
    }

    /// Enters `Detecting` for `context_id`, clearing any prior set for it.
    /// Returns false when detection is already active.
    pub fn start_detecting(&mut self, context_id: ContextId) -> bool {
        if self.phase == SessionPhase::Detecting {
            return false;
        }
        self.phase = SessionPhase::Detecting;
        self.active_context = Some(context_id);
        self.sets.insert(context_id, UrlSet::default());
        true
    }

    /// Leaves `Detecting`. Returns false when detection was not active.
    /// With no recorded URLs the session falls back to `Idle` rather than
    /// offering an empty download.
    pub fn stop_detecting(&mut self) -> bool {
        if self.phase != SessionPhase::Detecting {
            return false;
        }
        self.phase = if self.active_set().is_some_and(|s| !s.is_empty()) {
            SessionPhase::ReadyToDownload
        } else {
            SessionPhase::Idle
        };
        true
    }

    /// Records one observed request. Appends only while `Detecting`.
    /// Returns true when the URL is new for its context.
    pub fn record(&mut self, context_id: ContextId, url: &str) -> bool {
        if self.phase != SessionPhase::Detecting {
            return false;
        }
        self.sets.entry(context_id).or_default().insert(url)
    }

    /// URLs recorded for the active context, in insertion order.
    pub fn active_urls(&self) -> Vec<String> {
        self.active_set().map(|s| s.urls().to_vec()).unwrap_or_default()
    }

    /// Snapshots the active context's URLs and enters `Downloading`.
    /// Returns `None` while detecting, while a batch is running, or when
    /// there is nothing to download.
    pub fn begin_download(&mut self) -> Option<Vec<String>> {
        if matches!(self.phase, SessionPhase::Detecting | SessionPhase::Downloading) {
            return None;
        }
        let urls = self.active_urls();
        if urls.is_empty() {
            return None;
        }
        self.phase = SessionPhase::Downloading;
        Some(urls)
    }

    /// Leaves `Downloading` after the batch completed or was cancelled.
    pub fn finish_download(&mut self) {
        if self.phase == SessionPhase::Downloading {
            self.phase = SessionPhase::Idle;
        }
    }

    /// Drops all recorded URL sets. Batch counters live elsewhere and are
    /// deliberately untouched. Detection, if active, keeps running.
    pub fn clear(&mut self) {
        self.sets.clear();
        if self.phase == SessionPhase::ReadyToDownload {
            self.phase = SessionPhase::Idle;
        }
    }

    /// Drops the URL set of a closed context.
    pub fn context_closed(&mut self, context_id: ContextId) {
        self.sets.remove(&context_id);
    }

    /// Restores persisted per-context sets at startup. A non-empty set for
    /// the restored active context makes the session ready to download again.
    pub fn restore(
        &mut self,
        active_context: Option<ContextId>,
        contexts: Vec<(ContextId, Vec<String>)>,
    ) {
        self.sets = contexts
            .into_iter()
            .map(|(id, urls)| (id, urls.into_iter().collect()))
            .collect();
        self.active_context = active_context;
        self.phase = if self.active_set().is_some_and(|s| !s.is_empty()) {
            SessionPhase::ReadyToDownload
        } else {
            SessionPhase::Idle
        };
    }

    fn active_set(&self) -> Option<&UrlSet> {
        self.active_context.and_then(|id| self.sets.get(&id))
    }
}
