//! In-memory tracker.
//!
//! Keeps every delivered event in memory. Handy as a stand-in backend in
//! application tests where the real SDK must not be called. Cloning the
//! tracker yields a handle to the same storage, so a test can keep one clone
//! and register the other.

use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tokio::sync::Notify;

use crate::{
    event::Event,
    tracker::{Tracker, TrackerError, TrackerId, TrackerResult},
};

#[derive(Default)]
struct Recorded {
    events: Vec<Event>,
    errors: Vec<TrackerError>,
}

#[derive(Clone)]
pub struct MemoryTracker {
    id: TrackerId,
    name: String,
    enabled: Arc<AtomicBool>,
    recorded: Arc<Mutex<Recorded>>,
    delivered: Arc<Notify>,
}

impl MemoryTracker {
    pub fn new(id: impl Into<TrackerId>) -> Self {
        Self::with_name(id, "MemoryTracker")
    }

    pub fn with_name(id: impl Into<TrackerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: Arc::new(AtomicBool::new(true)),
            recorded: Arc::new(Mutex::new(Recorded::default())),
            delivered: Arc::new(Notify::new()),
        }
    }

    pub fn disabled(self) -> Self {
        self.set_enabled(false);
        self
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Events received so far, in arrival order.
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Errors passed to `handle_error` so far.
    pub fn errors(&self) -> Vec<TrackerError> {
        self.lock().errors.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    pub fn clear(&self) {
        let mut recorded = self.lock();
        recorded.events.clear();
        recorded.errors.clear();
    }

    /// Waits until at least `count` events have been recorded.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.delivered.notified();
            if self.len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        // poisoning ignored, records are append-only
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Tracker for MemoryTracker {
    fn id(&self) -> &TrackerId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn deliver(&self, event: &Event) -> TrackerResult<()> {
        self.lock().events.push(event.clone());
        self.delivered.notify_waiters();
        Ok(())
    }

    fn handle_error(&self, error: &TrackerError) {
        self.lock().errors.push(error.clone());
    }
}
