use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::{
    event::Event,
    tracker::{Tracker, TrackerError, TrackerId, TrackerResult},
};

/// Writes every event to the `tracing` log at info level.
///
/// Meant for development builds, or as a second sink next to a real SDK
/// tracker while verifying which events fire.
pub struct LogTracker {
    id: TrackerId,
    name: String,
    enabled: AtomicBool,
}

impl LogTracker {
    pub fn new(id: impl Into<TrackerId>) -> Self {
        let id = id.into();
        Self {
            name: format!("LogTracker({})", id),
            id,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl Tracker for LogTracker {
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
        let parameters = match event.parameters() {
            Some(params) => serde_json::to_string(params)
                .map_err(|e| TrackerError::delivery_failed(&self.id, e.to_string()))?,
            None => "{}".to_string(),
        };
        info!(
            tracker = %self.id,
            event_id = %event.id(),
            "Fire event {} with parameters {}",
            event.name(),
            parameters
        );
        Ok(())
    }

    fn handle_error(&self, error: &TrackerError) {
        warn!(tracker = %self.id, "{}", error);
    }
}
