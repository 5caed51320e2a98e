//! # Tracker Contract
//!
//! A tracker is a backend-specific sink for analytics events, usually a thin
//! wrapper around a third-party SDK. The dispatcher only knows trackers
//! through the [`Tracker`] trait: one implementation per backend, no shared
//! base type.
//!
//! ## Implementation Example
//!
//! ```rust
//! # use trackhub::tracker::{Tracker, TrackerId, TrackerResult};
//! # use trackhub::event::Event;
//! # use async_trait::async_trait;
//! struct ConsoleTracker {
//!     id: TrackerId,
//! }
//!
//! #[async_trait]
//! impl Tracker for ConsoleTracker {
//!     fn id(&self) -> &TrackerId {
//!         &self.id
//!     }
//!
//!     fn name(&self) -> &str {
//!         "ConsoleTracker"
//!     }
//!
//!     fn is_enabled(&self) -> bool {
//!         true
//!     }
//!
//!     async fn deliver(&self, event: &Event) -> TrackerResult<()> {
//!         println!("{}: {:?}", event.name(), event.parameters());
//!         Ok(())
//!     }
//! }
//! ```

use std::{borrow::Borrow, fmt};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::Event;

/// Identifies a tracker inside a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerId(String);

impl TrackerId {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TrackerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&TrackerId> for TrackerId {
    fn from(value: &TrackerId) -> Self {
        value.clone()
    }
}

impl AsRef<str> for TrackerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TrackerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Failures reported to a tracker's [`Tracker::handle_error`] hook.
///
/// None of these ever reach the caller of `dispatch`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The tracker was listed by the event but is disabled.
    #[error("Tracker not enabled: {id}")]
    NotEnabled { id: TrackerId },

    /// The event listed an identifier with no registered tracker.
    #[error("Tracker not registered: {id}")]
    NotRegistered { id: TrackerId },

    /// The tracker's own delivery failed.
    #[error("Delivery failed at {id}: {message}")]
    DeliveryFailed { id: TrackerId, message: String },
}

impl TrackerError {
    pub fn id(&self) -> &TrackerId {
        match self {
            TrackerError::NotEnabled { id }
            | TrackerError::NotRegistered { id }
            | TrackerError::DeliveryFailed { id, .. } => id,
        }
    }

    pub fn delivery_failed(id: &TrackerId, message: impl Into<String>) -> Self {
        TrackerError::DeliveryFailed {
            id: id.clone(),
            message: message.into(),
        }
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// # Tracker
///
/// Contract every analytics backend implements to receive events.
///
/// ## Delivery
///
/// `deliver` is called on a task owned by the dispatcher, never on the
/// caller's thread. An `Err` result (or a panic) is contained: sibling
/// trackers still receive the event and the error is handed to
/// [`handle_error`](Tracker::handle_error).
///
/// ## Enabled flag
///
/// `is_enabled` is read once per event when filtering. Implementations
/// usually back it with an `AtomicBool` so the application can toggle it
/// while events are in flight.
#[mockall::automock]
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Registry key of this tracker.
    fn id(&self) -> &TrackerId;

    /// Human readable name, used in logs.
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool;

    async fn deliver(&self, event: &Event) -> TrackerResult<()>;

    /// Receives errors concerning this tracker. Does nothing by default.
    fn handle_error(&self, _error: &TrackerError) {}
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_tracker_id_lookup_by_str() {
        let ids: HashSet<TrackerId> = ["facebook", "firebase"].into_iter().map(Into::into).collect();

        assert!(ids.contains("facebook"));
        assert!(!ids.contains("mixpanel"));
    }

    #[test]
    fn test_tracker_id_serde_is_transparent() {
        let id = TrackerId::from("firebase");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"firebase\"");

        let back: TrackerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_error_display() {
        let err = TrackerError::delivery_failed(&"firebase".into(), "sdk offline");
        assert_eq!(err.to_string(), "Delivery failed at firebase: sdk offline");
        assert_eq!(err.id().as_str(), "firebase");
    }
}
