use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::{
    scheduler::{DeliveryLane, LaneLimits},
    tracker::{Tracker, TrackerId},
};

/// A registered tracker together with its delivery lane.
#[derive(Clone)]
pub struct Registration {
    pub tracker: Arc<dyn Tracker>,
    pub lane: Arc<DeliveryLane>,
}

/// Concurrent map from [`TrackerId`] to tracker.
///
/// Registering under an existing identifier replaces the earlier tracker,
/// which is how a backend implementation is hot-swapped under a stable id.
/// Every registration gets a fresh [`DeliveryLane`]; deliveries still held
/// by a replaced tracker do not count against its successor.
/// Cloning the registry yields a handle to the same map.
pub struct TrackerRegistry {
    trackers: Arc<DashMap<TrackerId, Registration>>,
    limits: LaneLimits,
}

impl Clone for TrackerRegistry {
    fn clone(&self) -> Self {
        Self {
            trackers: self.trackers.clone(),
            limits: self.limits,
        }
    }
}

impl Default for TrackerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::with_limits(LaneLimits::default())
    }

    pub fn with_limits(limits: LaneLimits) -> Self {
        Self {
            trackers: Arc::new(DashMap::new()),
            limits,
        }
    }

    pub fn limits(&self) -> LaneLimits {
        self.limits
    }

    /// Inserts the tracker under its own id, returning the one it replaced.
    pub fn register(&self, tracker: Arc<dyn Tracker>) -> Option<Arc<dyn Tracker>> {
        let id = tracker.id().clone();
        debug!("Registering tracker: {} ({})", id, tracker.name());
        let registration = Registration {
            tracker,
            lane: Arc::new(DeliveryLane::new(self.limits)),
        };
        let replaced = self.trackers.insert(id.clone(), registration);
        if replaced.is_some() {
            debug!("Replaced tracker: {}", id);
        }
        replaced.map(|registration| registration.tracker)
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<dyn Tracker>> {
        self.trackers.remove(id).map(|(_, registration)| registration.tracker)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tracker>> {
        self.trackers
            .get(id)
            .map(|entry| entry.value().tracker.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.trackers.contains_key(id)
    }

    /// Trackers registered at call time. Later registrations do not show up
    /// in an already taken snapshot.
    pub fn snapshot(&self) -> Vec<Arc<dyn Tracker>> {
        self.trackers
            .iter()
            .map(|entry| entry.value().tracker.clone())
            .collect()
    }

    /// Like [`snapshot`](Self::snapshot), with each tracker's lane.
    pub fn registrations(&self) -> Vec<Registration> {
        self.trackers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn ids(&self) -> Vec<TrackerId> {
        self.trackers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}
