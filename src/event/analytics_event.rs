//! # Analytics Events
//!
//! Two shapes of event exist:
//!
//! - [`EventDescriptor`]: implemented by application values (typically an
//!   enum of everything the app tracks). It carries the event name, its own
//!   parameters, and the allowlist of trackers that may receive it.
//! - [`Event`]: the canonical record built by the dispatcher after merging
//!   default parameters into the descriptor's parameters. This is what
//!   trackers receive, and it is never mutated after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{Error, InternalResult},
    parameters::{ParameterSet, Value},
    tracker::TrackerId,
};

/// # Event
///
/// The merged, immutable record delivered to trackers.
///
/// Events built by the dispatcher always carry `Some` parameters, possibly
/// an empty set: the descriptor's set is merged over the defaults. `None`
/// only appears on events constructed directly with [`Event::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: Uuid,
    name: String,
    parameters: Option<ParameterSet>,
    timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>, parameters: Option<ParameterSet>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            parameters,
            timestamp: Utc::now(),
        }
    }

    /// Unique per dispatch; lets backends de-duplicate.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> Option<&ParameterSet> {
        self.parameters.as_ref()
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.as_ref().and_then(|params| params.get(key))
    }

    /// When the dispatcher built this event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// # EventDescriptor
///
/// Application-side description of one occurrence to be tracked.
///
/// ```rust
/// # use trackhub::event::EventDescriptor;
/// # use trackhub::parameters::{parameters, ParameterSet};
/// # use trackhub::tracker::TrackerId;
/// enum AppEvent {
///     Login,
///     Purchase { sku: String },
/// }
///
/// impl EventDescriptor for AppEvent {
///     fn name(&self) -> &str {
///         match self {
///             AppEvent::Login => "login",
///             AppEvent::Purchase { .. } => "purchase",
///         }
///     }
///
///     fn parameters(&self) -> ParameterSet {
///         match self {
///             AppEvent::Login => ParameterSet::new(),
///             AppEvent::Purchase { sku } => parameters([("sku", sku.as_str())]),
///         }
///     }
///
///     fn trackers(&self) -> Vec<TrackerId> {
///         vec!["firebase".into(), "facebook".into()]
///     }
/// }
/// ```
pub trait EventDescriptor {
    fn name(&self) -> &str;

    /// May be empty.
    fn parameters(&self) -> ParameterSet;

    /// Trackers allowed to receive this event. Unlisted trackers never see it.
    fn trackers(&self) -> Vec<TrackerId>;
}

impl<T: EventDescriptor + ?Sized> EventDescriptor for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn parameters(&self) -> ParameterSet {
        (**self).parameters()
    }

    fn trackers(&self) -> Vec<TrackerId> {
        (**self).trackers()
    }
}

/// Ready-made [`EventDescriptor`] for callers without their own event type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimpleEvent {
    pub name: String,
    #[serde(default)]
    pub parameters: ParameterSet,
    #[serde(default)]
    pub trackers: Vec<TrackerId>,
}

impl SimpleEvent {
    pub fn builder() -> EventBuilder {
        EventBuilder::new()
    }
}

impl EventDescriptor for SimpleEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> ParameterSet {
        self.parameters.clone()
    }

    fn trackers(&self) -> Vec<TrackerId> {
        self.trackers.clone()
    }
}

#[derive(Default, Clone)]
pub struct EventBuilder {
    name: Option<String>,
    parameters: ParameterSet,
    trackers: Vec<TrackerId>,
}

impl EventBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn parameters(mut self, parameters: ParameterSet) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn tracker(mut self, id: impl Into<TrackerId>) -> Self {
        self.trackers.push(id.into());
        self
    }

    pub fn trackers<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TrackerId>,
    {
        self.trackers.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> InternalResult<SimpleEvent> {
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| Error::InvalidEvent("name is required".to_string()))?;
        Ok(SimpleEvent {
            name,
            parameters: self.parameters,
            trackers: self.trackers,
        })
    }
}
