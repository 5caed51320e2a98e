//! # trackhub: analytics event dispatch
//!
//! trackhub sits between an application and its analytics backends. The
//! application describes what happened; trackhub merges in the default
//! parameters and hands the result to every backend tracker that the event
//! allows.
//!
//! ## Building Blocks
//!
//! - Parameters ([`parameters`]): opaque key/value data and the merge rule
//! - Events ([`event`]): the application-side [`EventDescriptor`] and the
//!   canonical [`Event`] delivered to trackers
//! - Trackers ([`tracker`], [`tracker_registry`], [`trackers`]): the backend
//!   contract, the concurrent registry, and built-in sinks
//! - Dispatch ([`dispatcher`], [`scheduler`]): fan-out and its execution
//!   context
//! - Configuration ([`config`]) and errors ([`error`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trackhub::{
//!     config::Configuration, dispatcher::DispatchEngine, event::SimpleEvent,
//!     parameters::parameters, trackers::LogTracker,
//! };
//!
//! # async fn example() -> trackhub::InternalResult<()> {
//! let config = Configuration::default().with_default_parameters(parameters([("os", "17.2")]));
//! let engine = DispatchEngine::new(config)?;
//! engine.add_tracker(Arc::new(LogTracker::new("log")));
//!
//! let login = SimpleEvent::builder()
//!     .name("login")
//!     .parameter("user", "a")
//!     .tracker("log")
//!     .build()?;
//! engine.dispatch(&login);
//! # Ok(())
//! # }
//! ```
//!
//! ## Delivery Semantics
//!
//! Dispatch is fire-and-forget. An event reaches a tracker if and only if the
//! tracker is registered, enabled, and listed by the event. There is no
//! retry, no persistence, and no ordering between events or trackers.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod parameters;
pub mod scheduler;
pub mod tracker;
pub mod tracker_registry;
pub mod trackers;

// Re-exports
pub use config::{ConcurrencyPolicy, Configuration};
pub use dispatcher::DispatchEngine;
pub use error::*;
pub use event::{Event, EventDescriptor, SimpleEvent};
pub use parameters::{ParameterSet, Value};
pub use tracker::{Tracker, TrackerError, TrackerId, TrackerResult};
