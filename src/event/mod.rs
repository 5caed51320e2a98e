//! # Events
//!
//! ```text
//! ┌───────────────┐  merge defaults  ┌───────┐  fan-out  ┌─────────┐
//! │EventDescriptor│─────────────────▶│ Event │──────────▶│ Tracker │
//! └───────────────┘                  └───────┘           └────┬────┘
//!                                                             │ outcome
//!                                                        ┌────▼─────┐
//!                                                        │ReportBus │
//!                                                        └──────────┘
//! ```
//!
//! - [`analytics_event`]: the descriptor contract and the canonical event
//! - [`report_bus`]: broadcast channel of delivery outcomes

pub mod analytics_event;
pub mod report_bus;

pub use analytics_event::{Event, EventBuilder, EventDescriptor, SimpleEvent};
pub use report_bus::{DeliveryReport, ReportBus, ReportError, ReportKind, ReportReceiver};
