//! Built-in trackers that do not depend on any third-party SDK.

mod in_memory;
mod logging;

pub use in_memory::MemoryTracker;
pub use logging::LogTracker;
