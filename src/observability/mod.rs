//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Engine lifecycle transitions produce:
//!     → messages.rs (per-configuration and *ALL* rings, queried by operators)
//!     → logging.rs  (tracing events, mirrored from every message)
//!     → metrics.rs  (counters, gauges, histograms)
//! ```
//!
//! # Design Decisions
//! - Operators observe failures through the message rings; nothing is thrown past the engine
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod messages;
pub mod metrics;

pub use messages::{Level, LogEntry, MessageLog, ALL};
