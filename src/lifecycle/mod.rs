//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → engine.destroy() → retry worker and admin server stop → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → engine.full_reload()
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop background work, unload configurations, close
//! - A busy engine refuses SIGHUP reloads; the refusal is logged, not retried

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{next_signal, SignalEvent};
