//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Engine bootstrap fails:
//!     → engine/retry.rs (single background worker)
//!     → backoff.rs (exponential delay with jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - Delays are capped; the worker never sleeps longer than the configured maximum
//! - Jitter keeps several engine instances from retrying in lockstep

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
