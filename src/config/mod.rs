//! Engine configuration subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, parent cycles)
//!     → EngineConfig (validated, immutable)
//!     → StaticCatalog + EngineSettings handed to the engine
//!
//! While running:
//!     watcher.rs detects a change under a watched directory configuration
//!     → configuration name sent on a channel
//!     → engine reload(name)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; store discovery is re-run on every full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::ConfigurationEntry;
pub use schema::EngineConfig;
