//! Configuration lifecycle engine.
//!
//! # Data Flow
//! ```text
//! catalog.rs       (names, loader kinds, parents)
//!     → engine.rs  (load / unload / reload / full reload / init / destroy)
//!     → manager.rs (one OverrideResourceLoader per name, chained to its parent)
//!     → digester.rs (descriptor + EntityResolver → Configuration object graph)
//!     → endpoints.rs (listeners registered on start, released on unload)
//!
//! Bootstrap failure:
//!     engine.rs → retry.rs (single background worker with backoff)
//! ```
//!
//! # Design Decisions
//! - One configuration's failure is captured on that configuration and never aborts the others
//! - A handle is reused across reloads; its content is refreshed in place
//! - Message streams belong to the engine and outlive full reloads

pub mod catalog;
pub mod configuration;
pub mod digester;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod endpoints;
pub mod manager;
pub mod retry;

pub use catalog::{ConfigurationCatalog, StaticCatalog};
pub use configuration::{Adapter, Configuration, ConfigurationState, ConfigurationSummary};
pub use digester::{Digester, TomlDigester};
pub use endpoints::{EndpointRegistry, ListenerRegistry};
pub use engine::{ConfigurationEngine, EngineBuilder, EngineStatus};
pub use manager::{Acquired, ClassLoaderManager};
