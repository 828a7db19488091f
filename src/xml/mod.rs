//! XML support.
//!
//! # Data Flow
//! ```text
//! descriptor parsing encounters an external reference (import, include, entity)
//!     → entity.rs (EntityResolver::resolve_entity)
//!     → configuration's OverrideResourceLoader (private, then inherited resources)
//!     → InputSource, "nothing to resolve", or ResolutionError
//! ```

pub mod entity;

pub use entity::{EntityResolver, InputSource, ResourceIdentifier};
