//! Error taxonomy for the engine.
//!
//! # Propagation
//! ```text
//! ResolutionError    → surfaced to the digester, which decides fatality
//! ConfigurationError → captured on the Configuration, logged, never escapes the load loop
//! EngineError        → whole-engine operations (busy refusal, bootstrap failures)
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by byte stores backing database configurations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQL backend failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failure to resolve an external entity reference.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The system id was empty or consisted of a scheme only.
    #[error("cannot resolve entity with empty system id [{system_id}]")]
    EmptySystemId { system_id: String },

    /// No resource exists for the system id.
    #[error("cannot find resource for entity [{system_id}]")]
    NotFound { system_id: String },
}

impl ResolutionError {
    /// The identifier that failed to resolve.
    pub fn system_id(&self) -> &str {
        match self {
            ResolutionError::EmptySystemId { system_id } => system_id,
            ResolutionError::NotFound { system_id } => system_id,
        }
    }
}

/// Problems with a configuration's resources or descriptor.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The store could not be queried.
    #[error("could not get configuration '{name}' from store")]
    StoreUnavailable {
        name: String,
        #[source]
        source: StoreError,
    },

    /// The store has no record for the configuration.
    #[error("configuration '{name}' not found in store")]
    NotInStore { name: String },

    /// A database configuration was declared but no store is configured.
    #[error("configuration '{name}' is database-backed but no store is configured")]
    NoStore { name: String },

    /// A packed bundle could not be unpacked.
    #[error("invalid bundle for configuration '{name}': {source}")]
    InvalidBundle {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// An archive file could not be read.
    #[error("cannot read archive {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory root does not exist.
    #[error("directory {path:?} does not exist")]
    DirectoryMissing { path: PathBuf },

    /// The declared parent is not a known configuration.
    #[error("configuration '{name}' declares unknown parent '{parent}'")]
    UnknownParent { name: String, parent: String },

    /// The parent declarations form a cycle.
    #[error("parent cycle detected: {chain}")]
    ParentCycle { chain: String },

    /// The configuration name is not in the catalog.
    #[error("configuration '{name}' is not registered")]
    Unregistered { name: String },

    /// The descriptor resource does not exist.
    #[error("descriptor '{path}' not found for configuration '{name}'")]
    DescriptorNotFound { name: String, path: String },

    /// The descriptor could not be parsed.
    #[error("invalid descriptor '{path}': {message}")]
    InvalidDescriptor { path: String, message: String },

    /// An external reference in the descriptor did not resolve.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// An endpoint is already registered by another configuration.
    #[error("endpoint '{endpoint}' is already registered by configuration '{owner}'")]
    EndpointConflict { endpoint: String, owner: String },
}

/// Errors of whole-engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Refused because per-name loads are in flight.
    #[error("engine busy, configurations loading: {}", .loading.join(", "))]
    Busy { loading: Vec<String> },

    /// The runtime context has not been built yet.
    #[error("engine not initialized")]
    NotInitialized,

    /// Enumerating configurations failed.
    #[error("cannot enumerate configurations: {0}")]
    Catalog(String),

    /// The shared base resources could not be set up.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_error_carries_system_id() {
        let err = ResolutionError::NotFound {
            system_id: "xsd/missing.xsd".into(),
        };
        assert_eq!(err.system_id(), "xsd/missing.xsd");
        assert!(err.to_string().contains("xsd/missing.xsd"));
    }

    #[test]
    fn busy_lists_loading_names() {
        let err = EngineError::Busy {
            loading: vec!["A".into(), "*ALL*".into()],
        };
        assert_eq!(err.to_string(), "engine busy, configurations loading: A, *ALL*");
    }
}
