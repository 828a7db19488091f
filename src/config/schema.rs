//! Engine configuration schema.
//!
//! All types derive Serde traits for deserialization from the TOML file.
//! Every section has defaults so that a minimal file only lists its
//! `[[configurations]]`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::loader::LoaderKind;

/// Root configuration of the engine daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine identity and message log sizing.
    pub engine: EngineSettings,

    /// Background bootstrap retry.
    pub retry: RetryConfig,

    /// Database store for database-backed configurations.
    pub database: DatabaseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Statically declared configurations.
    pub configurations: Vec<ConfigurationEntry>,
}

/// Engine identity and sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Name of the hosting instance. The configuration with this name keeps
    /// its descriptor at the root of its resources.
    pub instance_name: String,

    /// Entries kept per message stream.
    pub message_log_capacity: usize,

    /// Directory acting as the shared base every root configuration falls back to.
    pub shared_resources: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            instance_name: "engine".to_string(),
            message_log_capacity: 10,
            shared_resources: None,
        }
    }
}

/// Bootstrap retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Spawn a background worker when bootstrap fails.
    pub enabled: bool,

    /// Base delay before the first retry in milliseconds.
    pub base_delay_ms: u64,

    /// Cap on the delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

/// Database store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL (e.g., "sqlite://configs.db"). No store when absent.
    pub url: Option<String>,

    /// Also load every configuration with an active bundle in the store.
    pub discover: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// One declared configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfigurationEntry {
    /// Unique configuration name.
    pub name: String,

    /// Backing store kind.
    pub kind: LoaderKind,

    /// Archive file or directory root. Unused for database configurations.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Prefix scoping the configuration's own resources.
    #[serde(default)]
    pub base_path: Option<String>,

    /// Configuration whose resources this one falls back to.
    #[serde(default)]
    pub parent: Option<String>,

    /// Pinned store version for database configurations.
    #[serde(default)]
    pub version: Option<String>,

    /// Descriptor resource path, overriding the default location.
    #[serde(default)]
    pub descriptor: Option<String>,

    /// Reload on filesystem changes (directory configurations only).
    #[serde(default)]
    pub watch: bool,
}

impl ConfigurationEntry {
    fn new(name: impl Into<String>, kind: LoaderKind, path: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            path,
            base_path: None,
            parent: None,
            version: None,
            descriptor: None,
            watch: false,
        }
    }

    pub fn database(name: impl Into<String>) -> Self {
        Self::new(name, LoaderKind::Database, None)
    }

    pub fn archive(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(name, LoaderKind::Archive, Some(path.into()))
    }

    pub fn directory(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(name, LoaderKind::Directory, Some(path.into()))
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = Some(descriptor.into());
        self
    }

    /// Resource path of the descriptor, relative to the configuration's resources.
    pub fn descriptor_path(&self, instance_name: &str) -> String {
        match &self.descriptor {
            Some(descriptor) => descriptor.clone(),
            None if self.name == instance_name => "Configuration.toml".to_string(),
            None => format!("{}/Configuration.toml", self.name),
        }
    }
}
