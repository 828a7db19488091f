//! Resource loading subsystem.
//!
//! # Data Flow
//! ```text
//! configuration name + LoaderKind
//!     → database.rs  (packed bundle fetched from a ConfigStore)
//!     → archive.rs   (packed bundle read from a local file)
//!     → directory.rs (files under a root directory)
//!     → chain.rs     (base path + parent fallback around any of the above)
//!     → Resource bytes, or None
//! ```
//!
//! # Design Decisions
//! - Every variant exposes the same resolve contract; callers never see origin
//! - Packed bundles are unpacked into an immutable index and swapped atomically
//! - "Not found" is `None`, never an error; callers decide fatality

pub mod archive;
pub mod bundle;
pub mod chain;
pub mod database;
pub mod directory;
pub mod store;

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::loader::store::ConfigStore;

pub use archive::ArchiveLoader;
pub use bundle::BundleIndex;
pub use chain::{LoaderHandle, OverrideResourceLoader};
pub use database::DatabaseLoader;
pub use directory::DirectoryLoader;

/// Backing store kind of a configuration's resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    Database,
    Archive,
    Directory,
}

impl LoaderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderKind::Database => "database",
            LoaderKind::Archive => "archive",
            LoaderKind::Directory => "directory",
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved resource: its normalized path, where it came from, and its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    path: String,
    location: String,
    data: Arc<[u8]>,
}

impl Resource {
    pub fn new(path: impl Into<String>, location: impl Into<String>, data: Arc<[u8]>) -> Self {
        Self {
            path: path.into(),
            location: location.into(),
            data,
        }
    }

    /// Path the resource was found under.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Human-readable origin, used in diagnostics.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// A fresh byte stream over the content.
    pub fn reader(&self) -> Cursor<Arc<[u8]>> {
        Cursor::new(Arc::clone(&self.data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Anything that can turn a relative path into resource bytes.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, path: &str) -> Option<Resource>;
}

/// Resolver with no resources, used when no shared base is configured.
#[derive(Debug, Default)]
pub struct NoResources;

impl ResourceResolver for NoResources {
    fn resolve(&self, _path: &str) -> Option<Resource> {
        None
    }
}

/// Metadata carried by a packed bundle fetched from a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub file_name: Option<String>,
    pub user: Option<String>,
    pub version: Option<String>,
    pub created_at: Option<String>,
}

/// Engine-side context handed to loaders during `configure`.
#[derive(Clone, Default)]
pub struct LoaderContext {
    pub instance_name: String,
    pub store: Option<Arc<dyn ConfigStore>>,
}

/// A pluggable strategy resolving one configuration's own resources.
#[async_trait]
pub trait ResourceLoader: ResourceResolver {
    fn kind(&self) -> LoaderKind;

    /// Bind the loader to a configuration and read its initial content.
    async fn configure(
        &mut self,
        context: &LoaderContext,
        configuration_name: &str,
    ) -> Result<(), ConfigurationError>;

    /// Refresh content from the backing store.
    async fn reload(&self) -> Result<(), ConfigurationError>;

    fn metadata(&self) -> Option<BundleMetadata> {
        None
    }
}

/// Normalize a resource path: forward slashes, no leading `/` or `./`.
///
/// Returns `None` for paths that escape upward with `..`.
pub fn normalize_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}
