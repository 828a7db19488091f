//! Directory-backed resource loader.
//!
//! # Responsibilities
//! - Resolve resources directly against files under a root directory
//! - Refuse paths escaping the root
//!
//! # Design Decisions
//! - No unpacking step; every resolve reads the file, so edits are visible at once
//! - Reload only verifies the root still exists

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ConfigurationError;
use crate::loader::{
    normalize_path, LoaderContext, LoaderKind, Resource, ResourceLoader, ResourceResolver,
};

#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_root(&self) -> Result<(), ConfigurationError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(ConfigurationError::DirectoryMissing {
                path: self.root.clone(),
            })
        }
    }
}

impl ResourceResolver for DirectoryLoader {
    fn resolve(&self, path: &str) -> Option<Resource> {
        let relative = normalize_path(path)?;
        if relative.is_empty() {
            return None;
        }
        let file = self.root.join(&relative);
        if !file.is_file() {
            return None;
        }
        match std::fs::read(&file) {
            Ok(data) => Some(Resource::new(
                relative,
                file.display().to_string(),
                Arc::from(data),
            )),
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Cannot read resource file");
                None
            }
        }
    }
}

#[async_trait]
impl ResourceLoader for DirectoryLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::Directory
    }

    async fn configure(
        &mut self,
        _context: &LoaderContext,
        configuration_name: &str,
    ) -> Result<(), ConfigurationError> {
        self.check_root()?;
        tracing::debug!(
            configuration = %configuration_name,
            root = %self.root.display(),
            "Directory loader configured"
        );
        Ok(())
    }

    async fn reload(&self) -> Result<(), ConfigurationError> {
        self.check_root()
    }
}
