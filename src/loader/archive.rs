//! Archive-backed resource loader.
//!
//! Reads a packed bundle file into memory on configure. Reload re-reads the
//! file only when its modification time changed, so an untouched archive
//! reloads as a no-op.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::error::ConfigurationError;
use crate::loader::{
    normalize_path, BundleIndex, LoaderContext, LoaderKind, Resource, ResourceLoader,
    ResourceResolver,
};

pub struct ArchiveLoader {
    path: PathBuf,
    name: String,
    bundle: ArcSwap<BundleIndex>,
    modified: Mutex<Option<SystemTime>>,
}

impl ArchiveLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: String::new(),
            bundle: ArcSwap::from_pointee(BundleIndex::default()),
            modified: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_archive(&self) -> Result<(BundleIndex, Option<SystemTime>), ConfigurationError> {
        let archive_error = |source| ConfigurationError::Archive {
            path: self.path.clone(),
            source,
        };
        let bytes = tokio::fs::read(&self.path).await.map_err(archive_error)?;
        let modified = tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|m| m.modified().ok());
        let index = BundleIndex::unpack(&bytes, format!("archive:{}", self.path.display()))
            .map_err(|source| ConfigurationError::InvalidBundle {
                name: self.name.clone(),
                source,
            })?;
        Ok((index, modified))
    }

    fn install(&self, index: BundleIndex, modified: Option<SystemTime>) {
        self.bundle.store(Arc::new(index));
        *self.modified.lock().expect("archive mtime mutex poisoned") = modified;
    }
}

impl ResourceResolver for ArchiveLoader {
    fn resolve(&self, path: &str) -> Option<Resource> {
        let path = normalize_path(path)?;
        self.bundle.load().get(&path)
    }
}

#[async_trait]
impl ResourceLoader for ArchiveLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::Archive
    }

    async fn configure(
        &mut self,
        _context: &LoaderContext,
        configuration_name: &str,
    ) -> Result<(), ConfigurationError> {
        self.name = configuration_name.to_string();
        let (index, modified) = self.read_archive().await?;
        tracing::debug!(
            configuration = %self.name,
            archive = %self.path.display(),
            resources = index.len(),
            "Archive unpacked"
        );
        self.install(index, modified);
        Ok(())
    }

    async fn reload(&self) -> Result<(), ConfigurationError> {
        let current = tokio::fs::metadata(&self.path)
            .await
            .map_err(|source| ConfigurationError::Archive {
                path: self.path.clone(),
                source,
            })?
            .modified()
            .ok();
        let known = *self.modified.lock().expect("archive mtime mutex poisoned");
        if current.is_some() && current == known {
            tracing::debug!(configuration = %self.name, "Archive unchanged, reload skipped");
            return Ok(());
        }

        let (index, modified) = self.read_archive().await?;
        self.install(index, modified);
        Ok(())
    }
}
