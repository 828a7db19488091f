//! Base-path and parent chaining around a resource loader.
//!
//! # Resolution Order
//! ```text
//! resolve(path)
//!     1. basePath + "/" + path   against this loader's own resources
//!     2. path                    against this loader's own resources
//!     3. path                    against the parent (no base path applied)
//!     4. None
//! ```
//!
//! # Design Decisions
//! - A configuration's own resource always wins over an inherited one
//! - Base-path scoping is invisible above the local loader
//! - The parent is held weakly; it is used for lookup, never owned

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use crate::error::ConfigurationError;
use crate::loader::{
    normalize_path, BundleMetadata, LoaderKind, Resource, ResourceLoader, ResourceResolver,
};

/// Shared handle to one configuration's resolved loader.
pub type LoaderHandle = Arc<OverrideResourceLoader>;

pub struct OverrideResourceLoader {
    name: String,
    loader: Box<dyn ResourceLoader>,
    base_path: Option<String>,
    parent: RwLock<Option<Weak<dyn ResourceResolver>>>,
    failure: RwLock<Option<String>>,
}

impl OverrideResourceLoader {
    pub fn new(
        name: impl Into<String>,
        loader: Box<dyn ResourceLoader>,
        base_path: Option<String>,
        parent: Option<Weak<dyn ResourceResolver>>,
    ) -> Self {
        let base_path = base_path
            .and_then(|p| normalize_path(&p))
            .filter(|p| !p.is_empty());
        Self {
            name: name.into(),
            loader,
            base_path,
            parent: RwLock::new(parent),
            failure: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LoaderKind {
        self.loader.kind()
    }

    pub fn base_path(&self) -> Option<&str> {
        self.base_path.as_deref()
    }

    pub fn metadata(&self) -> Option<BundleMetadata> {
        self.loader.metadata()
    }

    /// Resolve against this configuration's own resources only (steps 1 and 2).
    pub fn resolve_local(&self, path: &str) -> Option<Resource> {
        let path = normalize_path(path)?;
        if let Some(base) = &self.base_path {
            if let Some(resource) = self.loader.resolve(&format!("{base}/{path}")) {
                return Some(resource);
            }
        }
        self.loader.resolve(&path)
    }

    fn parent(&self) -> Option<Arc<dyn ResourceResolver>> {
        self.parent
            .read()
            .expect("parent lock poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Whether `candidate` is the currently bound parent.
    pub fn has_parent(&self, candidate: &Weak<dyn ResourceResolver>) -> bool {
        self.parent
            .read()
            .expect("parent lock poisoned")
            .as_ref()
            .is_some_and(|p| Weak::ptr_eq(p, candidate))
    }

    pub fn set_parent(&self, parent: Weak<dyn ResourceResolver>) {
        *self.parent.write().expect("parent lock poisoned") = Some(parent);
    }

    /// Refresh the wrapped loader's content.
    ///
    /// Failures of kinds that keep serving last-good content leave the handle
    /// healthy; other kinds are marked failed until a later reload succeeds.
    pub async fn reload(&self) -> Result<(), ConfigurationError> {
        match self.loader.reload().await {
            Ok(()) => {
                *self.failure.write().expect("failure lock poisoned") = None;
                Ok(())
            }
            Err(e) => {
                if self.kind() != LoaderKind::Database {
                    *self.failure.write().expect("failure lock poisoned") = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Reason the handle's content is no longer trustworthy, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure.read().expect("failure lock poisoned").clone()
    }

    pub fn is_failed(&self) -> bool {
        self.failure().is_some()
    }
}

impl ResourceResolver for OverrideResourceLoader {
    fn resolve(&self, path: &str) -> Option<Resource> {
        if let Some(resource) = self.resolve_local(path) {
            return Some(resource);
        }
        let path = normalize_path(path)?;
        self.parent()?.resolve(&path)
    }
}

impl fmt::Debug for OverrideResourceLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideResourceLoader")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("base_path", &self.base_path)
            .field("failed", &self.is_failed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{DirectoryLoader, LoaderContext};

    async fn directory_handle(
        name: &str,
        root: &std::path::Path,
        base_path: Option<&str>,
        parent: Option<Weak<dyn ResourceResolver>>,
    ) -> LoaderHandle {
        let mut loader = DirectoryLoader::new(root);
        loader
            .configure(&LoaderContext::default(), name)
            .await
            .unwrap();
        Arc::new(OverrideResourceLoader::new(
            name,
            Box::new(loader),
            base_path.map(String::from),
            parent,
        ))
    }

    #[tokio::test]
    async fn private_resource_overrides_parent() {
        let dir = tempfile::tempdir().unwrap();
        let a_root = dir.path().join("a");
        let b_root = dir.path().join("b");
        std::fs::create_dir_all(&a_root).unwrap();
        std::fs::create_dir_all(b_root.join("cfgB")).unwrap();
        std::fs::write(a_root.join("shared.xsd"), b"A-shared").unwrap();
        std::fs::write(a_root.join("other.xsd"), b"A-other").unwrap();
        std::fs::write(b_root.join("cfgB/shared.xsd"), b"B-shared").unwrap();

        let a = directory_handle("A", &a_root, None, None).await;
        let parent: Weak<dyn ResourceResolver> = Arc::downgrade(&a) as Weak<dyn ResourceResolver>;
        let b = directory_handle("B", &b_root, Some("cfgB"), Some(parent)).await;

        assert_eq!(b.resolve("shared.xsd").unwrap().bytes(), b"B-shared");
        assert_eq!(b.resolve("other.xsd").unwrap().bytes(), b"A-other");
        assert!(b.resolve("nowhere.xsd").is_none());
        // base path is not applied at the parent level
        assert!(a.resolve("cfgB/shared.xsd").is_none());
    }

    #[tokio::test]
    async fn unprefixed_lookup_follows_base_path_miss() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("root.xsd"), b"root").unwrap();

        let handle = directory_handle("C", dir.path(), Some("/scoped/"), None).await;
        assert_eq!(handle.base_path(), Some("scoped"));
        assert_eq!(handle.resolve("root.xsd").unwrap().bytes(), b"root");
    }

    #[tokio::test]
    async fn dropped_parent_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let parent_dir = tempfile::tempdir().unwrap();
        std::fs::write(parent_dir.path().join("p.xsd"), b"p").unwrap();

        let parent = directory_handle("P", parent_dir.path(), None, None).await;
        let weak: Weak<dyn ResourceResolver> = Arc::downgrade(&parent) as Weak<dyn ResourceResolver>;
        let child = directory_handle("C", dir.path(), None, Some(weak.clone())).await;

        assert!(child.has_parent(&weak));
        assert!(child.resolve("p.xsd").is_some());
        drop(parent);
        assert!(child.resolve("p.xsd").is_none());
    }

    #[tokio::test]
    async fn failed_directory_reload_marks_handle() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cfg");
        std::fs::create_dir_all(&root).unwrap();
        let handle = directory_handle("D", &root, None, None).await;

        std::fs::remove_dir_all(&root).unwrap();
        assert!(handle.reload().await.is_err());
        assert!(handle.is_failed());

        std::fs::create_dir_all(&root).unwrap();
        handle.reload().await.unwrap();
        assert!(!handle.is_failed());
    }
}
