//! Database-backed resource loader.
//!
//! # Responsibilities
//! - Fetch the configuration's packed bundle from a `ConfigStore` on configure
//! - Re-fetch on reload, replacing content only after a successful fetch
//! - Expose the stored record's metadata (file name, user, version, creation date)
//!
//! # Design Decisions
//! - A failed or empty fetch never discards the active bundle; the loader keeps
//!   serving its last-good bytes and the caller logs the failure

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;

use crate::error::ConfigurationError;
use crate::loader::store::ConfigStore;
use crate::loader::{
    normalize_path, BundleIndex, BundleMetadata, LoaderContext, LoaderKind, Resource,
    ResourceLoader, ResourceResolver,
};

pub struct DatabaseLoader {
    name: String,
    version: Option<String>,
    store: Option<Arc<dyn ConfigStore>>,
    bundle: ArcSwap<BundleIndex>,
    metadata: ArcSwapOption<BundleMetadata>,
}

impl DatabaseLoader {
    /// Create an unconfigured loader, optionally pinned to `version`.
    pub fn new(version: Option<String>) -> Self {
        Self {
            name: String::new(),
            version,
            store: None,
            bundle: ArcSwap::from_pointee(BundleIndex::default()),
            metadata: ArcSwapOption::empty(),
        }
    }

    async fn load_from_store(&self) -> Result<(), ConfigurationError> {
        let store = self.store.as_ref().ok_or_else(|| ConfigurationError::NoStore {
            name: self.name.clone(),
        })?;

        let record = store
            .fetch(&self.name, self.version.as_deref())
            .await
            .map_err(|source| ConfigurationError::StoreUnavailable {
                name: self.name.clone(),
                source,
            })?
            .ok_or_else(|| ConfigurationError::NotInStore {
                name: self.name.clone(),
            })?;

        let index = BundleIndex::unpack(&record.bundle, format!("db:{}", self.name)).map_err(
            |source| ConfigurationError::InvalidBundle {
                name: self.name.clone(),
                source,
            },
        )?;

        tracing::debug!(
            configuration = %self.name,
            version = %record.version,
            resources = index.len(),
            "Bundle fetched from store"
        );
        self.bundle.store(Arc::new(index));
        self.metadata.store(Some(Arc::new(record.metadata())));
        Ok(())
    }
}

impl ResourceResolver for DatabaseLoader {
    fn resolve(&self, path: &str) -> Option<Resource> {
        let path = normalize_path(path)?;
        self.bundle.load().get(&path)
    }
}

#[async_trait]
impl ResourceLoader for DatabaseLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::Database
    }

    async fn configure(
        &mut self,
        context: &LoaderContext,
        configuration_name: &str,
    ) -> Result<(), ConfigurationError> {
        self.name = configuration_name.to_string();
        self.store = context.store.clone();
        self.load_from_store().await
    }

    async fn reload(&self) -> Result<(), ConfigurationError> {
        self.load_from_store().await
    }

    fn metadata(&self) -> Option<BundleMetadata> {
        self.metadata.load_full().map(|m| m.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::bundle::tests::{oversized, pack};
    use crate::loader::store::{ConfigRecord, MemoryConfigStore};

    fn record(version: &str, content: &[u8]) -> ConfigRecord {
        ConfigRecord {
            name: "Orders".into(),
            version: version.into(),
            file_name: Some("orders.tar.gz".into()),
            user: Some("ops".into()),
            created_at: None,
            bundle: pack(&[("Orders/route.xsl", content)]),
        }
    }

    fn context(store: Arc<MemoryConfigStore>) -> LoaderContext {
        LoaderContext {
            instance_name: "engine".into(),
            store: Some(store),
        }
    }

    #[tokio::test]
    async fn configure_fetches_bundle_and_metadata() {
        let store = Arc::new(MemoryConfigStore::new());
        store.publish(record("1", b"v1"));

        let mut loader = DatabaseLoader::new(None);
        loader.configure(&context(store), "Orders").await.unwrap();

        assert_eq!(loader.resolve("/Orders/route.xsl").unwrap().bytes(), b"v1");
        let meta = loader.metadata().unwrap();
        assert_eq!(meta.version.as_deref(), Some("1"));
        assert_eq!(meta.user.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn failed_reload_keeps_last_good_bundle() {
        let store = Arc::new(MemoryConfigStore::new());
        store.publish(record("1", b"v1"));

        let mut loader = DatabaseLoader::new(None);
        loader.configure(&context(store.clone()), "Orders").await.unwrap();

        store.remove("Orders");
        let err = loader.reload().await.unwrap_err();
        assert!(matches!(err, ConfigurationError::NotInStore { .. }));
        assert_eq!(loader.resolve("Orders/route.xsl").unwrap().bytes(), b"v1");

        store.publish(record("2", b"v2"));
        loader.reload().await.unwrap();
        assert_eq!(loader.resolve("Orders/route.xsl").unwrap().bytes(), b"v2");
        assert_eq!(loader.metadata().unwrap().version.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn undecodable_bundle_keeps_last_good_bundle() {
        let store = Arc::new(MemoryConfigStore::new());
        store.publish(record("1", b"v1"));

        let mut loader = DatabaseLoader::new(None);
        loader.configure(&context(store.clone()), "Orders").await.unwrap();

        for bundle in [b"not a bundle".to_vec(), oversized(1 << 44)] {
            store.publish(ConfigRecord {
                bundle,
                ..record("2", b"unused")
            });
            let err = loader.reload().await.unwrap_err();
            assert!(matches!(err, ConfigurationError::InvalidBundle { .. }));
            assert_eq!(loader.resolve("Orders/route.xsl").unwrap().bytes(), b"v1");
            assert_eq!(loader.metadata().unwrap().version.as_deref(), Some("1"));
        }
    }

    #[tokio::test]
    async fn configure_without_store_fails() {
        let mut loader = DatabaseLoader::new(None);
        let err = loader
            .configure(&LoaderContext::default(), "Orders")
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::NoStore { .. }));
    }
}
