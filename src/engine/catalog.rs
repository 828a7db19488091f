//! Enumeration of the configurations an engine manages.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ConfigurationEntry;
use crate::error::EngineError;
use crate::loader::store::ConfigStore;

/// Supplies the configuration names and their loader kinds.
///
/// Queried on every bootstrap, so changes become visible on full reload.
#[async_trait]
pub trait ConfigurationCatalog: Send + Sync {
    async fn entries(&self) -> Result<Vec<ConfigurationEntry>, EngineError>;
}

/// Catalog of statically declared entries, optionally extended with every
/// configuration that has an active bundle in a store.
pub struct StaticCatalog {
    entries: Vec<ConfigurationEntry>,
    discover: Option<Arc<dyn ConfigStore>>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<ConfigurationEntry>) -> Self {
        Self {
            entries,
            discover: None,
        }
    }

    /// Also enumerate the active configurations of `store`.
    pub fn with_discovery(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.discover = Some(store);
        self
    }
}

#[async_trait]
impl ConfigurationCatalog for StaticCatalog {
    async fn entries(&self) -> Result<Vec<ConfigurationEntry>, EngineError> {
        let mut entries = self.entries.clone();
        if let Some(store) = &self.discover {
            let names = store
                .active_names()
                .await
                .map_err(|e| EngineError::Catalog(e.to_string()))?;
            for name in names {
                if !entries.iter().any(|e| e.name == name) {
                    tracing::debug!(configuration = %name, "Discovered configuration in store");
                    entries.push(ConfigurationEntry::database(name));
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::store::{ConfigRecord, MemoryConfigStore};
    use crate::loader::LoaderKind;

    fn record(name: &str) -> ConfigRecord {
        ConfigRecord {
            name: name.into(),
            version: "1".into(),
            file_name: None,
            user: None,
            created_at: None,
            bundle: Vec::new(),
        }
    }

    #[tokio::test]
    async fn discovery_appends_undeclared_store_names() {
        let store = Arc::new(MemoryConfigStore::new());
        store.publish(record("A"));
        store.publish(record("Z"));

        let catalog = StaticCatalog::new(vec![ConfigurationEntry::directory("A", "/srv/A")])
            .with_discovery(store);
        let entries = catalog.entries().await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, LoaderKind::Directory);
        assert_eq!(entries[1].name, "Z");
        assert_eq!(entries[1].kind, LoaderKind::Database);
    }
}
