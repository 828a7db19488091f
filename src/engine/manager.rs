//! Registry of resource loader handles, one per configuration name.
//!
//! # Responsibilities
//! - Select the loader variant for a configuration's kind and configure it
//! - Chain each handle to its declared parent (or the shared base) via OverrideResourceLoader
//! - Cache handles; serialize construction and reload per name
//!
//! # Design Decisions
//! - Ancestors are acquired root-first, so a parent handle always exists before its children
//! - A failed construction leaves the slot untouched; the previous handle, if any, stays active
//! - Cycles are rejected before anything is constructed
//! - A replaced handle's children are rebound to the replacement at once

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::config::ConfigurationEntry;
use crate::error::ConfigurationError;
use crate::loader::{
    ArchiveLoader, DatabaseLoader, DirectoryLoader, LoaderContext, LoaderHandle, LoaderKind,
    OverrideResourceLoader, ResourceLoader, ResourceResolver,
};
use crate::observability::metrics;

type Slot = Arc<Mutex<Option<LoaderHandle>>>;

/// Result of acquiring a handle.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub handle: LoaderHandle,
    /// Whether the handle was constructed by this call.
    pub created: bool,
}

pub struct ClassLoaderManager {
    context: LoaderContext,
    shared: Arc<dyn ResourceResolver>,
    slots: DashMap<String, Slot>,
    handles: DashMap<String, LoaderHandle>,
    constructions: DashMap<String, usize>,
}

impl ClassLoaderManager {
    /// `shared` is the base every root configuration falls back to.
    pub fn new(context: LoaderContext, shared: Arc<dyn ResourceResolver>) -> Self {
        Self {
            context,
            shared,
            slots: DashMap::new(),
            handles: DashMap::new(),
            constructions: DashMap::new(),
        }
    }

    /// Get the handle of `name`, constructing it and any missing ancestors.
    pub async fn get(
        &self,
        name: &str,
        entries: &HashMap<String, ConfigurationEntry>,
    ) -> Result<Acquired, ConfigurationError> {
        let lineage = lineage(name, entries)?;

        let mut parent: Weak<dyn ResourceResolver> = Arc::downgrade(&self.shared);
        let mut acquired = None;
        for entry in lineage {
            let current = self.acquire(entry, parent).await?;
            let resolver: Arc<dyn ResourceResolver> = current.handle.clone();
            parent = Arc::downgrade(&resolver);
            acquired = Some(current);
        }
        acquired.ok_or_else(|| ConfigurationError::Unregistered {
            name: name.to_string(),
        })
    }

    async fn acquire(
        &self,
        entry: &ConfigurationEntry,
        parent: Weak<dyn ResourceResolver>,
    ) -> Result<Acquired, ConfigurationError> {
        let slot = self.slot(&entry.name);
        let mut guard = slot.lock().await;

        if let Some(handle) = guard.as_ref() {
            if handle.kind() == entry.kind {
                if !handle.has_parent(&parent) {
                    handle.set_parent(parent);
                }
                return Ok(Acquired {
                    handle: handle.clone(),
                    created: false,
                });
            }
            tracing::info!(
                configuration = %entry.name,
                from = %handle.kind(),
                to = %entry.kind,
                "Loader kind changed, replacing handle"
            );
        }

        let handle = self.construct(entry, parent).await?;
        if let Some(previous) = guard.replace(handle.clone()) {
            self.rebind_children(&previous, &handle);
        }
        self.handles.insert(entry.name.clone(), handle.clone());
        *self.constructions.entry(entry.name.clone()).or_insert(0) += 1;
        metrics::record_handle_constructed(entry.kind.as_str());
        Ok(Acquired {
            handle,
            created: true,
        })
    }

    async fn construct(
        &self,
        entry: &ConfigurationEntry,
        parent: Weak<dyn ResourceResolver>,
    ) -> Result<LoaderHandle, ConfigurationError> {
        let mut loader: Box<dyn ResourceLoader> = match entry.kind {
            LoaderKind::Database => Box::new(DatabaseLoader::new(entry.version.clone())),
            LoaderKind::Archive => Box::new(ArchiveLoader::new(required_path(entry))),
            LoaderKind::Directory => Box::new(DirectoryLoader::new(required_path(entry))),
        };
        loader.configure(&self.context, &entry.name).await?;

        tracing::debug!(
            configuration = %entry.name,
            kind = %entry.kind,
            base_path = ?entry.base_path,
            parent = ?entry.parent,
            "Resource loader constructed"
        );
        Ok(Arc::new(OverrideResourceLoader::new(
            entry.name.clone(),
            loader,
            entry.base_path.clone(),
            Some(parent),
        )))
    }

    /// Point every handle chained to `previous` at its replacement.
    fn rebind_children(&self, previous: &LoaderHandle, replacement: &LoaderHandle) {
        let previous: Arc<dyn ResourceResolver> = previous.clone();
        let previous = Arc::downgrade(&previous);
        let replacement: Arc<dyn ResourceResolver> = replacement.clone();
        for child in self.handles.iter() {
            if child.has_parent(&previous) {
                tracing::debug!(
                    configuration = %child.name(),
                    "Rebinding to replaced parent handle"
                );
                child.set_parent(Arc::downgrade(&replacement));
            }
        }
    }

    /// Refresh a handle's content, keeping it registered on failure.
    pub async fn reload(&self, handle: &LoaderHandle) -> Result<(), ConfigurationError> {
        let slot = self.slot(handle.name());
        let _guard = slot.lock().await;
        let result = handle.reload().await;
        if let Err(e) = &result {
            metrics::record_reload_failure(handle.kind().as_str());
            tracing::warn!(
                configuration = %handle.name(),
                kind = %handle.kind(),
                error = %e,
                failed = handle.is_failed(),
                "Resource reload failed"
            );
        }
        result
    }

    /// The cached handle of `name`, without constructing one.
    pub fn handle(&self, name: &str) -> Option<LoaderHandle> {
        self.handles.get(name).map(|h| h.value().clone())
    }

    /// How many handles have been constructed for `name`.
    pub fn constructions(&self, name: &str) -> usize {
        self.constructions.get(name).map(|c| *c).unwrap_or(0)
    }

    fn slot(&self, name: &str) -> Slot {
        self.slots
            .entry(name.to_string())
            .or_default()
            .value()
            .clone()
    }
}

fn required_path(entry: &ConfigurationEntry) -> std::path::PathBuf {
    entry.path.clone().unwrap_or_else(|| entry.name.clone().into())
}

/// Entries from the root ancestor down to `name`.
fn lineage<'a>(
    name: &str,
    entries: &'a HashMap<String, ConfigurationEntry>,
) -> Result<Vec<&'a ConfigurationEntry>, ConfigurationError> {
    let mut chain: Vec<&ConfigurationEntry> = Vec::new();
    let mut current = entries
        .get(name)
        .ok_or_else(|| ConfigurationError::Unregistered {
            name: name.to_string(),
        })?;
    loop {
        if chain.iter().any(|e| e.name == current.name) {
            let mut names: Vec<&str> = chain.iter().map(|e| e.name.as_str()).collect();
            names.push(&current.name);
            return Err(ConfigurationError::ParentCycle {
                chain: names.join(" -> "),
            });
        }
        chain.push(current);
        let Some(parent) = &current.parent else {
            break;
        };
        current = entries
            .get(parent)
            .ok_or_else(|| ConfigurationError::UnknownParent {
                name: current.name.clone(),
                parent: parent.clone(),
            })?;
    }
    chain.reverse();
    Ok(chain)
}
