//! The configuration engine: lifecycle orchestration for every configuration.
//!
//! # Responsibilities
//! - Bootstrap (`init`) from the catalog and load every configuration
//! - Per-name load, unload and reload, isolated from each other's failures
//! - Full reload: tear the runtime context down and rebuild it from empty
//! - Background retry when bootstrap fails
//! - Per-configuration and `*ALL*` message streams
//!
//! # Concurrency
//! ```text
//! gate (RwLock)       per-name operations share it; init, destroy and full reload own it
//! locks[name] (Mutex) serializes load, unload and reload of one name
//! loading (set)       names with a load in flight; full reload refuses while non-empty
//! ```
//! Full reload never waits for in-flight loads. It refuses with `EngineError::Busy`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::schema::{EngineSettings, RetryConfig};
use crate::config::ConfigurationEntry;
use crate::engine::catalog::ConfigurationCatalog;
use crate::engine::configuration::{Configuration, ConfigurationState, ConfigurationSummary};
use crate::engine::digester::{Digester, TomlDigester};
use crate::engine::endpoints::{EndpointRegistry, ListenerRegistry};
use crate::engine::manager::ClassLoaderManager;
use crate::engine::retry::{Attempt, RetryWorker};
use crate::error::{ConfigurationError, EngineError};
use crate::loader::store::ConfigStore;
use crate::loader::{
    DirectoryLoader, LoaderContext, LoaderHandle, NoResources, OverrideResourceLoader, Resource,
    ResourceResolver,
};
use crate::observability::messages::{Level, LogEntry, MessageLog};
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::xml::EntityResolver;

/// Resource holding `configuration.version` and `configuration.timestamp`.
const BUILD_INFO: &str = "build.properties";

/// Snapshot of the engine for operators.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub instance_name: String,
    pub initialized: bool,
    pub retry_pending: bool,
    pub loading: Vec<String>,
    pub configurations: Vec<ConfigurationSummary>,
}

/// Everything built by one bootstrap and dropped by `destroy`.
struct RuntimeContext {
    manager: ClassLoaderManager,
    entries: HashMap<String, ConfigurationEntry>,
    order: Vec<String>,
    configurations: DashMap<String, Arc<Configuration>>,
}

struct EngineInner {
    settings: EngineSettings,
    retry_config: RetryConfig,
    catalog: Arc<dyn ConfigurationCatalog>,
    digester: Arc<dyn Digester>,
    endpoints: Arc<dyn EndpointRegistry>,
    store: Option<Arc<dyn ConfigStore>>,
    shared: Arc<dyn ResourceResolver>,
    context: ArcSwapOption<RuntimeContext>,
    messages: MessageLog,
    loading: StdMutex<HashMap<String, usize>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    gate: RwLock<()>,
    retry: StdMutex<Option<RetryWorker>>,
    retries_spawned: AtomicUsize,
}

/// Marks a name as loading for as long as it lives.
struct LoadingGuard<'a> {
    loading: &'a StdMutex<HashMap<String, usize>>,
    name: String,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut loading = self.loading.lock().expect("loading lock poisoned");
        if let Some(count) = loading.get_mut(&self.name) {
            *count -= 1;
            if *count == 0 {
                loading.remove(&self.name);
            }
        }
    }
}

/// Builder for [`ConfigurationEngine`].
pub struct EngineBuilder {
    settings: EngineSettings,
    retry: RetryConfig,
    catalog: Arc<dyn ConfigurationCatalog>,
    store: Option<Arc<dyn ConfigStore>>,
    digester: Arc<dyn Digester>,
    endpoints: Arc<dyn EndpointRegistry>,
}

impl EngineBuilder {
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn digester(mut self, digester: Arc<dyn Digester>) -> Self {
        self.digester = digester;
        self
    }

    pub fn endpoints(mut self, endpoints: Arc<dyn EndpointRegistry>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn build(self) -> ConfigurationEngine {
        let shared: Arc<dyn ResourceResolver> = match &self.settings.shared_resources {
            Some(dir) => {
                if !dir.is_dir() {
                    tracing::warn!(path = ?dir, "Shared resources directory does not exist");
                }
                Arc::new(DirectoryLoader::new(dir))
            }
            None => Arc::new(NoResources),
        };
        let messages = MessageLog::new(
            self.settings.instance_name.clone(),
            self.settings.message_log_capacity,
        );

        ConfigurationEngine {
            inner: Arc::new(EngineInner {
                settings: self.settings,
                retry_config: self.retry,
                catalog: self.catalog,
                digester: self.digester,
                endpoints: self.endpoints,
                store: self.store,
                shared,
                context: ArcSwapOption::empty(),
                messages,
                loading: StdMutex::new(HashMap::new()),
                locks: DashMap::new(),
                gate: RwLock::new(()),
                retry: StdMutex::new(None),
                retries_spawned: AtomicUsize::new(0),
            }),
        }
    }
}

/// Orchestrates the lifecycle of all configurations. Cheap to clone.
#[derive(Clone)]
pub struct ConfigurationEngine {
    inner: Arc<EngineInner>,
}

impl ConfigurationEngine {
    pub fn builder(catalog: Arc<dyn ConfigurationCatalog>) -> EngineBuilder {
        EngineBuilder {
            settings: EngineSettings::default(),
            retry: RetryConfig::default(),
            catalog,
            store: None,
            digester: Arc::new(TomlDigester),
            endpoints: Arc::new(ListenerRegistry::new()),
        }
    }

    /// Build the runtime context and load every configuration.
    ///
    /// Bootstrap failures are logged, not returned. With `retry`, a single
    /// background worker keeps retrying. Returns whether the engine is initialized.
    pub async fn init(&self, retry: bool) -> bool {
        let _gate = self.inner.gate.write().await;
        self.inner.init_locked(retry).await
    }

    /// Unload every configuration, drop the runtime context and cancel any retry worker.
    pub async fn destroy(&self) {
        self.inner.cancel_retry();
        let _gate = self.inner.gate.write().await;
        self.inner.destroy_locked().await;
    }

    /// Destroy and re-initialize, unless a load is in flight.
    pub async fn full_reload(&self) -> Result<(), EngineError> {
        let loading = self.inner.loading_names();
        if !loading.is_empty() {
            return Err(self.inner.refuse(loading));
        }
        let Ok(_gate) = self.inner.gate.try_write() else {
            return Err(self.inner.refuse(self.inner.loading_names()));
        };

        let start = Instant::now();
        self.inner.destroy_locked().await;

        let leftovers = self.inner.endpoints.outstanding_all();
        if !leftovers.is_empty() {
            let rendered: Vec<String> = leftovers
                .iter()
                .map(|(configuration, endpoint)| format!("{configuration}/{endpoint}"))
                .collect();
            self.inner.messages.application(
                Level::Error,
                format!(
                    "endpoints still registered after shutdown: [{}]",
                    rendered.join(", ")
                ),
            );
        }

        self.inner.init_locked(self.inner.retry_config.enabled).await;
        self.inner.messages.application(
            Level::Info,
            format!("full reload in {} ms", start.elapsed().as_millis()),
        );
        Ok(())
    }

    /// Load every configuration of the catalog. Failures are per configuration.
    pub async fn load_all(&self) -> Result<(), EngineError> {
        let _gate = self.inner.gate.read().await;
        let context = self.inner.runtime()?;
        for name in &context.order {
            let _ = self.inner.load_one(&context, name).await;
        }
        Ok(())
    }

    /// Load one configuration, replacing it if already loaded.
    ///
    /// Load failures are captured on the configuration and logged; the
    /// returned state tells the outcome. Unknown names are an error.
    pub async fn load(&self, name: &str) -> Result<ConfigurationState, EngineError> {
        let _gate = self.inner.gate.read().await;
        let context = self.inner.runtime()?;
        self.inner.load_one(&context, name).await
    }

    /// Unload one configuration. Returns whether it was loaded.
    pub async fn unload(&self, name: &str) -> Result<bool, EngineError> {
        let _gate = self.inner.gate.read().await;
        let context = self.inner.runtime()?;
        if !context.entries.contains_key(name) {
            self.inner
                .messages
                .unregistered(name, Level::Warn, "to unload not found");
            return Ok(false);
        }
        let lock = self.inner.lock_for(name);
        let _guard = lock.lock().await;
        Ok(self.inner.unload_locked(&context, name))
    }

    /// Unload then load one configuration under a single per-name lock.
    pub async fn reload(&self, name: &str) -> Result<ConfigurationState, EngineError> {
        let _gate = self.inner.gate.read().await;
        let context = self.inner.runtime()?;
        self.inner.load_one(&context, name).await
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.context.load().is_some()
    }

    pub fn instance_name(&self) -> &str {
        &self.inner.settings.instance_name
    }

    pub fn state(&self, name: &str) -> ConfigurationState {
        if self
            .inner
            .loading
            .lock()
            .expect("loading lock poisoned")
            .contains_key(name)
        {
            return ConfigurationState::Loading;
        }
        self.configuration(name)
            .map(|c| c.state())
            .unwrap_or(ConfigurationState::Unloaded)
    }

    pub fn configuration(&self, name: &str) -> Option<Arc<Configuration>> {
        let context = self.inner.context.load_full()?;
        let configuration = context.configurations.get(name)?.value().clone();
        Some(configuration)
    }

    /// Summaries in catalog order.
    pub fn configurations(&self) -> Vec<ConfigurationSummary> {
        let Some(context) = self.inner.context.load_full() else {
            return Vec::new();
        };
        context
            .order
            .iter()
            .filter_map(|name| context.configurations.get(name).map(|c| c.summary()))
            .collect()
    }

    /// The active resource loader handle of `name`.
    pub fn resource_loader(&self, name: &str) -> Option<LoaderHandle> {
        self.inner.context.load_full()?.manager.handle(name)
    }

    /// Resolve `path` through the resource view of configuration `name`.
    pub fn resolve(&self, name: &str, path: &str) -> Option<Resource> {
        self.resource_loader(name)?.resolve(path)
    }

    /// Entries of one message stream (`*ALL*` for the aggregate), oldest first.
    pub fn log(&self, name: &str) -> Vec<LogEntry> {
        self.inner.messages.entries(name)
    }

    /// How many handles were constructed for `name` in the current context.
    pub fn handle_constructions(&self, name: &str) -> usize {
        self.inner
            .context
            .load_full()
            .map(|c| c.manager.constructions(name))
            .unwrap_or(0)
    }

    /// Retry workers spawned over the engine's lifetime.
    pub fn retry_workers_spawned(&self) -> usize {
        self.inner.retries_spawned.load(Ordering::SeqCst)
    }

    pub fn retry_pending(&self) -> bool {
        self.inner
            .retry
            .lock()
            .expect("retry lock poisoned")
            .as_ref()
            .is_some_and(|w| !w.is_finished())
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            instance_name: self.inner.settings.instance_name.clone(),
            initialized: self.is_initialized(),
            retry_pending: self.retry_pending(),
            loading: self.inner.loading_names(),
            configurations: self.configurations(),
        }
    }
}

impl EngineInner {
    fn runtime(&self) -> Result<Arc<RuntimeContext>, EngineError> {
        self.context.load_full().ok_or(EngineError::NotInitialized)
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks.entry(name.to_string()).or_default().value().clone()
    }

    fn mark_loading(&self, name: &str) -> LoadingGuard<'_> {
        *self
            .loading
            .lock()
            .expect("loading lock poisoned")
            .entry(name.to_string())
            .or_insert(0) += 1;
        LoadingGuard {
            loading: &self.loading,
            name: name.to_string(),
        }
    }

    fn loading_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .loading
            .lock()
            .expect("loading lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn refuse(&self, loading: Vec<String>) -> EngineError {
        self.messages.application(
            Level::Warn,
            format!(
                "full reload refused, configurations loading: [{}]",
                loading.join(", ")
            ),
        );
        EngineError::Busy { loading }
    }

    async fn init_locked(self: &Arc<Self>, retry: bool) -> bool {
        if self.context.load().is_some() {
            self.messages
                .application(Level::Warn, "already initialized, ignoring init");
            return true;
        }
        let start = Instant::now();
        match self.bootstrap().await {
            Ok(()) => {
                self.messages.application(
                    Level::Info,
                    format!("startup in {} ms", start.elapsed().as_millis()),
                );
                true
            }
            Err(e) => {
                self.messages
                    .application(Level::Error, format!("could not start: {e}"));
                if retry {
                    self.spawn_retry();
                }
                false
            }
        }
    }

    async fn bootstrap(&self) -> Result<(), EngineError> {
        let entries = self.catalog.entries().await?;
        let order: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        let loader_context = LoaderContext {
            instance_name: self.settings.instance_name.clone(),
            store: self.store.clone(),
        };
        let context = Arc::new(RuntimeContext {
            manager: ClassLoaderManager::new(loader_context, self.shared.clone()),
            entries: entries.into_iter().map(|e| (e.name.clone(), e)).collect(),
            order,
            configurations: DashMap::new(),
        });
        self.context.store(Some(context.clone()));
        tracing::info!(configurations = context.order.len(), "Runtime context built");

        for name in &context.order {
            let _ = self.load_one(&context, name).await;
        }
        Ok(())
    }

    fn spawn_retry(self: &Arc<Self>) {
        let mut slot = self.retry.lock().expect("retry lock poisoned");
        if slot.as_ref().is_some_and(|w| !w.is_finished()) {
            tracing::debug!("Retry worker already running");
            return;
        }

        let weak = Arc::downgrade(self);
        let backoff = Backoff::new(
            self.retry_config.base_delay_ms,
            self.retry_config.max_delay_ms,
        );
        *slot = Some(RetryWorker::spawn(backoff, move |attempt| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => inner.retry_bootstrap(attempt).await,
                    None => Attempt::Abandoned,
                }
            }
        }));
        self.retries_spawned.fetch_add(1, Ordering::SeqCst);
        self.messages
            .application(Level::Warn, "bootstrap failed, retrying in background");
    }

    async fn retry_bootstrap(&self, attempt: u32) -> Attempt {
        let _gate = self.gate.write().await;
        let cancelled = self
            .retry
            .lock()
            .expect("retry lock poisoned")
            .as_ref()
            .map_or(true, |w| w.is_cancelled());
        if cancelled {
            return Attempt::Abandoned;
        }
        if self.context.load().is_some() {
            return Attempt::Succeeded;
        }

        metrics::record_bootstrap_retry();
        let start = Instant::now();
        match self.bootstrap().await {
            Ok(()) => {
                self.messages.application(
                    Level::Info,
                    format!(
                        "startup in {} ms after {attempt} retries",
                        start.elapsed().as_millis()
                    ),
                );
                Attempt::Succeeded
            }
            Err(e) => {
                self.messages
                    .application(Level::Warn, format!("retry {attempt} failed: {e}"));
                Attempt::Failed
            }
        }
    }

    fn cancel_retry(&self) {
        if let Some(worker) = self.retry.lock().expect("retry lock poisoned").take() {
            worker.cancel();
        }
    }

    async fn destroy_locked(&self) {
        self.cancel_retry();
        let Some(context) = self.context.swap(None) else {
            return;
        };
        let start = Instant::now();
        for name in context.order.iter().rev() {
            let lock = self.lock_for(name);
            let _guard = lock.lock().await;
            if context.configurations.contains_key(name) {
                self.unload_locked(&context, name);
            }
        }
        metrics::record_loaded_count(0);
        self.messages.application(
            Level::Info,
            format!("shutdown in {} ms", start.elapsed().as_millis()),
        );
    }

    async fn load_one(
        &self,
        context: &RuntimeContext,
        name: &str,
    ) -> Result<ConfigurationState, EngineError> {
        let Some(entry) = context.entries.get(name) else {
            self.messages.unregistered(
                name,
                Level::Error,
                format!("not found in [{}]", context.order.join(", ")),
            );
            return Err(ConfigurationError::Unregistered {
                name: name.to_string(),
            }
            .into());
        };

        let _loading = self.mark_loading(name);
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        if context.configurations.contains_key(name) {
            self.unload_locked(context, name);
        }
        Ok(self.load_locked(context, entry).await)
    }

    async fn load_locked(
        &self,
        context: &RuntimeContext,
        entry: &ConfigurationEntry,
    ) -> ConfigurationState {
        let start = Instant::now();
        let mut configuration = Configuration::new(entry.name.clone());

        match self.build(context, entry, &mut configuration, start).await {
            Ok(()) => {
                let outcome = match configuration.state() {
                    ConfigurationState::Started => "started",
                    _ => "loaded",
                };
                metrics::record_load(outcome, start);
            }
            Err(e) => {
                configuration.fail(&e);
                self.messages.configuration(
                    &entry.name,
                    configuration.version(),
                    Level::Error,
                    "failed to load",
                    Some(&e),
                );
                metrics::record_load("failed", start);
            }
        }

        let state = configuration.state();
        context
            .configurations
            .insert(entry.name.clone(), Arc::new(configuration));
        metrics::record_loaded_count(context.configurations.len());
        state
    }

    async fn build(
        &self,
        context: &RuntimeContext,
        entry: &ConfigurationEntry,
        configuration: &mut Configuration,
        start: Instant,
    ) -> Result<(), ConfigurationError> {
        let name = entry.name.as_str();
        let acquired = context.manager.get(name, &context.entries).await?;
        let handle = acquired.handle;

        if !acquired.created {
            if let Err(e) = context.manager.reload(&handle).await {
                if handle.is_failed() {
                    return Err(e);
                }
                let version = handle.metadata().and_then(|m| m.version);
                self.messages.configuration(
                    name,
                    version.as_deref(),
                    Level::Error,
                    "could not reload resources, keeping last-good content",
                    Some(&e),
                );
            }
        }

        let descriptor = entry.descriptor_path(&self.settings.instance_name);
        let resolver = EntityResolver::new(handle.clone());
        self.digester
            .digest(&handle, &resolver, configuration, &descriptor)?;

        configuration.version = build_version(&handle, &descriptor)
            .or_else(|| handle.metadata().and_then(|m| m.version))
            .or_else(|| configuration.declared_version.clone());
        let version = configuration.version.clone();

        if let (Some(declared), Some(actual)) = (&configuration.declared_version, &version) {
            if declared != actual {
                self.messages.configuration(
                    name,
                    Some(actual.as_str()),
                    Level::Warn,
                    format!("declared version [{declared}] does not match actual version"),
                    None,
                );
            }
        }
        if let Some(declared) = &configuration.declared_name {
            if declared != name {
                self.messages.configuration(
                    name,
                    version.as_deref(),
                    Level::Warn,
                    format!("declared name [{declared}] does not match configuration name"),
                    None,
                );
            }
        }

        self.messages.configuration(
            name,
            version.as_deref(),
            Level::Info,
            format!("configured in {} ms", start.elapsed().as_millis()),
            None,
        );

        if !configuration.auto_start {
            configuration.state = ConfigurationState::Loaded;
            self.messages.configuration(
                name,
                version.as_deref(),
                Level::Info,
                "loaded, auto start disabled",
                None,
            );
            return Ok(());
        }

        self.start_endpoints(name, configuration)?;
        configuration.state = ConfigurationState::Started;
        self.messages.configuration(
            name,
            version.as_deref(),
            Level::Info,
            format!("startup in {} ms", start.elapsed().as_millis()),
            None,
        );
        Ok(())
    }

    fn start_endpoints(
        &self,
        name: &str,
        configuration: &Configuration,
    ) -> Result<(), ConfigurationError> {
        for endpoint in configuration.endpoints() {
            if let Err(e) = self.endpoints.register(name, endpoint) {
                self.endpoints.unregister_configuration(name);
                return Err(e);
            }
        }
        Ok(())
    }

    fn unload_locked(&self, context: &RuntimeContext, name: &str) -> bool {
        let start = Instant::now();
        let Some((_, configuration)) = context.configurations.remove(name) else {
            self.messages
                .configuration(name, None, Level::Warn, "to unload not found", None);
            return false;
        };

        let released = self.endpoints.unregister_configuration(name);
        tracing::debug!(configuration = %name, released = released.len(), "Endpoints released");
        let leftovers = self.endpoints.outstanding(name);
        if !leftovers.is_empty() {
            self.messages.configuration(
                name,
                configuration.version(),
                Level::Warn,
                format!(
                    "endpoints still registered after unload: [{}]",
                    leftovers.join(", ")
                ),
                None,
            );
        }

        metrics::record_loaded_count(context.configurations.len());
        self.messages.configuration(
            name,
            configuration.version(),
            Level::Info,
            format!("unload in {} ms", start.elapsed().as_millis()),
            None,
        );
        true
    }
}

/// Version from the `build.properties` next to the descriptor, as
/// `version` or `version_timestamp`.
fn build_version(handle: &OverrideResourceLoader, descriptor: &str) -> Option<String> {
    let path = match descriptor.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{BUILD_INFO}"),
        None => BUILD_INFO.to_string(),
    };
    let resource = handle.resolve_local(&path)?;
    let text = std::str::from_utf8(resource.bytes()).ok()?;

    let mut version = None;
    let mut timestamp = None;
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some((key, value)) = line.split_once(['=', ':']) else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "configuration.version" if !value.is_empty() => version = Some(value.to_string()),
            "configuration.timestamp" if !value.is_empty() => timestamp = Some(value.to_string()),
            _ => {}
        }
    }

    let version = version?;
    Some(match timestamp {
        Some(timestamp) => format!("{version}_{timestamp}"),
        None => version,
    })
}
