//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::Notify;

use config_engine::config::schema::{EngineSettings, RetryConfig};
use config_engine::config::ConfigurationEntry;
use config_engine::engine::{ConfigurationCatalog, ConfigurationEngine, StaticCatalog};
use config_engine::error::{EngineError, StoreError};
use config_engine::loader::store::{ConfigRecord, ConfigStore, MemoryConfigStore};
use config_engine::observability::{Level, LogEntry};

/// Pack files into a `.tar.gz` bundle.
pub fn pack(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A bundle whose only tar header claims `size` bytes that never follow.
pub fn oversized_bundle(size: u64) -> Vec<u8> {
    use std::io::Write;

    let mut header = tar::Header::new_gnu();
    header.set_path("huge.xsl").unwrap();
    header.set_size(size);
    header.set_mode(0o644);
    header.set_cksum();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(header.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

pub fn record(name: &str, version: &str, files: &[(&str, &[u8])]) -> ConfigRecord {
    ConfigRecord {
        name: name.into(),
        version: version.into(),
        file_name: Some(format!("{name}.tar.gz")),
        user: Some("ops".into()),
        created_at: None,
        bundle: pack(files),
    }
}

/// Write `content` at `path` under `root`, creating parent directories.
pub fn write(root: &Path, path: &str, content: &str) {
    let file = root.join(path);
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(file, content).unwrap();
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        message_log_capacity: 100,
        ..EngineSettings::default()
    }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        enabled: true,
        base_delay_ms: 10,
        max_delay_ms: 50,
    }
}

pub fn engine(entries: Vec<ConfigurationEntry>) -> ConfigurationEngine {
    ConfigurationEngine::builder(Arc::new(StaticCatalog::new(entries)))
        .settings(settings())
        .build()
}

pub fn engine_with_store(
    entries: Vec<ConfigurationEntry>,
    store: Arc<dyn ConfigStore>,
) -> ConfigurationEngine {
    ConfigurationEngine::builder(Arc::new(StaticCatalog::new(entries)))
        .settings(settings())
        .store(store)
        .build()
}

pub fn texts(entries: &[LogEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.text.as_str()).collect()
}

pub fn count_level(entries: &[LogEntry], level: Level) -> usize {
    entries.iter().filter(|e| e.level == level).count()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Memory store whose fetches can be made to fail or to block.
#[derive(Default)]
pub struct ControlledStore {
    inner: MemoryConfigStore,
    failing: AtomicBool,
    blocking: AtomicBool,
    entered: Notify,
    released: Notify,
    fetches: AtomicUsize,
}

impl ControlledStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, record: ConfigRecord) {
        self.inner.publish(record);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make the next fetches wait until [`release`](Self::release).
    pub fn block(&self) {
        self.blocking.store(true, Ordering::SeqCst);
    }

    /// Wait until a fetch is parked on the block.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.blocking.store(false, Ordering::SeqCst);
        self.released.notify_one();
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigStore for ControlledStore {
    async fn fetch(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Option<ConfigRecord>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.blocking.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.released.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection refused".into()));
        }
        self.inner.fetch(name, version).await
    }

    async fn active_names(&self) -> Result<Vec<String>, StoreError> {
        self.inner.active_names().await
    }
}

/// Catalog that fails its first `failures` enumerations.
pub struct FlakyCatalog {
    entries: Vec<ConfigurationEntry>,
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyCatalog {
    pub fn new(entries: Vec<ConfigurationEntry>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            entries,
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigurationCatalog for FlakyCatalog {
    async fn entries(&self) -> Result<Vec<ConfigurationEntry>, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(EngineError::Catalog(format!("catalog unavailable (call {})", call + 1)));
        }
        Ok(self.entries.clone())
    }
}
