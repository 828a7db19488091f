//! Byte stores backing database configurations.
//!
//! # Responsibilities
//! - Fetch a configuration's packed bundle and its metadata by name
//! - Optionally pin an explicit version, otherwise return the active row
//! - Enumerate active configuration names for discovery

use std::str::FromStr;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::StoreError;
use crate::loader::BundleMetadata;

/// One stored configuration bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    pub name: String,
    pub version: String,
    pub file_name: Option<String>,
    pub user: Option<String>,
    pub created_at: Option<String>,
    pub bundle: Vec<u8>,
}

impl ConfigRecord {
    pub fn metadata(&self) -> BundleMetadata {
        BundleMetadata {
            file_name: self.file_name.clone(),
            user: self.user.clone(),
            version: Some(self.version.clone()),
            created_at: self.created_at.clone(),
        }
    }
}

/// Source of configuration bundles.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the bundle for `name`; the active one unless `version` is given.
    async fn fetch(&self, name: &str, version: Option<&str>)
        -> Result<Option<ConfigRecord>, StoreError>;

    /// Names of all configurations with an active bundle.
    async fn active_names(&self) -> Result<Vec<String>, StoreError>;
}

/// Store keeping the active bundle per name in memory.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    records: DashMap<String, ConfigRecord>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `record` the active bundle for its name.
    pub fn publish(&self, record: ConfigRecord) {
        self.records.insert(record.name.clone(), record);
    }

    pub fn remove(&self, name: &str) -> Option<ConfigRecord> {
        self.records.remove(name).map(|(_, record)| record)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn fetch(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Option<ConfigRecord>, StoreError> {
        Ok(self
            .records
            .get(name)
            .map(|r| r.value().clone())
            .filter(|r| version.map_or(true, |v| r.version == v)))
    }

    async fn active_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}

/// SQLite-backed store (table `config_bundles`).
#[derive(Debug, Clone)]
pub struct SqlConfigStore {
    pool: SqlitePool,
}

impl SqlConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url`, creating the database and table when missing.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(url = %url, "Configuration store connected");
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS config_bundles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                file_name TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                active INTEGER NOT NULL DEFAULT 0,
                bundle BLOB NOT NULL,
                UNIQUE (name, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert `record` and make it the only active version of its name.
    pub async fn publish(&self, record: &ConfigRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE config_bundles SET active = 0 WHERE name = ?")
            .bind(&record.name)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO config_bundles (name, version, file_name, created_by, created_at, active, bundle)
            VALUES (?, ?, ?, ?, COALESCE(?, CURRENT_TIMESTAMP), 1, ?)
            ON CONFLICT (name, version) DO UPDATE SET
                file_name = excluded.file_name,
                created_by = excluded.created_by,
                active = 1,
                bundle = excluded.bundle
            "#,
        )
        .bind(&record.name)
        .bind(&record.version)
        .bind(&record.file_name)
        .bind(&record.user)
        .bind(&record.created_at)
        .bind(&record.bundle)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for SqlConfigStore {
    async fn fetch(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Option<ConfigRecord>, StoreError> {
        let row = match version {
            Some(version) => {
                sqlx::query(
                    "SELECT name, version, file_name, created_by, created_at, bundle \
                     FROM config_bundles WHERE name = ? AND version = ?",
                )
                .bind(name)
                .bind(version)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT name, version, file_name, created_by, created_at, bundle \
                     FROM config_bundles WHERE name = ? AND active = 1",
                )
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map(|row| -> Result<ConfigRecord, StoreError> {
            Ok(ConfigRecord {
                name: row.try_get("name")?,
                version: row.try_get("version")?,
                file_name: row.try_get("file_name")?,
                user: row.try_get("created_by")?,
                created_at: row.try_get("created_at")?,
                bundle: row.try_get("bundle")?,
            })
        })
        .transpose()
    }

    async fn active_names(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT name FROM config_bundles WHERE active = 1 ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(StoreError::from))
            .collect()
    }
}
