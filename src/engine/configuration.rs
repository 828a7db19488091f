//! The runtime object graph of one loaded configuration.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::loader::Resource;

/// Lifecycle state of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationState {
    Unloaded,
    Loading,
    Loaded,
    Started,
    FailedToLoad,
}

impl fmt::Display for ConfigurationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigurationState::Unloaded => "unloaded",
            ConfigurationState::Loading => "loading",
            ConfigurationState::Loaded => "loaded",
            ConfigurationState::Started => "started",
            ConfigurationState::FailedToLoad => "failed_to_load",
        };
        f.write_str(s)
    }
}

/// An adapter declared by a configuration: the listeners it opens and the
/// schema and stylesheet it validates and transforms with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adapter {
    pub name: String,
    #[serde(default)]
    pub listeners: Vec<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub stylesheet: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    name: String,
    instance_id: Uuid,
    loaded_at: DateTime<Utc>,
    pub(crate) version: Option<String>,
    pub(crate) declared_name: Option<String>,
    pub(crate) declared_version: Option<String>,
    pub(crate) auto_start: bool,
    pub(crate) state: ConfigurationState,
    pub(crate) last_error: Option<String>,
    pub(crate) adapters: Vec<Adapter>,
    pub(crate) resources: BTreeMap<String, Resource>,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_id: Uuid::new_v4(),
            loaded_at: Utc::now(),
            version: None,
            declared_name: None,
            declared_version: None,
            auto_start: true,
            state: ConfigurationState::Loading,
            last_error: None,
            adapters: Vec::new(),
            resources: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of this load. Every load, including reloads, gets a new one.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn declared_name(&self) -> Option<&str> {
        self.declared_name.as_deref()
    }

    pub fn declared_version(&self) -> Option<&str> {
        self.declared_version.as_deref()
    }

    pub fn auto_start(&self) -> bool {
        self.auto_start
    }

    pub fn state(&self) -> ConfigurationState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn adapters(&self) -> &[Adapter] {
        &self.adapters
    }

    /// Resources resolved while digesting, keyed by the reference used.
    pub fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    /// Listener names opened when the configuration is started.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.adapters
            .iter()
            .flat_map(|a| a.listeners.iter().map(String::as_str))
    }

    pub(crate) fn fail(&mut self, error: &dyn std::error::Error) {
        self.state = ConfigurationState::FailedToLoad;
        self.last_error = Some(error.to_string());
        self.adapters.clear();
        self.resources.clear();
    }

    pub fn summary(&self) -> ConfigurationSummary {
        ConfigurationSummary {
            name: self.name.clone(),
            version: self.version.clone(),
            state: self.state,
            instance_id: self.instance_id,
            loaded_at: self.loaded_at,
            last_error: self.last_error.clone(),
            adapters: self.adapters.len(),
            resources: self.resources.len(),
        }
    }
}

/// Serializable view of a configuration for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSummary {
    pub name: String,
    pub version: Option<String>,
    pub state: ConfigurationState,
    pub instance_id: Uuid,
    pub loaded_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub adapters: usize,
    pub resources: usize,
}
