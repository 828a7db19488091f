//! Operator-facing message log.
//!
//! # Responsibilities
//! - Keep a bounded ring of lifecycle messages per configuration name
//! - Keep one aggregate `*ALL*` ring receiving every message
//! - Mirror each message into `tracing` at the matching level
//!
//! # Design Decisions
//! - Entries are immutable once appended; the oldest entry is evicted first
//! - Rings live on the engine, not on a Configuration, so they survive reloads

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Key of the aggregate stream.
pub const ALL: &str = "*ALL*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Configuration the message is about, `None` for application-level messages.
    pub configuration: Option<String>,
    pub version: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub text: String,
    pub cause: Option<String>,
}

pub struct MessageLog {
    instance_name: String,
    capacity: usize,
    rings: DashMap<String, VecDeque<LogEntry>>,
}

impl MessageLog {
    pub fn new(instance_name: impl Into<String>, capacity: usize) -> Self {
        Self {
            instance_name: instance_name.into(),
            capacity: capacity.max(1),
            rings: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Application-level message, recorded on `*ALL*` only.
    pub fn application(&self, level: Level, text: impl Into<String>) {
        self.append(None, None, level, text.into(), None, false);
    }

    /// Configuration-scoped message, recorded on its own ring and on `*ALL*`.
    pub fn configuration(
        &self,
        name: &str,
        version: Option<&str>,
        level: Level,
        text: impl Into<String>,
        cause: Option<&dyn std::error::Error>,
    ) {
        self.append(
            Some(name),
            version,
            level,
            text.into(),
            cause.map(render_cause),
            true,
        );
    }

    /// Message about a name the engine does not manage. Tagged with the name
    /// but recorded on `*ALL*` only, so unknown names never get a ring.
    pub fn unregistered(&self, name: &str, level: Level, text: impl Into<String>) {
        self.append(Some(name), None, level, text.into(), None, false);
    }

    fn append(
        &self,
        name: Option<&str>,
        version: Option<&str>,
        level: Level,
        text: String,
        cause: Option<String>,
        scoped: bool,
    ) {
        let subject = match name {
            Some(name) => format!("Configuration [{name}]"),
            None => format!("Application [{}]", self.instance_name),
        };
        let rendered = match (version, &cause) {
            (Some(v), Some(c)) => format!("{subject} [{v}] {text}: {c}"),
            (Some(v), None) => format!("{subject} [{v}] {text}"),
            (None, Some(c)) => format!("{subject} {text}: {c}"),
            (None, None) => format!("{subject} {text}"),
        };
        match level {
            Level::Info => tracing::info!(configuration = ?name, version = ?version, "{}", rendered),
            Level::Warn => tracing::warn!(configuration = ?name, version = ?version, "{}", rendered),
            Level::Error => tracing::error!(configuration = ?name, version = ?version, "{}", rendered),
        }

        let entry = LogEntry {
            configuration: name.map(String::from),
            version: version.map(String::from),
            timestamp: Utc::now(),
            level,
            text,
            cause,
        };
        if let (Some(name), true) = (name, scoped) {
            self.push(name, entry.clone());
        }
        self.push(ALL, entry);
    }

    fn push(&self, key: &str, entry: LogEntry) {
        let mut ring = self.rings.entry(key.to_string()).or_default();
        ring.push_back(entry);
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    /// Entries of one stream, oldest first. Unknown keys yield an empty list.
    pub fn entries(&self, key: &str) -> Vec<LogEntry> {
        self.rings
            .get(key)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn render_cause(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        rendered.push_str(": ");
        rendered.push_str(&inner.to_string());
        source = inner.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_messages_reach_both_streams() {
        let log = MessageLog::new("engine", 10);
        log.configuration("A", Some("1.0"), Level::Info, "startup in 3 ms", None);
        log.application(Level::Warn, "something global");

        let a = log.entries("A");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].version.as_deref(), Some("1.0"));
        assert_eq!(log.entries(ALL).len(), 2);
        assert!(log.entries("B").is_empty());
    }

    #[test]
    fn rings_evict_oldest_first() {
        let log = MessageLog::new("engine", 3);
        for i in 0..5 {
            log.configuration("A", None, Level::Info, format!("m{i}"), None);
        }
        let texts: Vec<_> = log.entries("A").into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn unregistered_names_get_no_ring() {
        let log = MessageLog::new("engine", 10);
        for i in 0..20 {
            log.unregistered(&format!("ghost-{i}"), Level::Warn, "to unload not found");
        }
        assert!(log.entries("ghost-0").is_empty());
        assert_eq!(log.rings.len(), 1);

        let all = log.entries(ALL);
        assert_eq!(all.len(), 10);
        assert_eq!(all[9].configuration.as_deref(), Some("ghost-19"));
    }

    #[test]
    fn cause_chain_is_rendered() {
        let log = MessageLog::new("engine", 10);
        let err = crate::error::ConfigurationError::Resolution(
            crate::error::ResolutionError::NotFound {
                system_id: "a.xsd".into(),
            },
        );
        log.configuration("A", None, Level::Error, "exception", Some(&err));
        let entry = &log.entries("A")[0];
        assert_eq!(entry.level, Level::Error);
        assert!(entry.cause.as_deref().unwrap().contains("a.xsd"));
    }
}
