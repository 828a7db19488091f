//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (parents reference declared configurations)
//! - Reject parent cycles before any loader is built
//! - Validate value ranges (capacities > 0, retry delays ordered)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::schema::{ConfigurationEntry, EngineConfig};
use crate::loader::LoaderKind;

/// One semantic problem in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted location of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.engine.instance_name.trim().is_empty() {
        errors.push(ValidationError::new("engine.instance_name", "must not be empty"));
    }
    if config.engine.message_log_capacity == 0 {
        errors.push(ValidationError::new(
            "engine.message_log_capacity",
            "must be greater than zero",
        ));
    }
    if config.retry.base_delay_ms == 0 {
        errors.push(ValidationError::new("retry.base_delay_ms", "must be greater than zero"));
    }
    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        errors.push(ValidationError::new(
            "retry.max_delay_ms",
            "must not be lower than retry.base_delay_ms",
        ));
    }
    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty"));
    }

    validate_entries(&config.configurations, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_entries(entries: &[ConfigurationEntry], errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for (i, entry) in entries.iter().enumerate() {
        let field = |name: &str| format!("configurations[{i}].{name}");

        if entry.name.trim().is_empty() {
            errors.push(ValidationError::new(field("name"), "must not be empty"));
        } else if !seen.insert(entry.name.as_str()) {
            errors.push(ValidationError::new(
                field("name"),
                format!("duplicate configuration '{}'", entry.name),
            ));
        }

        match entry.kind {
            LoaderKind::Archive | LoaderKind::Directory if entry.path.is_none() => {
                errors.push(ValidationError::new(
                    field("path"),
                    format!("required for {} configurations", entry.kind),
                ));
            }
            _ => {}
        }

        if entry.watch && entry.kind != LoaderKind::Directory {
            errors.push(ValidationError::new(
                field("watch"),
                "only directory configurations can be watched",
            ));
        }

        if let Some(parent) = &entry.parent {
            if !entries.iter().any(|e| &e.name == parent) {
                errors.push(ValidationError::new(
                    field("parent"),
                    format!("unknown parent '{parent}'"),
                ));
            }
        }
    }

    for chain in parent_cycles(entries) {
        errors.push(ValidationError::new(
            "configurations",
            format!("parent cycle: {chain}"),
        ));
    }
}

/// Every distinct parent cycle, rendered as `A -> B -> A`.
fn parent_cycles(entries: &[ConfigurationEntry]) -> Vec<String> {
    let parents: HashMap<&str, &str> = entries
        .iter()
        .filter_map(|e| e.parent.as_deref().map(|p| (e.name.as_str(), p)))
        .collect();

    let mut reported: HashSet<&str> = HashSet::new();
    let mut cycles = Vec::new();
    for entry in entries {
        let mut path: Vec<&str> = vec![entry.name.as_str()];
        let mut current = entry.name.as_str();
        while let Some(&parent) = parents.get(current) {
            if let Some(start) = path.iter().position(|n| *n == parent) {
                let members = &path[start..];
                if members.iter().all(|m| reported.insert(*m)) {
                    let mut chain = members.to_vec();
                    chain.push(parent);
                    cycles.push(chain.join(" -> "));
                }
                break;
            }
            path.push(parent);
            current = parent;
        }
    }
    cycles
}
