//! Runtime endpoint registrations.
//!
//! Started configurations register the listeners of their adapters here.
//! After unload and after a full teardown the engine asks for leftovers and
//! logs them; leftovers never fail an operation.

use dashmap::DashMap;

use crate::error::ConfigurationError;

pub trait EndpointRegistry: Send + Sync {
    /// Register `endpoint` for `configuration`. Fails if another configuration owns it.
    fn register(&self, configuration: &str, endpoint: &str) -> Result<(), ConfigurationError>;

    /// Release every endpoint of `configuration`, returning the released names.
    fn unregister_configuration(&self, configuration: &str) -> Vec<String>;

    /// Endpoints still registered for `configuration`.
    fn outstanding(&self, configuration: &str) -> Vec<String>;

    /// Every registered endpoint as `(configuration, endpoint)`.
    fn outstanding_all(&self) -> Vec<(String, String)>;
}

/// In-process listener registry keyed by endpoint name.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    owners: DashMap<String, String>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointRegistry for ListenerRegistry {
    fn register(&self, configuration: &str, endpoint: &str) -> Result<(), ConfigurationError> {
        let owner = self
            .owners
            .entry(endpoint.to_string())
            .or_insert_with(|| configuration.to_string());
        if owner.as_str() != configuration {
            return Err(ConfigurationError::EndpointConflict {
                endpoint: endpoint.to_string(),
                owner: owner.value().clone(),
            });
        }
        tracing::debug!(configuration = %configuration, endpoint = %endpoint, "Endpoint registered");
        Ok(())
    }

    fn unregister_configuration(&self, configuration: &str) -> Vec<String> {
        let mut released = Vec::new();
        self.owners.retain(|endpoint, owner| {
            if owner.as_str() == configuration {
                released.push(endpoint.clone());
                false
            } else {
                true
            }
        });
        released.sort();
        released
    }

    fn outstanding(&self, configuration: &str) -> Vec<String> {
        let mut endpoints: Vec<String> = self
            .owners
            .iter()
            .filter(|e| e.value() == configuration)
            .map(|e| e.key().clone())
            .collect();
        endpoints.sort();
        endpoints
    }

    fn outstanding_all(&self) -> Vec<(String, String)> {
        let mut all: Vec<(String, String)> = self
            .owners
            .iter()
            .map(|e| (e.value().clone(), e.key().clone()))
            .collect();
        all.sort();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_registration_names_owner() {
        let registry = ListenerRegistry::new();
        registry.register("A", "orders-in").unwrap();
        registry.register("A", "orders-in").unwrap();

        let err = registry.register("B", "orders-in").unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::EndpointConflict { ref owner, .. } if owner == "A"
        ));
    }

    #[test]
    fn unregister_releases_only_own_endpoints() {
        let registry = ListenerRegistry::new();
        registry.register("A", "a1").unwrap();
        registry.register("A", "a2").unwrap();
        registry.register("B", "b1").unwrap();

        assert_eq!(registry.unregister_configuration("A"), vec!["a1", "a2"]);
        assert!(registry.outstanding("A").is_empty());
        assert_eq!(
            registry.outstanding_all(),
            vec![("B".to_string(), "b1".to_string())]
        );
    }
}
