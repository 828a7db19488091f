//! Descriptor digestion.
//!
//! # Data Flow
//! ```text
//! descriptor path (Configuration.toml or <name>/Configuration.toml)
//!     → OverrideResourceLoader::resolve (own resources, then inherited)
//!     → TOML document: name, version, auto_start, imports, [[adapters]]
//!     → every import, schema and stylesheet resolved through the EntityResolver
//!     → Configuration object graph populated in place
//! ```

use serde::Deserialize;

use crate::engine::configuration::{Adapter, Configuration};
use crate::error::ConfigurationError;
use crate::loader::{OverrideResourceLoader, ResourceResolver};
use crate::xml::{EntityResolver, ResourceIdentifier};

/// Parses a configuration's descriptor into its runtime object graph.
pub trait Digester: Send + Sync {
    fn digest(
        &self,
        loader: &OverrideResourceLoader,
        resolver: &EntityResolver,
        configuration: &mut Configuration,
        descriptor: &str,
    ) -> Result<(), ConfigurationError>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Descriptor {
    name: Option<String>,
    version: Option<String>,
    #[serde(default = "default_auto_start")]
    auto_start: bool,
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    adapters: Vec<Adapter>,
}

fn default_auto_start() -> bool {
    true
}

/// Digester for TOML descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlDigester;

impl Digester for TomlDigester {
    fn digest(
        &self,
        loader: &OverrideResourceLoader,
        resolver: &EntityResolver,
        configuration: &mut Configuration,
        descriptor: &str,
    ) -> Result<(), ConfigurationError> {
        let resource =
            loader
                .resolve(descriptor)
                .ok_or_else(|| ConfigurationError::DescriptorNotFound {
                    name: configuration.name().to_string(),
                    path: descriptor.to_string(),
                })?;
        let text = std::str::from_utf8(resource.bytes()).map_err(|e| {
            ConfigurationError::InvalidDescriptor {
                path: resource.location().to_string(),
                message: e.to_string(),
            }
        })?;
        let parsed: Descriptor =
            toml::from_str(text).map_err(|e| ConfigurationError::InvalidDescriptor {
                path: resource.location().to_string(),
                message: e.to_string(),
            })?;

        let references = parsed.imports.iter().chain(
            parsed
                .adapters
                .iter()
                .flat_map(|a| a.schema.iter().chain(a.stylesheet.iter())),
        );
        for reference in references {
            if let Some(source) = resolver.resolve_entity(&ResourceIdentifier::system(reference))? {
                configuration
                    .resources
                    .insert(reference.clone(), source.resource);
            }
        }
        configuration
            .resources
            .insert(descriptor.to_string(), resource.clone());

        tracing::debug!(
            configuration = %configuration.name(),
            descriptor = %resource.location(),
            adapters = parsed.adapters.len(),
            resources = configuration.resources.len(),
            "Descriptor digested"
        );

        configuration.declared_name = parsed.name;
        configuration.declared_version = parsed.version;
        configuration.auto_start = parsed.auto_start;
        configuration.adapters = parsed.adapters;
        Ok(())
    }
}
