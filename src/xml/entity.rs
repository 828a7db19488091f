//! External-entity resolution through a configuration's resource view.
//!
//! # Policy
//! - No identifying field at all → nothing to resolve (`Ok(None)`); parsers probe this way
//! - Namespace but no system id → import without location (`Ok(None)`)
//! - Empty or scheme-only system id → error
//! - Otherwise resolve through the backing resolver; a miss is an error carrying the id

use std::sync::Arc;

use crate::error::ResolutionError;
use crate::loader::{Resource, ResourceResolver};

/// Scheme under which configuration resources are addressed.
pub const RESOURCE_SCHEME: &str = "cfg";

/// Identifier of an external reference, as reported by a parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceIdentifier {
    pub public_id: Option<String>,
    pub literal_system_id: Option<String>,
    pub base_system_id: Option<String>,
    /// Absolute form of the system id; this is what gets resolved.
    pub expanded_system_id: Option<String>,
    pub namespace: Option<String>,
}

impl ResourceIdentifier {
    /// Identifier for a plain reference to `system_id`.
    pub fn system(system_id: impl Into<String>) -> Self {
        Self {
            expanded_system_id: Some(system_id.into()),
            ..Self::default()
        }
    }

    fn is_blank(&self) -> bool {
        self.public_id.is_none()
            && self.literal_system_id.is_none()
            && self.base_system_id.is_none()
            && self.expanded_system_id.is_none()
            && self.namespace.is_none()
    }
}

/// A resolved entity handed back to the parser.
#[derive(Debug, Clone)]
pub struct InputSource {
    pub public_id: Option<String>,
    pub system_id: String,
    pub resource: Resource,
}

/// Resolves parser entity callbacks through a `ResourceResolver`.
#[derive(Clone)]
pub struct EntityResolver {
    resolver: Arc<dyn ResourceResolver>,
}

impl EntityResolver {
    pub fn new(resolver: Arc<dyn ResourceResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolve_entity(
        &self,
        identifier: &ResourceIdentifier,
    ) -> Result<Option<InputSource>, ResolutionError> {
        tracing::debug!(
            public_id = ?identifier.public_id,
            expanded_system_id = ?identifier.expanded_system_id,
            literal_system_id = ?identifier.literal_system_id,
            namespace = ?identifier.namespace,
            "Resolving entity"
        );

        if identifier.is_blank() {
            return Ok(None);
        }
        let Some(system_id) = identifier.expanded_system_id.as_deref() else {
            // import with namespace but without location
            return Ok(None);
        };
        if system_id.is_empty() || is_scheme_only(system_id) {
            return Err(ResolutionError::EmptySystemId {
                system_id: system_id.to_string(),
            });
        }

        let resource = self
            .resolver
            .resolve(strip_scheme(system_id))
            .ok_or_else(|| ResolutionError::NotFound {
                system_id: system_id.to_string(),
            })?;

        Ok(Some(InputSource {
            public_id: identifier.public_id.clone(),
            system_id: system_id.to_string(),
            resource,
        }))
    }

    /// Resolve a plain reference, treating "nothing to resolve" as not found.
    pub fn resolve_system_id(&self, system_id: &str) -> Result<Resource, ResolutionError> {
        self.resolve_entity(&ResourceIdentifier::system(system_id))?
            .map(|source| source.resource)
            .ok_or_else(|| ResolutionError::NotFound {
                system_id: system_id.to_string(),
            })
    }
}

fn is_scheme_only(system_id: &str) -> bool {
    let Some(scheme) = system_id.strip_suffix(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn strip_scheme(system_id: &str) -> &str {
    system_id
        .strip_prefix(RESOURCE_SCHEME)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(system_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapResolver(HashMap<&'static str, &'static [u8]>);

    impl ResourceResolver for MapResolver {
        fn resolve(&self, path: &str) -> Option<Resource> {
            let path = crate::loader::normalize_path(path)?;
            self.0
                .get(path.as_str())
                .map(|data| Resource::new(path.clone(), "map", Arc::from(*data)))
        }
    }

    fn resolver() -> EntityResolver {
        let mut map = HashMap::new();
        map.insert("Xslt/names.xsl", &b"<xsl/>"[..]);
        EntityResolver::new(Arc::new(MapResolver(map)))
    }

    #[test]
    fn blank_identifier_resolves_to_none() {
        let result = resolver().resolve_entity(&ResourceIdentifier::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn namespace_without_location_resolves_to_none() {
        let identifier = ResourceIdentifier {
            namespace: Some("urn:orders".into()),
            ..ResourceIdentifier::default()
        };
        assert!(resolver().resolve_entity(&identifier).unwrap().is_none());
    }

    #[test]
    fn empty_and_scheme_only_ids_are_errors() {
        for id in ["", "cfg:", "classpath:"] {
            let identifier = ResourceIdentifier {
                public_id: Some("fakePublicId".into()),
                expanded_system_id: Some(id.into()),
                ..ResourceIdentifier::default()
            };
            let err = resolver().resolve_entity(&identifier).unwrap_err();
            assert!(matches!(err, ResolutionError::EmptySystemId { .. }), "{id}");
        }
    }

    #[test]
    fn resolves_relative_absolute_and_scheme_ids() {
        let resolver = resolver();
        for id in ["Xslt/names.xsl", "/Xslt/names.xsl", "cfg:/Xslt/names.xsl"] {
            let source = resolver
                .resolve_entity(&ResourceIdentifier::system(id))
                .unwrap()
                .unwrap();
            assert_eq!(source.system_id, id);
            assert_eq!(source.resource.bytes(), b"<xsl/>");
        }
    }

    #[test]
    fn unreachable_id_carries_system_id() {
        let err = resolver()
            .resolve_entity(&ResourceIdentifier::system("Xslt/missing.xsl"))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { .. }));
        assert_eq!(err.system_id(), "Xslt/missing.xsl");
    }

    #[test]
    fn scheme_detection() {
        assert!(is_scheme_only("cfg:"));
        assert!(is_scheme_only("x-bundle+v1:"));
        assert!(!is_scheme_only("cfg:/a.xsd"));
        assert!(!is_scheme_only("1abc:"));
        assert!(!is_scheme_only(":"));
    }
}
