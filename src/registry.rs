//! Model alias resolution.
//!
//! The registry is built once from the loaded config at startup and never
//! mutated afterwards.

use crate::config::ModelAlias;
use crate::error::{ProxyError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    aliases: HashMap<String, ModelAlias>,
    owned_by: String,
}

/// One row of the model-listing endpoint.
#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub id: String,
    pub owned_by: String,
    pub context_length: Option<u64>,
    pub vision: bool,
}

impl ModelRegistry {
    pub fn new(aliases: HashMap<String, ModelAlias>, owned_by: impl Into<String>) -> Self {
        Self {
            aliases,
            owned_by: owned_by.into(),
        }
    }

    /// Resolve an external model name to an internal provider model id.
    ///
    /// Exact-match lookup against the alias table; an unknown name is
    /// accepted as-is only when it already uses the provider's namespaced
    /// id syntax (e.g. `amazon.nova-pro-v1:0`). No fuzzy matching.
    pub fn resolve<'a>(&'a self, external_name: &'a str) -> Result<&'a str> {
        if let Some(alias) = self.aliases.get(external_name) {
            return Ok(&alias.id);
        }

        if is_internal_model_id(external_name) {
            return Ok(external_name);
        }

        Err(ProxyError::model_not_found(external_name))
    }

    /// All configured aliases with their metadata, sorted by external name
    /// so the listing endpoint is deterministic.
    pub fn list(&self) -> Vec<ModelEntry> {
        let mut entries: Vec<ModelEntry> = self
            .aliases
            .iter()
            .map(|(name, alias)| ModelEntry {
                id: name.clone(),
                owned_by: self.owned_by.clone(),
                context_length: alias.context_length,
                vision: alias.vision,
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }
}

/// Whether a name already looks like a provider-namespaced model id:
/// a non-empty lowercase alphanumeric namespace, a dot, and a remainder.
fn is_internal_model_id(name: &str) -> bool {
    match name.split_once('.') {
        Some((namespace, rest)) => {
            !namespace.is_empty()
                && !rest.is_empty()
                && namespace
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelAlias;

    fn registry() -> ModelRegistry {
        let mut aliases = HashMap::new();
        aliases.insert(
            "gpt-4o".to_string(),
            ModelAlias {
                id: "amazon.nova-pro-v1:0".to_string(),
                context_length: Some(300_000),
                vision: true,
            },
        );
        aliases.insert(
            "gpt-4o-mini".to_string(),
            ModelAlias::new("amazon.nova-lite-v1:0"),
        );
        ModelRegistry::new(aliases, "nova")
    }

    #[test]
    fn test_resolve_alias() {
        let r = registry();
        assert_eq!(r.resolve("gpt-4o").unwrap(), "amazon.nova-pro-v1:0");
        assert_eq!(r.resolve("gpt-4o-mini").unwrap(), "amazon.nova-lite-v1:0");
        // Resolution is stable
        assert_eq!(r.resolve("gpt-4o").unwrap(), "amazon.nova-pro-v1:0");
    }

    #[test]
    fn test_resolve_passthrough_internal_id() {
        let r = registry();
        assert_eq!(
            r.resolve("amazon.nova-micro-v1:0").unwrap(),
            "amazon.nova-micro-v1:0"
        );
    }

    #[test]
    fn test_passthrough_borrows_from_caller_name() {
        let r = registry();
        let name = String::from("amazon.nova-micro-v1:0");
        let resolved = r.resolve(&name).unwrap();
        // Pass-through hands back the caller's own string, not a table entry.
        assert_eq!(resolved.as_ptr(), name.as_ptr());
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let r = registry();
        let err = r.resolve("gpt-5-maybe").unwrap_err();
        assert!(matches!(
            err,
            crate::error::ProxyError::ModelNotFound { .. }
        ));
        // A dot alone does not make an internal id
        assert!(r.resolve(".nova").is_err());
        assert!(r.resolve("Amazon.nova").is_err());
    }

    #[test]
    fn test_list_sorted_and_unique() {
        let r = registry();
        let entries = r.list();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "gpt-4o");
        assert_eq!(entries[1].id, "gpt-4o-mini");
        assert_eq!(entries[0].owned_by, "nova");
        assert_eq!(entries[0].context_length, Some(300_000));
        assert_eq!(
            entries.iter().filter(|e| e.id == "gpt-4o").count(),
            1
        );
    }
}
