use std::fmt;

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Text,
    Vision,
    Search,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Text => f.write_str("text"),
            Capability::Vision => f.write_str("vision"),
            Capability::Search => f.write_str("search"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
    pub context_window: Option<u64>,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, capabilities: &[Capability]) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: capabilities.to_vec(),
            context_window: None,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn supports_all(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().all(|capability| self.supports(*capability))
    }
}

/// Text models the engine can draft documents with, in preference order.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn from_specs(specs: impl IntoIterator<Item = ModelSpec>) -> Self {
        Self::new(Some(
            specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        ))
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn supporting(&self, capabilities: &[Capability]) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports_all(capabilities))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capabilities: &[Capability]) -> Option<ModelSpec> {
        self.get(name)
            .filter(|model| model.supports_all(capabilities))
            .cloned()
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    use Capability::{Search, Text, Vision};

    let mut map = IndexMap::new();
    let mut insert =
        |name: &str, provider: &str, capabilities: &[Capability], window: Option<u64>| {
            let mut spec = ModelSpec::new(name, provider, capabilities);
            spec.context_window = window;
            map.insert(name.to_string(), spec);
        };

    insert("gemini-2.5-flash", "gemini", &[Text, Vision, Search], Some(1_048_576));
    insert("gemini-2.5-pro", "gemini", &[Text, Vision, Search], Some(1_048_576));
    insert("gemini-2.0-flash", "gemini", &[Text, Vision, Search], Some(1_048_576));
    insert("gemini-2.5-flash-lite", "gemini", &[Text], Some(1_048_576));
    insert("dryrun-text-1", "dryrun", &[Text, Vision, Search], Some(8192));

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_prefers_gemini_flash() {
        let registry = ModelRegistry::default();
        let first = registry.supporting(&[Capability::Text, Capability::Vision]);
        assert_eq!(first.first().map(|spec| spec.name.as_str()), Some("gemini-2.5-flash"));
        assert!(registry.ensure("gemini-2.5-flash-lite", &[Capability::Vision]).is_none());
        assert!(registry.ensure("dryrun-text-1", &[Capability::Vision]).is_some());
    }
}
