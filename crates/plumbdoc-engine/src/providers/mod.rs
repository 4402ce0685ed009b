use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::attachments::InlineImage;

mod dryrun;
mod gemini;

pub use dryrun::DryrunProvider;
pub use gemini::GeminiProvider;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestPart {
    Text(String),
    Image(InlineImage),
}

#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub parts: Vec<RequestPart>,
    /// Raw tool declarations, e.g. `{"googleSearch": {}}`.
    pub tools: Vec<Value>,
    pub temperature: Option<f64>,
    pub timeout: Duration,
    pub metadata: Map<String, Value>,
}

impl ProviderRequest {
    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, RequestPart::Image(_)))
            .count()
    }

    pub fn prompt_chars(&self) -> usize {
        self.parts
            .iter()
            .map(|part| match part {
                RequestPart::Text(text) => text.chars().count(),
                RequestPart::Image(_) => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    /// Free-form model output, expected to contain one JSON payload.
    pub text: String,
    pub provider_response: Map<String, Value>,
    pub warnings: Vec<String>,
}

pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse>;
}

#[derive(Default)]
pub struct TextProviderRegistry {
    providers: BTreeMap<String, Box<dyn TextProvider>>,
}

impl TextProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: TextProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn TextProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry() -> TextProviderRegistry {
    let mut registry = TextProviderRegistry::new();
    registry.register(DryrunProvider);
    registry.register(GeminiProvider::new());
    registry
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
