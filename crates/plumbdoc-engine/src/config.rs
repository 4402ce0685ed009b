use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use plumbdoc_contracts::store::DEFAULT_AUTOSAVE_DELAY;

use crate::attachments::DEFAULT_IMAGE_MAX_DIM;
use crate::retry::RetryPolicy;

pub const DEFAULT_DATA_DIR: &str = "plumbdoc-data";
const MAX_RETRIES: usize = 6;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    /// Requested model; `None` lets the selector pick the default.
    pub model: Option<String>,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub image_max_dim: u32,
    pub autosave_delay: Duration,
    pub temperature: Option<f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            model: None,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(120),
            image_max_dim: DEFAULT_IMAGE_MAX_DIM,
            autosave_delay: DEFAULT_AUTOSAVE_DELAY,
            temperature: Some(0.4),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();
        if let Some(dir) = read("PLUMBDOC_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config.model = read("PLUMBDOC_MODEL");
        if let Some(raw) = read("PLUMBDOC_AI_RETRIES") {
            let retries: usize = raw
                .parse()
                .with_context(|| format!("PLUMBDOC_AI_RETRIES must be a number, got '{raw}'"))?;
            config.retry.retries = retries.min(MAX_RETRIES);
        }
        if let Some(raw) = read("PLUMBDOC_AI_RETRY_DELAY_MS") {
            let millis: u64 = raw.parse().with_context(|| {
                format!("PLUMBDOC_AI_RETRY_DELAY_MS must be a number, got '{raw}'")
            })?;
            config.retry.initial_delay = Duration::from_millis(millis);
        }
        if let Some(raw) = read("PLUMBDOC_AUTOSAVE_MS") {
            let millis: u64 = raw
                .parse()
                .with_context(|| format!("PLUMBDOC_AUTOSAVE_MS must be a number, got '{raw}'"))?;
            config.autosave_delay = Duration::from_millis(millis);
        }
        if let Some(raw) = read("PLUMBDOC_IMAGE_MAX_DIM") {
            config.image_max_dim = raw
                .parse()
                .with_context(|| format!("PLUMBDOC_IMAGE_MAX_DIM must be a number, got '{raw}'"))?;
        }
        Ok(config)
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join("storage.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() -> anyhow::Result<()> {
        let config = EngineConfig::from_lookup(lookup(&[]))?;
        assert_eq!(config.data_dir, PathBuf::from("plumbdoc-data"));
        assert_eq!(config.model, None);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.autosave_delay, Duration::from_secs(1));
        assert_eq!(config.storage_path(), PathBuf::from("plumbdoc-data/storage.json"));
        Ok(())
    }

    #[test]
    fn overrides_are_parsed_and_retries_capped() -> anyhow::Result<()> {
        let config = EngineConfig::from_lookup(lookup(&[
            ("PLUMBDOC_DATA_DIR", "/srv/plumbdoc"),
            ("PLUMBDOC_MODEL", " gemini-2.5-pro "),
            ("PLUMBDOC_AI_RETRIES", "12"),
            ("PLUMBDOC_AI_RETRY_DELAY_MS", "250"),
            ("PLUMBDOC_AUTOSAVE_MS", "400"),
            ("PLUMBDOC_IMAGE_MAX_DIM", "800"),
        ]))?;
        assert_eq!(config.events_path(), PathBuf::from("/srv/plumbdoc/events.jsonl"));
        assert_eq!(config.model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(config.retry.retries, 6);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(config.autosave_delay, Duration::from_millis(400));
        assert_eq!(config.image_max_dim, 800);
        Ok(())
    }

    #[test]
    fn malformed_number_is_an_error() {
        assert!(EngineConfig::from_lookup(lookup(&[("PLUMBDOC_AI_RETRIES", "three")])).is_err());
    }
}
