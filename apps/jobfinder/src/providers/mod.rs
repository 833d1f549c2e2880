//! Job search providers: a trait-based registry, built once from config.
//!
//! Every provider returns `JobPosting`s; the search dispatcher merges them.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::config::Config;
use crate::models::{JobPosting, SearchFilters};

pub mod serpapi;

use serpapi::SerpApiProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("SerpAPI key is not configured for provider '{0}'")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// A job board search backend.
#[async_trait]
pub trait JobProvider: Send + Sync {
    /// Stable identifier, e.g. `serpapi_linkedin`.
    fn name(&self) -> &str;

    /// Human-readable source label written to the sheet.
    fn label(&self) -> &str;

    async fn search(
        &self,
        role: &str,
        location: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<JobPosting>, ProviderError>;
}

/// A provider paired with the result limit it was configured with.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub provider: Arc<dyn JobProvider>,
    pub limit: usize,
}

/// Enabled providers, in configuration order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one provider per enabled entry in `config.providers`, sharing a single HTTP client.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let client = Client::builder().build()?;
        let mut registry = Self::new();
        for settings in config.enabled_providers() {
            registry.register(
                Arc::new(SerpApiProvider::new(settings, client.clone())),
                settings.result_limit,
            );
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn JobProvider>, limit: usize) {
        self.providers.push(RegisteredProvider { provider, limit });
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProvider> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_registry_only_holds_enabled_providers_in_order() {
        let vars: HashMap<&str, &str> = [
            ("SERPAPI_KEY", "key"),
            ("PROVIDER_SERPAPI_LINKEDIN_LIMIT", "3"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        let registry = ProviderRegistry::from_config(&config).unwrap();
        let names: Vec<&str> = registry.iter().map(|p| p.provider.name()).collect();
        assert_eq!(names, vec!["serpapi_linkedin", "serpapi_indeed"]);
        assert_eq!(registry.iter().next().unwrap().limit, 3);
    }

    #[test]
    fn test_registry_skips_disabled_providers() {
        let vars: HashMap<&str, &str> = [
            ("PROVIDER_SERPAPI_LINKEDIN_ENABLED", "false"),
            ("PROVIDER_SERPAPI_INDEED_ENABLED", "0"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.is_empty());
    }
}
