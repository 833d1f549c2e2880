use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::enrichment::Enricher;
use crate::errors::AppError;
use crate::providers::ProviderRegistry;

/// Everything a command needs, built once from the config.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub providers: Arc<ProviderRegistry>,
    /// `None` when AI enrichment is disabled.
    pub enricher: Option<Arc<Enricher>>,
}

impl AppState {
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let providers = ProviderRegistry::from_config(&config)?;
        if providers.is_empty() {
            return Err(AppError::Config("no job providers are enabled".to_string()));
        }
        info!(count = providers.len(), "Job providers registered");

        let enricher = Enricher::from_config(&config.ai)?.map(Arc::new);
        if let Some(enricher) = &enricher {
            info!(model = enricher.model(), "AI enrichment enabled");
        }

        Ok(Self {
            config,
            providers: Arc::new(providers),
            enricher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_state_from_default_config() {
        let state = AppState::from_config(config_from(&[("SERPAPI_KEY", "k")])).unwrap();
        assert_eq!(state.providers.len(), 2);
        assert!(state.enricher.is_none());
    }

    #[test]
    fn test_state_with_enrichment() {
        let state = AppState::from_config(config_from(&[
            ("AI_ENRICHMENT_ENABLED", "true"),
            ("AI_API_KEY", "sk-test"),
            ("AI_MODEL", "gpt-4o"),
        ]))
        .unwrap();
        assert_eq!(state.enricher.as_ref().map(|e| e.model()), Some("gpt-4o"));
    }

    #[test]
    fn test_all_providers_disabled_is_config_error() {
        let err = AppState::from_config(config_from(&[
            ("PROVIDER_SERPAPI_LINKEDIN_ENABLED", "false"),
            ("PROVIDER_SERPAPI_INDEED_ENABLED", "no"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}
