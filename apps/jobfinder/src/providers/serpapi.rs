//! SerpAPI-backed providers. Both boards go through Google search with a `site:` filter.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::Instrument;

use crate::config::ProviderSettings;
use crate::logging::log_latency;
use crate::models::{JobPosting, SearchFilters};
use crate::providers::{JobProvider, ProviderError};

pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobBoard {
    LinkedIn,
    Indeed,
}

impl JobBoard {
    pub fn name(self) -> &'static str {
        match self {
            JobBoard::LinkedIn => "serpapi_linkedin",
            JobBoard::Indeed => "serpapi_indeed",
        }
    }

    pub fn default_label(self) -> &'static str {
        match self {
            JobBoard::LinkedIn => "LinkedIn (SerpAPI)",
            JobBoard::Indeed => "Indeed (SerpAPI)",
        }
    }

    fn site_filter(self) -> &'static str {
        match self {
            JobBoard::LinkedIn => "site:linkedin.com/jobs",
            JobBoard::Indeed => "site:indeed.com",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
    date: Option<String>,
    displayed_link: Option<String>,
    position: Option<Value>,
}

pub struct SerpApiProvider {
    client: Client,
    board: JobBoard,
    name: String,
    label: String,
    api_key: Option<String>,
    timeout: Duration,
    endpoint: String,
}

impl SerpApiProvider {
    pub fn new(settings: &ProviderSettings, client: Client) -> Self {
        Self {
            client,
            board: settings.board,
            name: settings.name.clone(),
            label: settings.label.clone(),
            api_key: settings.api_key.clone(),
            timeout: settings.timeout,
            endpoint: SERPAPI_ENDPOINT.to_string(),
        }
    }

    /// Points the provider at a different search endpoint (used against mock servers).
    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn fetch(&self, params: &[(&str, String)]) -> Result<SearchResponse, ProviderError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(params)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<SearchResponse>().await?)
    }

    fn to_posting(&self, item: OrganicResult) -> Option<JobPosting> {
        let link = item.link.filter(|l| !l.is_empty())?;

        let mut metadata = BTreeMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                metadata.insert(key.to_string(), v);
            }
        };
        put("posted_at", item.date);
        put("snippet", item.snippet);
        put("displayed_link", item.displayed_link);
        put(
            "position",
            item.position.and_then(|p| match p {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            }),
        );

        Some(JobPosting {
            title: item.title.unwrap_or_default(),
            link,
            source: self.label.clone(),
            provider: self.name.clone(),
            metadata,
        })
    }
}

/// Builds the Google query string plus any extra request params (`tbs`).
pub fn build_query(
    board: JobBoard,
    role: &str,
    location: &str,
    filters: &SearchFilters,
) -> (String, Vec<(&'static str, String)>) {
    let mut parts = vec![format!("{role} in {location}"), board.site_filter().to_string()];
    let mut params = Vec::new();

    if let Some(job_type) = filters.job_type.as_deref().filter(|s| !s.is_empty()) {
        parts.push(job_type.to_string());
    }
    if let Some(keywords) = filters.keywords.as_deref().filter(|s| !s.is_empty()) {
        parts.push(keywords.to_string());
    }
    if let Some(date) = filters.date_posted {
        params.push(("tbs", date.tbs().to_string()));
    }

    (parts.join(" "), params)
}

#[async_trait]
impl JobProvider for SerpApiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> &str {
        &self.label
    }

    async fn search(
        &self,
        role: &str,
        location: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<JobPosting>, ProviderError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::MissingApiKey(self.name.clone()))?;

        let (query, extra) = build_query(self.board, role, location, filters);
        let mut params: Vec<(&str, String)> = vec![
            ("engine", "google".to_string()),
            ("q", query),
            ("api_key", api_key),
        ];
        params.extend(extra);
        if limit > 0 {
            params.push(("num", limit.to_string()));
        }

        let span = tracing::info_span!(
            "serpapi.request",
            provider = %self.name,
            role = %role,
            location = %location
        );
        let payload = log_latency("serpapi.request", self.fetch(&params))
            .instrument(span)
            .await?;

        let mut results: Vec<JobPosting> = payload
            .organic_results
            .into_iter()
            .filter_map(|item| self.to_posting(item))
            .collect();
        if limit > 0 {
            results.truncate(limit);
        }
        Ok(results)
    }
}
