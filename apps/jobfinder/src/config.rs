use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::enrichment::prompts::{
    DEFAULT_CANDIDATE_PROFILE, DEFAULT_SYSTEM_PROMPT, DEFAULT_USER_PROMPT,
};
use crate::logging::LogFormat;
use crate::models::{DatePosted, SearchFilters};
use crate::providers::serpapi::JobBoard;

/// Application configuration loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub sheets: SheetsConfig,
    pub roles_path: PathBuf,
    pub locations: Vec<String>,
    pub max_results_per_role: usize,
    pub providers: Vec<ProviderSettings>,
    pub filters: SearchFilters,
    pub ai: AiConfig,
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub sheet_name: String,
    /// Skips the Drive title lookup when set.
    pub sheet_id: Option<String>,
    pub tab: String,
    pub service_account_json: PathBuf,
    /// Pre-minted OAuth token; bypasses the service-account key when set.
    pub access_token: Option<String>,
}

/// Per-provider settings. One entry per known job board, enabled or not.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub name: String,
    pub board: JobBoard,
    pub enabled: bool,
    pub api_key: Option<String>,
    pub result_limit: usize,
    pub label: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiProvider {
    OpenAi,
    Azure,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub enabled: bool,
    pub provider: AiProvider,
    pub model: String,
    pub api_key: Option<String>,
    pub org: Option<String>,
    pub base_url: String,
    pub completions_url: Option<String>,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub response_format_json: bool,
    pub alerts_enabled: bool,
    pub alert_threshold: f64,
    pub prompts: PromptTemplates,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplates {
    pub system: String,
    pub user: String,
    pub candidate_profile: String,
}

impl AiConfig {
    /// Full chat-completions endpoint: explicit override, else `{base}/chat/completions`.
    pub fn completions_url(&self) -> String {
        if let Some(url) = &self.completions_url {
            return url.clone();
        }
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let serpapi_key = env.non_empty("SERPAPI_KEY");
        let default_provider_limit = env.parse_or("DEFAULT_PROVIDER_LIMIT", 10usize)?;
        let provider_request_timeout = env.seconds_or("PROVIDER_REQUEST_TIMEOUT", 10.0)?;

        let mut providers = Vec::new();
        for board in [JobBoard::LinkedIn, JobBoard::Indeed] {
            let prefix = format!("PROVIDER_{}", board.name().to_uppercase());
            providers.push(ProviderSettings {
                name: board.name().to_string(),
                board,
                enabled: env.bool_or(&format!("{prefix}_ENABLED"), true),
                api_key: env
                    .non_empty(&format!("{prefix}_API_KEY"))
                    .or_else(|| serpapi_key.clone()),
                result_limit: env.parse_or(&format!("{prefix}_LIMIT"), default_provider_limit)?,
                label: env
                    .non_empty(&format!("{prefix}_LABEL"))
                    .unwrap_or_else(|| board.default_label().to_string()),
                timeout: match env.non_empty(&format!("{prefix}_TIMEOUT")) {
                    Some(_) => env.seconds_or(&format!("{prefix}_TIMEOUT"), 0.0)?,
                    None => provider_request_timeout,
                },
            });
        }

        let locations = env
            .non_empty("LOCATIONS")
            .or_else(|| env.non_empty("LOCATION"))
            .unwrap_or_else(|| "Canada".to_string())
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        if locations.is_empty() {
            bail!("LOCATIONS must name at least one location");
        }

        let filters = SearchFilters {
            job_type: env.non_empty("SEARCH_JOB_TYPE"),
            keywords: env.non_empty("SEARCH_KEYWORDS"),
            date_posted: env
                .non_empty("SEARCH_DATE_POSTED")
                .and_then(|v| DatePosted::parse(&v)),
        };

        let ai = AiConfig {
            enabled: env.bool_or("AI_ENRICHMENT_ENABLED", false),
            provider: match env.non_empty("AI_PROVIDER").map(|p| p.to_lowercase()).as_deref() {
                Some("azure") => AiProvider::Azure,
                _ => AiProvider::OpenAi,
            },
            model: env.string_or("AI_MODEL", "gpt-4o-mini"),
            api_key: env.non_empty("AI_API_KEY"),
            org: env.non_empty("AI_ORG"),
            base_url: env.string_or("AI_BASE_URL", "https://api.openai.com/v1"),
            completions_url: env.non_empty("AI_COMPLETIONS_URL"),
            temperature: env.parse_or("AI_TEMPERATURE", 0.2f32)?,
            timeout: env.seconds_or("AI_TIMEOUT", 30.0)?,
            max_retries: env.parse_or("AI_MAX_RETRIES", 3u32)?.max(1),
            retry_backoff: env.seconds_or("AI_RETRY_BACKOFF_SECONDS", 2.0)?,
            response_format_json: env.bool_or("AI_RESPONSE_FORMAT_JSON", true),
            alerts_enabled: env.bool_or("AI_ENRICHMENT_ALERTS_ENABLED", false),
            alert_threshold: env.parse_or("AI_ENRICHMENT_ALERT_THRESHOLD", 0.0f64)?,
            prompts: PromptTemplates {
                system: load_prompt_template(lookup("AI_SYSTEM_PROMPT"), DEFAULT_SYSTEM_PROMPT),
                user: load_prompt_template(lookup("AI_USER_PROMPT"), DEFAULT_USER_PROMPT),
                candidate_profile: env.string_or("AI_CANDIDATE_PROFILE", DEFAULT_CANDIDATE_PROFILE),
            },
        };

        if ai.enabled {
            if ai.api_key.is_none() {
                bail!("AI_API_KEY is required when AI_ENRICHMENT_ENABLED is set");
            }
            if ai.prompts.user.trim().is_empty() {
                bail!("AI user prompt template is not configured");
            }
        }

        Ok(Config {
            sheets: SheetsConfig {
                sheet_name: env.string_or("GOOGLE_SHEET_NAME", "Job_Finder"),
                sheet_id: env.non_empty("GOOGLE_SHEET_ID"),
                tab: env.string_or("GOOGLE_SHEET_TAB", "jobs"),
                service_account_json: PathBuf::from(
                    env.string_or("GOOGLE_SERVICE_ACCOUNT_JSON", "service_account.json"),
                ),
                access_token: env.non_empty("GOOGLE_ACCESS_TOKEN"),
            },
            roles_path: PathBuf::from(
                env.non_empty("ROLES_FILE")
                    .or_else(|| env.non_empty("ROLES_EXCEL"))
                    .unwrap_or_else(|| "data/Canada_IT_Roles_List.xlsx".to_string()),
            ),
            locations,
            max_results_per_role: env.parse_or("MAX_RESULTS_PER_ROLE", 8usize)?,
            providers,
            filters,
            ai,
            log_level: env.string_or("LOG_LEVEL", "info").to_lowercase(),
            log_format: env
                .non_empty("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or_default(),
        })
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

/// `1`, `true`, `yes`, `on` (any case, surrounding whitespace ignored) are true.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Resolves a prompt template from a raw env value.
///
/// Unset or empty values use `default`. Values that look like JSON objects are
/// read for their `template` field; if the JSON is malformed the raw text is kept.
pub fn load_prompt_template(raw: Option<String>, default: &str) -> String {
    let raw = match raw {
        Some(r) if !r.is_empty() => r,
        _ => return default.to_string(),
    };
    let raw = raw.trim();
    if raw.starts_with('{') {
        return match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(data) => match data.get("template") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => default.to_string(),
            },
            Err(_) => raw.to_string(),
        };
    }
    raw.to_string()
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn non_empty(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_string())
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        (self.0)(key).map(|v| parse_bool(&v)).unwrap_or(default)
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.non_empty(key) {
            Some(raw) => raw
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value '{raw}'")),
            None => Ok(default),
        }
    }

    fn seconds_or(&self, key: &str, default: f64) -> Result<Duration> {
        let secs = self.parse_or(key, default)?;
        Duration::try_from_secs_f64(secs)
            .with_context(|| format!("{key} must be a non-negative number of seconds"))
    }
}
