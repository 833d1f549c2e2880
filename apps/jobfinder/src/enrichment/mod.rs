//! Job posting enrichment: asks the LLM for fit score, summary, and outreach angle.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{AiConfig, PromptTemplates};
use crate::llm_client::{LlmClient, LlmError};
use crate::models::JobPosting;
use crate::notifications::{AlertSink, HighScoreAlert, LogAlertSink};
use crate::sheets::cell_text;

pub mod prompts;

/// Column keys every enrichment produces, in sheet order.
pub const ENRICHMENT_KEYS: [&str; 3] = ["ai_fit_score", "ai_summary", "ai_outreach_angle"];

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("AI user prompt template is not configured.")]
    MissingTemplate,

    #[error("AI_API_KEY is required for enrichment.")]
    MissingApiKey,

    #[error("AI client setup failed: {0}")]
    Setup(LlmError),

    /// Last error seen after exhausting retries.
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptPayload {
    pub system: String,
    pub user: String,
}

/// Normalised enrichment result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Enrichment {
    pub fit_score: Option<Value>,
    pub summary: Option<Value>,
    pub outreach_angle: Option<Value>,
    /// `ai_extra_*` columns from the model's `additional_context` object.
    pub extras: BTreeMap<String, Value>,
}

impl Enrichment {
    /// Normalises the model's JSON, accepting the common alternate key spellings.
    pub fn from_response(data: &Map<String, Value>) -> Self {
        let pick = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| data.get(*k))
                .find(|v| is_present(v))
                .cloned()
        };

        let mut extras = BTreeMap::new();
        if let Some(Value::Object(additional)) = data.get("additional_context") {
            for (key, value) in additional {
                let key = key.trim().to_lowercase().replace(' ', "_");
                if key.is_empty() {
                    continue;
                }
                extras.insert(format!("ai_extra_{key}"), value.clone());
            }
        }

        Enrichment {
            fit_score: pick(&["fit_score", "score", "fitScore"]),
            summary: pick(&["summary", "highlights"]),
            outreach_angle: pick(&["outreach_angle", "outreach"]),
            extras,
        }
    }

    /// Numeric fit score, if the model returned a number or a numeric string.
    pub fn score(&self) -> Option<f64> {
        match self.fit_score.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Sheet columns: the three fixed `ai_*` keys (empty when absent) plus extras.
    pub fn columns(&self) -> BTreeMap<String, String> {
        let mut columns = BTreeMap::new();
        for (key, value) in ENRICHMENT_KEYS.iter().zip([
            &self.fit_score,
            &self.summary,
            &self.outreach_angle,
        ]) {
            columns.insert(
                key.to_string(),
                value.as_ref().map(cell_text).unwrap_or_default(),
            );
        }
        for (key, value) in &self.extras {
            columns.insert(key.clone(), cell_text(value));
        }
        columns
    }

    fn summary_text(&self) -> Option<String> {
        self.summary.as_ref().map(cell_text)
    }
}

/// Null and blank strings are absent. `0` and `false` are real answers, so a
/// zero `fit_score` is kept rather than falling through to `score`.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

struct AlertPolicy {
    threshold: f64,
    sink: Arc<dyn AlertSink>,
}

pub struct Enricher {
    llm: LlmClient,
    prompts: PromptTemplates,
    alerts: Option<AlertPolicy>,
}

impl Enricher {
    pub fn new(llm: LlmClient, prompts: PromptTemplates) -> Self {
        Self {
            llm,
            prompts,
            alerts: None,
        }
    }

    /// Builds the enricher described by `config`, or `None` when enrichment is disabled.
    /// Alerts go to the log unless replaced via [`Enricher::with_alerts`].
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>, EnrichmentError> {
        if !config.enabled {
            return Ok(None);
        }
        let api_key = config.api_key.clone().ok_or(EnrichmentError::MissingApiKey)?;
        if config.prompts.user.trim().is_empty() {
            return Err(EnrichmentError::MissingTemplate);
        }
        let llm = LlmClient::new(config, api_key).map_err(EnrichmentError::Setup)?;

        let mut enricher = Self::new(llm, config.prompts.clone());
        if config.alerts_enabled {
            enricher = enricher.with_alerts(config.alert_threshold, Arc::new(LogAlertSink));
        }
        Ok(Some(enricher))
    }

    pub fn with_alerts(mut self, threshold: f64, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(AlertPolicy { threshold, sink });
        self
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Fills the user template from the posting. Description falls back to the search snippet.
    pub fn build_prompt(&self, posting: &JobPosting) -> Result<PromptPayload, EnrichmentError> {
        let user_template = self.prompts.user.trim();
        if user_template.is_empty() {
            return Err(EnrichmentError::MissingTemplate);
        }

        let description = match posting.field("description") {
            d if d.is_empty() => posting.field("snippet"),
            d => d,
        };

        let user = user_template
            .replace("{candidate_profile}", self.prompts.candidate_profile.trim())
            .replace("{job_title}", &posting.field("title"))
            .replace("{company}", &posting.field("company"))
            .replace("{location}", &posting.field("location"))
            .replace("{description}", &description)
            .replace("{link}", &posting.field("link"));

        Ok(PromptPayload {
            system: self.prompts.system.trim().to_string(),
            user,
        })
    }

    pub async fn enrich_job(&self, posting: &JobPosting) -> Result<Enrichment, EnrichmentError> {
        let prompt = self.build_prompt(posting)?;

        let data: Map<String, Value> = self
            .llm
            .call_json(&prompt.system, &prompt.user)
            .await
            .map_err(|e| EnrichmentError::Failed(e.to_string()))?;
        let enrichment = Enrichment::from_response(&data);

        if let (Some(policy), Some(score)) = (&self.alerts, enrichment.score()) {
            if score >= policy.threshold {
                policy.sink.send_high_score_alert(&HighScoreAlert {
                    score,
                    job_title: non_empty(&posting.title),
                    job_link: non_empty(&posting.link),
                    job_source: non_empty(&posting.source).or_else(|| non_empty(&posting.provider)),
                    ai_summary: enrichment.summary_text(),
                });
            }
        }

        Ok(enrichment)
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiProvider;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<HighScoreAlert>>,
    }

    impl AlertSink for RecordingSink {
        fn send_high_score_alert(&self, alert: &HighScoreAlert) {
            self.alerts.lock().unwrap().push(alert.clone());
        }
    }

    fn make_config(server: &MockServer) -> AiConfig {
        AiConfig {
            enabled: true,
            provider: AiProvider::OpenAi,
            model: "gpt-test".to_string(),
            api_key: Some("api-key".to_string()),
            org: None,
            base_url: "https://api.example".to_string(),
            completions_url: Some(format!("{}/v1/chat/completions", server.uri())),
            temperature: 0.0,
            timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_backoff: Duration::ZERO,
            response_format_json: true,
            alerts_enabled: false,
            alert_threshold: 0.0,
            prompts: PromptTemplates {
                system: "system".to_string(),
                user: "Job Title: {job_title}\nDescription: {description}".to_string(),
                candidate_profile: "Candidate".to_string(),
            },
        }
    }

    fn make_posting() -> JobPosting {
        JobPosting {
            title: "Engineer".to_string(),
            link: "https://jobs/1".to_string(),
            source: "LinkedIn (SerpAPI)".to_string(),
            ..Default::default()
        }
    }

    fn completion(content: Value) -> Value {
        json!({"choices": [{"message": {"content": content.to_string()}}]})
    }

    #[test]
    fn test_from_response_accepts_alternate_keys() {
        let data = json!({
            "score": 64,
            "highlights": "Solid overlap",
            "outreach": "Mention the migration project",
            "additional_context": {"Team Size": 12, " ": "dropped", "Remote": true}
        });
        let enrichment = Enrichment::from_response(data.as_object().unwrap());

        assert_eq!(enrichment.fit_score, Some(json!(64)));
        assert_eq!(enrichment.summary, Some(json!("Solid overlap")));
        assert_eq!(enrichment.outreach_angle, Some(json!("Mention the migration project")));
        assert_eq!(enrichment.extras.len(), 2);
        assert_eq!(enrichment.extras["ai_extra_team_size"], json!(12));
        assert_eq!(enrichment.extras["ai_extra_remote"], json!(true));
    }

    #[test]
    fn test_zero_score_is_kept() {
        let data = json!({"fit_score": 0, "score": 50});
        let enrichment = Enrichment::from_response(data.as_object().unwrap());
        assert_eq!(enrichment.score(), Some(0.0));
    }

    #[test]
    fn test_columns_fill_missing_with_empty_strings() {
        let data = json!({"fitScore": "77", "additional_context": {"visa": "sponsored"}});
        let columns = Enrichment::from_response(data.as_object().unwrap()).columns();

        assert_eq!(columns["ai_fit_score"], "77");
        assert_eq!(columns["ai_summary"], "");
        assert_eq!(columns["ai_outreach_angle"], "");
        assert_eq!(columns["ai_extra_visa"], "sponsored");
    }

    #[test]
    fn test_score_parses_numeric_strings() {
        let enrichment = Enrichment {
            fit_score: Some(json!(" 88.5 ")),
            ..Default::default()
        };
        assert_eq!(enrichment.score(), Some(88.5));

        let not_numeric = Enrichment {
            fit_score: Some(json!("high")),
            ..Default::default()
        };
        assert_eq!(not_numeric.score(), None);
    }

    #[tokio::test]
    async fn test_build_prompt_uses_snippet_when_description_missing() {
        let server = MockServer::start().await;
        let enricher = Enricher::from_config(&make_config(&server)).unwrap().unwrap();

        let mut posting = make_posting();
        posting
            .metadata
            .insert("snippet".to_string(), "Build pipelines".to_string());
        let prompt = enricher.build_prompt(&posting).unwrap();

        assert_eq!(prompt.system, "system");
        assert_eq!(prompt.user, "Job Title: Engineer\nDescription: Build pipelines");
    }

    #[tokio::test]
    async fn test_from_config_disabled_returns_none() {
        let server = MockServer::start().await;
        let mut config = make_config(&server);
        config.enabled = false;
        assert!(Enricher::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_from_config_requires_user_template() {
        let server = MockServer::start().await;
        let mut config = make_config(&server);
        config.prompts.user = "   ".to_string();
        assert!(matches!(
            Enricher::from_config(&config),
            Err(EnrichmentError::MissingTemplate)
        ));
    }

    #[tokio::test]
    async fn test_enrich_job_success_sends_notification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
                "fit_score": 82,
                "summary": "Strong match",
                "outreach_angle": "Reach out via LinkedIn"
            }))))
            .expect(1)
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let enricher = Enricher::from_config(&make_config(&server))
            .unwrap()
            .unwrap()
            .with_alerts(70.0, sink.clone());

        let posting = make_posting();
        let result = enricher.enrich_job(&posting).await.unwrap();

        assert_eq!(result.fit_score, Some(json!(82)));
        assert_eq!(result.summary, Some(json!("Strong match")));

        let alerts = sink.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].score, 82.0);
        assert_eq!(alerts[0].job_link.as_deref(), Some("https://jobs/1"));
        assert_eq!(alerts[0].job_source.as_deref(), Some("LinkedIn (SerpAPI)"));
        assert_eq!(alerts[0].ai_summary.as_deref(), Some("Strong match"));
    }

    #[tokio::test]
    async fn test_score_below_threshold_does_not_alert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion(json!({"fit_score": 40}))),
            )
            .mount(&server)
            .await;

        let sink = Arc::new(RecordingSink::default());
        let enricher = Enricher::from_config(&make_config(&server))
            .unwrap()
            .unwrap()
            .with_alerts(70.0, sink.clone());

        enricher.enrich_job(&make_posting()).await.unwrap();
        assert!(sink.alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enrich_job_retries_and_raises() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(2)
            .mount(&server)
            .await;

        let enricher = Enricher::from_config(&make_config(&server)).unwrap().unwrap();
        let err = enricher.enrich_job(&make_posting()).await.unwrap_err();

        assert!(matches!(err, EnrichmentError::Failed(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_fenced_reply_is_parsed() {
        let server = MockServer::start().await;
        let fenced = "```json\n{\"fit_score\": 55, \"summary\": \"ok\"}\n```";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"choices": [{"message": {"content": fenced}}]}),
            ))
            .mount(&server)
            .await;

        let enricher = Enricher::from_config(&make_config(&server)).unwrap().unwrap();
        let result = enricher.enrich_job(&make_posting()).await.unwrap();
        assert_eq!(result.score(), Some(55.0));
    }
}
