use serde::Serialize;
use tracing::info;

/// Payload for a job whose AI fit score crossed the alert threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighScoreAlert {
    pub score: f64,
    pub job_title: Option<String>,
    pub job_link: Option<String>,
    pub job_source: Option<String>,
    pub ai_summary: Option<String>,
}

/// Destination for high-score alerts.
pub trait AlertSink: Send + Sync {
    fn send_high_score_alert(&self, alert: &HighScoreAlert);
}

/// Emits alerts as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn send_high_score_alert(&self, alert: &HighScoreAlert) {
        info!(
            event = "notification.high_score",
            score = alert.score,
            job_title = alert.job_title.as_deref(),
            job_link = alert.job_link.as_deref(),
            job_source = alert.job_source.as_deref(),
            ai_summary = alert.ai_summary.as_deref(),
            "notification.high_score"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sink_accepts_sparse_alert() {
        let alert = HighScoreAlert {
            score: 91.0,
            job_title: None,
            job_link: Some("https://jobs.example/9".to_string()),
            job_source: None,
            ai_summary: None,
        };
        LogAlertSink.send_high_score_alert(&alert);
    }

    #[test]
    fn test_alert_serializes_with_field_names() {
        let alert = HighScoreAlert {
            score: 75.5,
            job_title: Some("Platform Engineer".to_string()),
            job_link: None,
            job_source: Some("LinkedIn (SerpAPI)".to_string()),
            ai_summary: Some("Good match".to_string()),
        };
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["score"], 75.5);
        assert_eq!(value["job_title"], "Platform Engineer");
        assert!(value["job_link"].is_null());
    }
}
