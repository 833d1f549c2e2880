use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single job search result, normalised across providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub title: String,
    /// Canonical job URL. Primary key everywhere downstream.
    pub link: String,
    pub source: String,
    pub provider: String,
    /// Provider-specific extras (snippet, posted_at, location, ...).
    pub metadata: BTreeMap<String, String>,
}

impl JobPosting {
    /// Returns a trimmed value for `name`, preferring the top-level field and
    /// falling back to `metadata[name]`. Empty string when neither is set.
    pub fn field(&self, name: &str) -> String {
        let top_level = match name {
            "title" => Some(self.title.as_str()),
            "link" => Some(self.link.as_str()),
            "source" => Some(self.source.as_str()),
            "provider" => Some(self.provider.as_str()),
            _ => None,
        };

        top_level
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| self.metadata.get(name).map(|v| v.trim()))
            .unwrap_or("")
            .to_string()
    }
}

/// Recency filter understood by Google search (`tbs` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePosted {
    #[serde(rename = "past_24_hours")]
    PastDay,
    PastWeek,
    PastMonth,
}

impl DatePosted {
    /// Parses the config spelling; unknown values mean "no date filter".
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "past_24_hours" => Some(DatePosted::PastDay),
            "past_week" => Some(DatePosted::PastWeek),
            "past_month" => Some(DatePosted::PastMonth),
            _ => None,
        }
    }

    pub fn tbs(self) -> &'static str {
        match self {
            DatePosted::PastDay => "qdr:d",
            DatePosted::PastWeek => "qdr:w",
            DatePosted::PastMonth => "qdr:m",
        }
    }
}

/// Optional filters forwarded to every provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub job_type: Option<String>,
    pub keywords: Option<String>,
    pub date_posted: Option<DatePosted>,
}
