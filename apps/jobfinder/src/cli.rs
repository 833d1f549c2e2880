use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::AppError;
use crate::models::JobPosting;
use crate::pipeline::{self, RunOptions};
use crate::roles::load_roles;
use crate::search::search_jobs_for_role;
use crate::sheets::{GoogleWorksheet, MemoryWorksheet, Worksheet};
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "jobfinder")]
#[command(about = "Search job boards for a list of roles and track the results in a spreadsheet", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search every role and upsert the results into the worksheet
    Run {
        /// Write to an in-memory sheet and print it instead of touching Google Sheets
        #[arg(long)]
        dry_run: bool,
        /// Rewrite rows whose link is already in the sheet
        #[arg(long)]
        refresh: bool,
        /// Roles file (overrides ROLES_FILE)
        #[arg(long)]
        roles: Option<PathBuf>,
        /// Search location, repeatable (overrides LOCATIONS)
        #[arg(long = "location")]
        locations: Vec<String>,
    },
    /// Search a single role and print the postings
    Search {
        role: String,
        #[arg(long = "location")]
        locations: Vec<String>,
        /// Enrich each posting with the configured LLM
        #[arg(long)]
        enrich: bool,
    },
    /// Print the roles that a run would process
    Roles {
        #[arg(long)]
        roles: Option<PathBuf>,
    },
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<(), AppError> {
    match cli.command {
        Commands::Run {
            dry_run,
            refresh,
            roles,
            locations,
        } => {
            let options = RunOptions {
                refresh,
                roles_path: roles,
                locations,
            };
            run_pipeline(config, dry_run, options).await
        }
        Commands::Search {
            role,
            locations,
            enrich,
        } => search_role(config, &role, locations, enrich).await,
        Commands::Roles { roles } => {
            let path = roles.unwrap_or_else(|| config.roles_path.clone());
            for role in load_roles(&path)? {
                println!("{role}");
            }
            Ok(())
        }
    }
}

async fn run_pipeline(config: Config, dry_run: bool, options: RunOptions) -> Result<(), AppError> {
    let state = AppState::from_config(config)?;

    if dry_run {
        info!("Dry run: writing to an in-memory sheet");
        let memory = Arc::new(MemoryWorksheet::new());
        let summary = pipeline::run(&state, memory.clone(), &options).await?;
        return print_json(&json!({ "summary": summary, "rows": memory.snapshot() }));
    }

    let sheet: Arc<dyn Worksheet> = Arc::new(GoogleWorksheet::open(&state.config.sheets).await?);
    let summary = pipeline::run(&state, sheet, &options).await?;
    print_json(&summary)
}

#[derive(Serialize)]
struct SearchOutput {
    #[serde(flatten)]
    posting: JobPosting,
    #[serde(skip_serializing_if = "Option::is_none")]
    enrichment: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enrichment_error: Option<String>,
}

async fn search_role(
    config: Config,
    role: &str,
    locations: Vec<String>,
    enrich: bool,
) -> Result<(), AppError> {
    let state = AppState::from_config(config)?;
    let output = collect_search_output(&state, role, locations, enrich).await?;
    print_json(&output)
}

/// Searches one role and, when asked, enriches each posting.
/// A posting whose enrichment fails is still returned, with the error attached.
async fn collect_search_output(
    state: &AppState,
    role: &str,
    locations: Vec<String>,
    enrich: bool,
) -> Result<Vec<SearchOutput>, AppError> {
    let enricher = match (&state.enricher, enrich) {
        (Some(enricher), true) => Some(enricher.clone()),
        (None, true) => {
            return Err(AppError::Validation(
                "--enrich requires AI_ENRICHMENT_ENABLED=true".to_string(),
            ))
        }
        (_, false) => None,
    };
    let locations = if locations.is_empty() {
        state.config.locations.clone()
    } else {
        locations
    };

    let postings =
        search_jobs_for_role(&state.providers, role, &locations, &state.config.filters).await;

    let mut output = Vec::with_capacity(postings.len());
    for posting in postings {
        let (enrichment, enrichment_error) = match &enricher {
            Some(enricher) => match enricher.enrich_job(&posting).await {
                Ok(result) => (Some(json!(result.columns())), None),
                Err(e) => {
                    warn!(link = %posting.link, error = %e, "Enrichment failed");
                    (None, Some(e.to_string()))
                }
            },
            None => (None, None),
        };
        output.push(SearchOutput {
            posting,
            enrichment,
            enrichment_error,
        });
    }
    Ok(output)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "jobfinder",
            "run",
            "--dry-run",
            "--location",
            "Toronto",
            "--location",
            "Remote",
            "--roles",
            "roles.csv",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                dry_run,
                refresh,
                roles,
                locations,
            } => {
                assert!(dry_run);
                assert!(!refresh);
                assert_eq!(roles, Some(PathBuf::from("roles.csv")));
                assert_eq!(locations, vec!["Toronto", "Remote"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_search_requires_role() {
        assert!(Cli::try_parse_from(["jobfinder", "search"]).is_err());

        let cli = Cli::try_parse_from(["jobfinder", "search", "Data Engineer", "--enrich"]).unwrap();
        match cli.command {
            Commands::Search { role, enrich, .. } => {
                assert_eq!(role, "Data Engineer");
                assert!(enrich);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_search_output_flattens_posting() {
        let output = SearchOutput {
            posting: JobPosting {
                title: "SRE".to_string(),
                link: "https://jobs.example/1".to_string(),
                ..Default::default()
            },
            enrichment: None,
            enrichment_error: None,
        };
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["title"], "SRE");
        assert!(value.get("enrichment").is_none());
    }

    struct TwoPostings;

    #[async_trait::async_trait]
    impl crate::providers::JobProvider for TwoPostings {
        fn name(&self) -> &str {
            "two"
        }

        fn label(&self) -> &str {
            "Two Board"
        }

        async fn search(
            &self,
            _role: &str,
            _location: &str,
            _limit: usize,
            _filters: &crate::models::SearchFilters,
        ) -> Result<Vec<JobPosting>, crate::providers::ProviderError> {
            Ok(["a", "b"]
                .iter()
                .map(|id| JobPosting {
                    title: format!("Engineer {id}"),
                    link: format!("https://jobs.example/{id}"),
                    ..Default::default()
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_search_keeps_postings_when_one_enrichment_fails() {
        use crate::enrichment::Enricher;
        use crate::llm_client::LlmClient;
        use crate::providers::ProviderRegistry;
        use std::collections::HashMap;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"fit_score\": 70}"}}]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
            .mount(&server)
            .await;

        let vars: HashMap<&str, String> = HashMap::from([
            ("AI_ENRICHMENT_ENABLED", "true".to_string()),
            ("AI_API_KEY", "sk-test".to_string()),
            ("AI_COMPLETIONS_URL", format!("{}/v1/chat/completions", server.uri())),
            ("AI_MAX_RETRIES", "1".to_string()),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
        let llm = LlmClient::new(&config.ai, "sk-test".to_string()).unwrap();
        let enricher = Enricher::new(llm, config.ai.prompts.clone());
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(TwoPostings), 10);
        let state = AppState {
            config,
            providers: Arc::new(registry),
            enricher: Some(Arc::new(enricher)),
        };

        let output = collect_search_output(&state, "Engineer", Vec::new(), true)
            .await
            .unwrap();

        assert_eq!(output.len(), 2);
        assert_eq!(output[0].enrichment.as_ref().unwrap()["ai_fit_score"], "70");
        assert!(output[0].enrichment_error.is_none());
        assert!(output[1].enrichment.is_none());
        assert!(output[1].enrichment_error.as_deref().unwrap().contains("401"));
    }

    #[tokio::test]
    async fn test_search_enrich_without_enricher_is_validation_error() {
        let config = Config::from_lookup(|_| None).unwrap();
        let state = AppState {
            config,
            providers: Arc::new(crate::providers::ProviderRegistry::new()),
            enricher: None,
        };

        let err = collect_search_output(&state, "SRE", Vec::new(), true)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
