//! One batch run: roles in, sheet rows out.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::JobPosting;
use crate::roles::load_roles;
use crate::search::search_jobs_for_role;
use crate::sheets::{JobRecord, SheetsRepository, Worksheet};
use crate::state::AppState;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Rewrite rows whose link is already in the sheet.
    pub refresh: bool,
    /// Overrides `ROLES_FILE`.
    pub roles_path: Option<PathBuf>,
    /// Overrides `LOCATIONS` when non-empty.
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub roles: usize,
    pub added: usize,
    pub updated: usize,
    pub enrichment_failures: usize,
}

pub async fn run(
    state: &AppState,
    sheet: Arc<dyn Worksheet>,
    options: &RunOptions,
) -> Result<RunSummary, AppError> {
    let run_id = Uuid::new_v4();
    run_inner(state, sheet, options)
        .instrument(info_span!("run", %run_id))
        .await
}

async fn run_inner(
    state: &AppState,
    sheet: Arc<dyn Worksheet>,
    options: &RunOptions,
) -> Result<RunSummary, AppError> {
    let config = &state.config;
    let mut repo = SheetsRepository::open(sheet).await?;

    let roles_path = options
        .roles_path
        .clone()
        .unwrap_or_else(|| config.roles_path.clone());
    let roles = load_roles(&roles_path)?;
    if roles.is_empty() {
        warn!(path = %roles_path.display(), "No roles to process");
    }

    let locations = if options.locations.is_empty() {
        &config.locations
    } else {
        &options.locations
    };

    let mut summary = RunSummary::default();
    for role in &roles {
        let postings =
            search_jobs_for_role(&state.providers, role, locations, &config.filters).await;

        let (mut added, mut updated) = (0usize, 0usize);
        for posting in postings {
            if added + updated >= config.max_results_per_role {
                break;
            }
            if repo.has_link(&posting.link) && !options.refresh {
                continue;
            }

            let enrichment = match enrich(state, &posting).await {
                Ok(columns) => columns,
                Err(e) => {
                    warn!(link = %posting.link, error = %e, "Enrichment failed, writing row without it");
                    summary.enrichment_failures += 1;
                    BTreeMap::new()
                }
            };

            let record = JobRecord {
                fetched_at: timestamp(),
                role: role.clone(),
                title: posting.title,
                source: posting.source,
                link: posting.link,
                metadata: posting.metadata,
                enrichment,
            };
            if repo.upsert_job(&record).await? {
                added += 1;
            } else {
                updated += 1;
            }
        }

        info!(role = role.as_str(), added, updated, "Processed role");
        summary.added += added;
        summary.updated += updated;
    }
    summary.roles = roles.len();

    info!(
        roles = summary.roles,
        added = summary.added,
        updated = summary.updated,
        enrichment_failures = summary.enrichment_failures,
        sheet_rows = repo.row_count(),
        "Run complete"
    );
    Ok(summary)
}

async fn enrich(
    state: &AppState,
    posting: &JobPosting,
) -> Result<BTreeMap<String, String>, AppError> {
    match &state.enricher {
        Some(enricher) => Ok(enricher.enrich_job(posting).await?.columns()),
        None => Ok(BTreeMap::new()),
    }
}

/// UTC, second precision, e.g. `2024-05-01T12:00:00Z`.
pub fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
