//! Search dispatcher: fans a role out over every location and enabled provider.

use std::collections::HashSet;

use tracing::warn;

use crate::models::{JobPosting, SearchFilters};
use crate::providers::ProviderRegistry;

/// Queries all providers for `role` across `locations` and merges the results.
///
/// Provider failures are logged and skipped. Results are deduplicated by link,
/// keeping first-seen order.
pub async fn search_jobs_for_role(
    registry: &ProviderRegistry,
    role: &str,
    locations: &[String],
    filters: &SearchFilters,
) -> Vec<JobPosting> {
    let mut aggregated = Vec::new();
    let mut seen_links = HashSet::new();

    for location in locations {
        for entry in registry.iter() {
            let provider = entry.provider.as_ref();
            let results = match provider.search(role, location, entry.limit, filters).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        role,
                        location = location.as_str(),
                        error = %e,
                        "Provider failed"
                    );
                    continue;
                }
            };

            for mut posting in results {
                if posting.link.is_empty() || !seen_links.insert(posting.link.clone()) {
                    continue;
                }
                if posting.source.is_empty() {
                    posting.source = provider.label().to_string();
                }
                if posting.provider.is_empty() {
                    posting.provider = provider.name().to_string();
                }
                posting
                    .metadata
                    .entry("location".to_string())
                    .or_insert_with(|| location.clone());
                aggregated.push(posting);
            }
        }
    }

    aggregated
}
