//! Upserts job rows into a worksheet, keyed by the `Link` column.
//!
//! Metadata and enrichment fields become columns on first sight, so a later
//! run can refresh rows that an earlier run wrote.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::enrichment::ENRICHMENT_KEYS;
use crate::sheets::{SheetsError, Worksheet};

pub const BASE_HEADER: [&str; 5] = ["Fetched At (UTC)", "Role", "Job Title", "Source", "Link"];
const LINK_COLUMN: &str = "Link";

/// One row to persist.
#[derive(Debug, Clone, Default)]
pub struct JobRecord {
    pub fetched_at: String,
    pub role: String,
    pub title: String,
    pub source: String,
    pub link: String,
    pub metadata: BTreeMap<String, String>,
    pub enrichment: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct Column {
    label: String,
    key: String,
}

pub struct SheetsRepository {
    sheet: Arc<dyn Worksheet>,
    columns: Vec<Column>,
    key_index: HashMap<String, usize>,
    rows_by_link: HashMap<String, usize>,
    row_count: usize,
}

impl SheetsRepository {
    /// Reads the sheet once, reconciles the header, and indexes existing rows by link.
    pub async fn open(sheet: Arc<dyn Worksheet>) -> Result<Self, SheetsError> {
        let mut repo = Self {
            sheet,
            columns: Vec::new(),
            key_index: HashMap::new(),
            rows_by_link: HashMap::new(),
            row_count: 0,
        };
        repo.initialize().await?;
        repo.ensure_dynamic_keys(ENRICHMENT_KEYS.iter().map(|k| k.to_string()).collect())
            .await?;
        Ok(repo)
    }

    /// Inserts or updates the row for `record.link`.
    /// Returns `true` when a new row was appended, `false` when an existing one was rewritten.
    pub async fn upsert_job(&mut self, record: &JobRecord) -> Result<bool, SheetsError> {
        if record.link.is_empty() {
            return Err(SheetsError::MissingLink);
        }

        let dynamic = merge_dynamic_fields(&record.metadata, &record.enrichment);
        self.ensure_dynamic_keys(dynamic.keys().cloned().collect())
            .await?;
        let row = self.compose_row(record, &dynamic);

        if let Some(row_index) = self.rows_by_link.get(&record.link).copied() {
            self.sheet.update(&format!("A{row_index}"), &[row]).await?;
            return Ok(false);
        }

        self.sheet.append_row(&row).await?;
        self.row_count += 1;
        self.rows_by_link
            .insert(record.link.clone(), self.row_count);
        Ok(true)
    }

    pub fn has_link(&self, link: &str) -> bool {
        self.rows_by_link.contains_key(link)
    }

    /// Current header labels, in sheet order.
    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.label.as_str()).collect()
    }

    /// Rows in the sheet, header included.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    async fn initialize(&mut self) -> Result<(), SheetsError> {
        let existing = self.sheet.get_all_values().await?;
        let Some(header_row) = existing.first() else {
            for label in BASE_HEADER {
                self.push_column(label.to_string(), header_to_key(label));
            }
            self.write_header().await?;
            self.row_count = 1;
            return Ok(());
        };

        for label in BASE_HEADER {
            self.push_column(label.to_string(), header_to_key(label));
        }
        for label in header_row {
            if !self.columns.iter().any(|c| &c.label == label) {
                self.push_column(label.clone(), header_to_key(label));
            }
        }
        if self.header() != header_row.iter().map(String::as_str).collect::<Vec<_>>() {
            self.write_header().await?;
        }

        self.row_count = existing.len();
        if let Some(link_index) = header_row.iter().position(|c| c == LINK_COLUMN) {
            for (offset, row) in existing.iter().enumerate().skip(1) {
                let link = row.get(link_index).map(String::as_str).unwrap_or("");
                if link.is_empty() {
                    continue;
                }
                self.rows_by_link.insert(link.to_string(), offset + 1);
            }
        }
        debug!(
            rows = self.row_count,
            indexed = self.rows_by_link.len(),
            "Loaded existing sheet"
        );
        Ok(())
    }

    fn push_column(&mut self, label: String, key: String) {
        self.key_index.entry(key.clone()).or_insert(self.columns.len());
        self.columns.push(Column { label, key });
    }

    async fn write_header(&self) -> Result<(), SheetsError> {
        let header: Vec<String> = self.columns.iter().map(|c| c.label.clone()).collect();
        self.sheet.update("A1", &[header]).await
    }

    async fn ensure_dynamic_keys(&mut self, keys: Vec<String>) -> Result<(), SheetsError> {
        let mut added = false;
        for key in keys {
            if key.is_empty() || self.key_index.contains_key(&key) {
                continue;
            }
            let base_label = key_to_header(&key);
            let mut label = base_label.clone();
            let mut suffix = 2;
            while self.columns.iter().any(|c| c.label == label) {
                label = format!("{base_label} {suffix}");
                suffix += 1;
            }
            self.push_column(label, key);
            added = true;
        }
        if added {
            self.write_header().await?;
        }
        Ok(())
    }

    fn compose_row(&self, record: &JobRecord, dynamic: &BTreeMap<String, String>) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| match column.label.as_str() {
                "Fetched At (UTC)" => record.fetched_at.clone(),
                "Role" => record.role.clone(),
                "Job Title" => record.title.clone(),
                "Source" => record.source.clone(),
                LINK_COLUMN => record.link.clone(),
                _ => dynamic.get(&column.key).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

/// Metadata first, enrichment second (enrichment wins on key clashes).
fn merge_dynamic_fields(
    metadata: &BTreeMap<String, String>,
    enrichment: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut dynamic = BTreeMap::new();
    for (key, value) in metadata.iter().chain(enrichment.iter()) {
        let key = normalize_key(key);
        if key.is_empty() {
            continue;
        }
        dynamic.insert(key, value.clone());
    }
    dynamic
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace([' ', '-'], "_")
}

fn header_to_key(header: &str) -> String {
    header.to_lowercase().replace(' ', "_")
}

/// `ai_fit_score` -> `Ai Fit Score`.
fn key_to_header(key: &str) -> String {
    key.replace('-', "_")
        .split('_')
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
