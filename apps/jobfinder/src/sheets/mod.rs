//! Worksheet abstraction plus its Google Sheets and in-memory backends.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod google;
pub mod repository;

pub use google::GoogleWorksheet;
pub use repository::{JobRecord, SheetsRepository};

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sheets API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Spreadsheet '{0}' not found or not shared with the service account")]
    SpreadsheetNotFound(String),

    #[error("Failed to load service account key '{path}': {message}")]
    Credentials { path: String, message: String },

    #[error("Token signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid cell reference '{0}'")]
    InvalidCell(String),

    #[error("A job link is required to upsert a record.")]
    MissingLink,
}

/// One tab of a spreadsheet, addressed in A1 notation.
#[async_trait]
pub trait Worksheet: Send + Sync {
    /// Every row, header included. Trailing empty cells may be omitted.
    async fn get_all_values(&self) -> Result<Vec<Vec<String>>, SheetsError>;

    /// Appends `row` after the last row with data.
    async fn append_row(&self, row: &[String]) -> Result<(), SheetsError>;

    /// Overwrites cells starting at `start_cell` (e.g. `A5`), one inner vec per row.
    async fn update(&self, start_cell: &str, rows: &[Vec<String>]) -> Result<(), SheetsError>;
}

/// In-process worksheet used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryWorksheet {
    rows: Mutex<Vec<Vec<String>>>,
}

impl MemoryWorksheet {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub fn snapshot(&self) -> Vec<Vec<String>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<String>>> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Worksheet for MemoryWorksheet {
    async fn get_all_values(&self) -> Result<Vec<Vec<String>>, SheetsError> {
        Ok(self.snapshot())
    }

    async fn append_row(&self, row: &[String]) -> Result<(), SheetsError> {
        self.lock().push(row.to_vec());
        Ok(())
    }

    async fn update(&self, start_cell: &str, rows: &[Vec<String>]) -> Result<(), SheetsError> {
        let (col, row_number) = parse_a1(start_cell)?;
        let mut table = self.lock();
        for (offset, values) in rows.iter().enumerate() {
            let index = row_number - 1 + offset;
            if table.len() <= index {
                table.resize(index + 1, Vec::new());
            }
            let target = &mut table[index];
            if target.len() < col + values.len() {
                target.resize(col + values.len(), String::new());
            }
            target[col..col + values.len()].clone_from_slice(values);
        }
        Ok(())
    }
}

/// Parses an A1 cell reference into a zero-based column and a one-based row.
pub fn parse_a1(cell: &str) -> Result<(usize, usize), SheetsError> {
    let invalid = || SheetsError::InvalidCell(cell.to_string());
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (letters, digits) = cell.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }

    let col = letters
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1))
        - 1;
    let row: usize = digits.parse().map_err(|_| invalid())?;
    if row == 0 {
        return Err(invalid());
    }
    Ok((col, row))
}

/// Renders a JSON value as a single sheet cell.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
