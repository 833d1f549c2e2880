//! Loads the list of roles to search for.

use std::path::Path;

use calamine::{open_workbook_auto, Reader};
use thiserror::Error;
use tracing::debug;

const ROLE_COLUMN: &str = "role";

#[derive(Debug, Error)]
pub enum RolesError {
    #[error("Failed to read roles file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read spreadsheet '{path}': {message}")]
    Spreadsheet { path: String, message: String },

    #[error("Failed to parse CSV '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("No 'Role' column found in '{0}'")]
    MissingRoleColumn(String),
}

/// Reads roles from a spreadsheet (first sheet) or a text file.
///
/// Spreadsheets need a `Role` header. Text files use a `Role` column when the
/// first line has one, otherwise every non-blank line is a role.
pub fn load_roles(path: &Path) -> Result<Vec<String>, RolesError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let roles = match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "ods" => load_from_workbook(path)?,
        _ => load_from_text(path)?,
    };
    debug!(path = %path.display(), count = roles.len(), "Loaded roles");
    Ok(roles)
}

fn load_from_workbook(path: &Path) -> Result<Vec<String>, RolesError> {
    let spreadsheet_error = |message: String| RolesError::Spreadsheet {
        path: path.display().to_string(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| spreadsheet_error(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| spreadsheet_error("workbook has no sheets".to_string()))?
        .map_err(|e| spreadsheet_error(e.to_string()))?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();

    roles_from_rows(&rows).ok_or_else(|| RolesError::MissingRoleColumn(path.display().to_string()))
}

fn load_from_text(path: &Path) -> Result<Vec<String>, RolesError> {
    let content = std::fs::read_to_string(path).map_err(|source| RolesError::Io {
        path: path.display().to_string(),
        source,
    })?;
    // Excel's "CSV UTF-8" export starts with a byte-order mark.
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let rows = parse_csv(content).map_err(|source| RolesError::Csv {
        path: path.display().to_string(),
        source,
    })?;
    if let Some(roles) = roles_from_rows(&rows) {
        return Ok(roles);
    }

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Returns `None` when the first row has no `Role` header.
fn roles_from_rows(rows: &[Vec<String>]) -> Option<Vec<String>> {
    let header = rows.first()?;
    let column = header
        .iter()
        .position(|cell| cell.trim().eq_ignore_ascii_case(ROLE_COLUMN))?;

    Some(
        rows.iter()
            .skip(1)
            .filter_map(|row| row.get(column))
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Every record, header included. Rows may differ in width.
fn parse_csv(content: &str) -> Result<Vec<Vec<String>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    reader
        .records()
        .map(|record| Ok(record?.iter().map(str::to_string).collect()))
        .collect()
}
