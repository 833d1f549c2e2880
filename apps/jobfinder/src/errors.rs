use std::process::ExitCode;

use thiserror::Error;

use crate::enrichment::EnrichmentError;
use crate::providers::ProviderError;
use crate::roles::RolesError;
use crate::sheets::SheetsError;

/// Application-level error type.
/// Every subsystem error funnels into this so `main` can report it and pick an exit code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Enrichment error: {0}")]
    Enrichment(#[from] EnrichmentError),

    #[error("Sheets error: {0}")]
    Sheets(#[from] SheetsError),

    #[error("Roles error: {0}")]
    Roles(#[from] RolesError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Maps the error onto a process exit code (sysexits-style where one fits).
    pub fn exit_code(&self) -> ExitCode {
        let code: u8 = match self {
            AppError::Config(_) => 78,
            AppError::Validation(_) => 65,
            AppError::Roles(_) => 66,
            AppError::Provider(_) | AppError::Enrichment(_) | AppError::Sheets(_) => 69,
            AppError::Internal(_) => 70,
        };
        ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_uses_config_exit_code() {
        let err = AppError::Config("missing AI_API_KEY".to_string());
        assert_eq!(err.exit_code(), ExitCode::from(78));
        assert!(err.to_string().contains("AI_API_KEY"));
    }

    #[test]
    fn test_roles_error_converts_via_from() {
        let err: AppError = RolesError::MissingRoleColumn("roles.xlsx".to_string()).into();
        assert!(matches!(err, AppError::Roles(_)));
        assert_eq!(err.exit_code(), ExitCode::from(66));
    }

    #[test]
    fn test_internal_error_wraps_anyhow() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "Internal error: boom");
    }
}
