use healthlink_accounts::AccountError;
use healthlink_agent::GenerateError;
use healthlink_core::HealthlinkError;
use healthlink_whatsapp::GatewayError;
use thiserror::Error;

/// Errors that can occur within the check-in scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Cadence fields that no due time can be computed from.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Schedule not found: {id}")]
    ScheduleNotFound { id: String },

    #[error("Patient not found: {id}")]
    PatientNotFound { id: String },

    /// The caller's tenant does not own the schedule or patient.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Account error: {0}")]
    Account(AccountError),

    #[error(transparent)]
    Tenant(#[from] HealthlinkError),

    #[error("Generation failed: {0}")]
    Generate(#[from] GenerateError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] GatewayError),
}

impl From<AccountError> for SchedulerError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Unauthorized { .. } => SchedulerError::Unauthorized(e.to_string()),
            AccountError::PatientNotFound(id) => SchedulerError::PatientNotFound { id },
            other => SchedulerError::Account(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
