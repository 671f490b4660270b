use thiserror::Error;

/// Account-layer errors. Kept separate from HealthlinkError so callers can
/// tell a missing row from a cross-tenant access.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("Patient {patient_id} does not belong to tenant {tenant_id}")]
    Unauthorized {
        tenant_id: String,
        patient_id: String,
    },

    #[error("Invalid WhatsApp number: {0}")]
    InvalidNumber(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, AccountError>;
