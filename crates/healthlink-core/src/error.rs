use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealthlinkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid tenant context: {0}")]
    InvalidContext(String),

    #[error("Tenant mismatch: {reason}")]
    TenantMismatch { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HealthlinkError {
    /// Short stable code, used as the failure reason prefix in execution records.
    pub fn code(&self) -> &'static str {
        match self {
            HealthlinkError::Config(_) => "CONFIG_ERROR",
            HealthlinkError::InvalidContext(_) => "INVALID_CONTEXT",
            HealthlinkError::TenantMismatch { .. } => "TENANT_MISMATCH",
            HealthlinkError::Serialization(_) => "SERIALIZATION_ERROR",
            HealthlinkError::Io(_) => "IO_ERROR",
            HealthlinkError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, HealthlinkError>;
