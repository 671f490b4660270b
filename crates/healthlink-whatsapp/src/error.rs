use thiserror::Error;

/// Errors raised while handing a message to the messaging gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure before a status code was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-2xx status.
    #[error("Gateway rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Send timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),
}
