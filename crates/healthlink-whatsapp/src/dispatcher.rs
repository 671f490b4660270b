use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use crate::error::GatewayError;
use crate::gateway::MessageGateway;

/// Hands one message to the gateway with a bounded wait. Never retries.
pub struct Dispatcher {
    gateway: Arc<dyn MessageGateway>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn MessageGateway>, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    /// Returns the gateway message id.
    #[instrument(skip(self, text), fields(gateway = self.gateway.name()))]
    pub async fn send(&self, destination: &str, text: &str) -> Result<String, GatewayError> {
        if destination.trim().is_empty() {
            return Err(GatewayError::InvalidDestination("empty number".to_string()));
        }
        match tokio::time::timeout(self.timeout, self.gateway.send_text(destination, text)).await {
            Ok(result) => result,
            Err(_) => {
                let ms = self.timeout.as_millis() as u64;
                warn!(ms, "gateway send timed out");
                Err(GatewayError::Timeout { ms })
            }
        }
    }

    pub async fn gateway_available(&self) -> bool {
        self.gateway.is_available().await
    }
}
