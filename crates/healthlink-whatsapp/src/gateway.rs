use async_trait::async_trait;

use crate::error::GatewayError;

/// A service that delivers text to a phone number.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// cycle of the check-in loop.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Stable lowercase identifier, used in logs.
    fn name(&self) -> &str;

    /// Deliver `text` to `number` and return the gateway's message id.
    /// A single attempt; callers decide what a failure means.
    async fn send_text(&self, number: &str, text: &str) -> Result<String, GatewayError>;

    /// Cheap reachability check.
    async fn is_available(&self) -> bool {
        true
    }
}
