use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use healthlink_core::config::WhatsappConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::gateway::MessageGateway;

/// Evolution API client (`POST {base}/message/sendText/{instance}`).
pub struct EvolutionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    instance: String,
    delay_ms: u32,
}

#[derive(Serialize)]
struct SendTextBody<'a> {
    number: &'a str,
    text: &'a str,
    /// Typing delay applied by the gateway before delivery.
    delay: u32,
}

impl EvolutionClient {
    pub fn new(cfg: &WhatsappConfig) -> Result<Self, GatewayError> {
        if cfg.api_key.is_empty() {
            return Err(GatewayError::Config("whatsapp.api_key is not set".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            instance: cfg.instance.clone(),
            delay_ms: cfg.delay_ms,
        })
    }

    fn send_url(&self) -> String {
        format!("{}/message/sendText/{}", self.base_url, self.instance)
    }
}

#[async_trait]
impl MessageGateway for EvolutionClient {
    fn name(&self) -> &str {
        "evolution"
    }

    async fn send_text(&self, number: &str, text: &str) -> Result<String, GatewayError> {
        let url = self.send_url();
        debug!(%url, number, len = text.len(), "sending text via Evolution API");

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&SendTextBody {
                number,
                text,
                delay: self.delay_ms,
            })
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = status.as_u16(), body = %body, "Evolution API rejected message");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = extract_message_id(&body).unwrap_or_else(local_message_id);
        info!(number, message_id = %message_id, "message accepted by Evolution API");
        Ok(message_id)
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/instance/fetchInstances", self.base_url);
        match self.client.get(&url).header("apikey", &self.api_key).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Evolution API unreachable");
                false
            }
        }
    }
}

/// Delivery id from a send response (`{"key": {"id": "..."}}`).
fn extract_message_id(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v.get("key")?
        .get("id")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Used when the gateway accepts a message without returning an id.
fn local_message_id() -> String {
    format!("PROACTIVE_{}", Utc::now().timestamp_millis())
}
