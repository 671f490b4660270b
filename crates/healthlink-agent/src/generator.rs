use std::sync::Arc;

use healthlink_core::checkin::Schedule;
use healthlink_core::config::{ChatConfig, DEFAULT_HISTORY_TURNS};
use healthlink_core::tenant::TenantContext;
use healthlink_memory::{ChatRole, ConversationStore, MemoryError};
use tracing::{debug, instrument};

use crate::prompt::{proactive_system_prompt, PROACTIVE_TRIGGER};
use crate::provider::{ChatRequest, LlmProvider, Message, ProviderError, Role};

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("history lookup failed: {0}")]
    History(#[from] MemoryError),

    #[error("provider returned an empty completion")]
    EmptyCompletion,

    #[error("context has no patient")]
    MissingPatient,

    #[error("AI generation is not configured")]
    NotConfigured,
}

/// Produces the text of one proactive check-in.
///
/// Every input is taken from the [`TenantContext`] handed in; nothing is
/// cached between calls.
pub struct MessageGenerator {
    provider: Option<Arc<dyn LlmProvider>>,
    history: Arc<ConversationStore>,
    model: String,
    max_tokens: u32,
    history_turns: usize,
}

impl MessageGenerator {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, history: Arc<ConversationStore>) -> Self {
        let chat = ChatConfig::default();
        Self {
            provider,
            history,
            model: chat.model,
            max_tokens: chat.max_tokens,
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>, max_tokens: u32) -> Self {
        self.model = model.into();
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Fixed text when the schedule opts out of AI generation, otherwise a
    /// single completion call. No retry.
    #[instrument(skip_all, fields(tenant_id = %ctx.tenant_id(), schedule_id = %schedule.id))]
    pub async fn generate(
        &self,
        ctx: &TenantContext,
        schedule: &Schedule,
    ) -> Result<String, GenerateError> {
        if let Some(fixed) = schedule.fixed_message() {
            debug!("using fixed custom message");
            return Ok(fixed.to_string());
        }

        let provider = self.provider.as_ref().ok_or(GenerateError::NotConfigured)?;
        let patient_id = ctx.patient_id.as_deref().ok_or(GenerateError::MissingPatient)?;

        let mut messages: Vec<Message> = self
            .history
            .recent_turns(ctx.tenant_id(), patient_id, self.history_turns)?
            .into_iter()
            .map(|turn| Message {
                role: match turn.role {
                    ChatRole::User => Role::User,
                    ChatRole::Assistant => Role::Assistant,
                },
                content: turn.content,
            })
            .collect();
        messages.push(Message {
            role: Role::User,
            content: PROACTIVE_TRIGGER.to_string(),
        });

        let req = ChatRequest {
            model: self.model.clone(),
            system: proactive_system_prompt(ctx),
            messages,
            max_tokens: self.max_tokens,
        };

        let resp = provider.send(&req).await?;
        let text = resp.content.trim();
        if text.is_empty() {
            return Err(GenerateError::EmptyCompletion);
        }
        debug!(
            provider = provider.name(),
            tokens_in = resp.tokens_in,
            tokens_out = resp.tokens_out,
            "proactive message generated"
        );
        Ok(text.to_string())
    }
}
