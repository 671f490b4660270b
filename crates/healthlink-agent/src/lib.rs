//! Proactive message generation on top of a chat-completion provider.

pub mod generator;
pub mod openai;
pub mod prompt;
pub mod provider;

pub use generator::{GenerateError, MessageGenerator};
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role};
