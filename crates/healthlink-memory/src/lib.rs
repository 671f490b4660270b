//! Per-patient conversation history.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::MemoryError;
pub use store::ConversationStore;
pub use types::{ChatRole, ChatTurn};
