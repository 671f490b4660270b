use healthlink_core::tenant::{AccountStatus, AccountType};
use serde::{Deserialize, Serialize};

/// A tenant. Every schedule, patient and chat turn is scoped to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// UUIDv7.
    pub id: String,
    pub name: String,
    pub account_type: AccountType,
    pub status: AccountStatus,
    /// Replaces the default assistant persona for this tenant's patients.
    pub custom_prompt: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    /// Owning tenant.
    pub account_id: String,
    pub name: String,
    /// Digits only, country code included.
    pub whatsapp_number: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Strip formatting and check the 12–15 digit international form.
pub fn normalize_whatsapp_number(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let only_formatting = raw
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
    if only_formatting && (12..=15).contains(&digits.len()) {
        Some(digits)
    } else {
        None
    }
}
