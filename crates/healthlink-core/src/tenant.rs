//! Tenant identity shared by every subsystem.
//!
//! A [`TenantContext`] is a plain value owned by exactly one unit of work.
//! There is no global or thread-local holder: collaborators that
//! need tenant scoping receive the context by reference, and it is dropped
//! when the unit of work returns.

use serde::{Deserialize, Serialize};

use crate::error::{HealthlinkError, Result};

/// Account class. Selects the tenant-level daily cap and the default prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Direct patient account (B2C).
    Individual,
    /// Professional managing several patients (B2B).
    Managed,
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccountType::Individual => "individual",
            AccountType::Managed => "managed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "individual" | "b2c" => Ok(AccountType::Individual),
            "managed" | "b2b" => Ok(AccountType::Managed),
            other => Err(format!("unknown account type: {other}")),
        }
    }
}

/// Billing/lifecycle state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Trial,
    Suspended,
    Cancelled,
}

impl AccountStatus {
    pub const ALL: [AccountStatus; 4] = [
        AccountStatus::Active,
        AccountStatus::Trial,
        AccountStatus::Suspended,
        AccountStatus::Cancelled,
    ];

    /// Only active and trial accounts receive proactive check-ins.
    pub fn is_active_like(self) -> bool {
        matches!(self, AccountStatus::Active | AccountStatus::Trial)
    }

    /// Statuses for which [`is_active_like`](Self::is_active_like) holds.
    pub fn active_like() -> impl Iterator<Item = AccountStatus> {
        Self::ALL.into_iter().filter(|s| s.is_active_like())
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccountStatus::Active => "active",
            AccountStatus::Trial => "trial",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "trial" => Ok(AccountStatus::Trial),
            "suspended" => Ok(AccountStatus::Suspended),
            "cancelled" => Ok(AccountStatus::Cancelled),
            other => Err(format!("unknown account status: {other}")),
        }
    }
}

/// Per-unit-of-work tenant scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    tenant_id: String,
    pub patient_id: Option<String>,
    pub account_type: Option<AccountType>,
    pub custom_prompt: Option<String>,
    pub patient_name: Option<String>,
    pub whatsapp_number: Option<String>,
}

impl TenantContext {
    /// A context is only constructible with a non-empty tenant id.
    pub fn new(tenant_id: impl Into<String>) -> Result<Self> {
        let tenant_id = tenant_id.into();
        if tenant_id.trim().is_empty() {
            return Err(HealthlinkError::InvalidContext(
                "tenant id is required".to_string(),
            ));
        }
        Ok(Self {
            tenant_id,
            patient_id: None,
            account_type: None,
            custom_prompt: None,
            patient_name: None,
            whatsapp_number: None,
        })
    }

    pub fn with_account(mut self, account_type: AccountType, custom_prompt: Option<String>) -> Self {
        self.account_type = Some(account_type);
        self.custom_prompt = custom_prompt;
        self
    }

    pub fn with_patient(
        mut self,
        patient_id: impl Into<String>,
        patient_name: impl Into<String>,
        whatsapp_number: impl Into<String>,
    ) -> Self {
        self.patient_id = Some(patient_id.into());
        self.patient_name = Some(patient_name.into());
        self.whatsapp_number = Some(whatsapp_number.into());
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn is_valid(&self) -> bool {
        !self.tenant_id.trim().is_empty()
    }
}

impl std::fmt::Display for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.patient_id {
            Some(p) => write!(f, "tenant:{}:patient:{}", self.tenant_id, p),
            None => write!(f, "tenant:{}", self.tenant_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tenant_id_is_rejected() {
        assert!(TenantContext::new("").is_err());
        assert!(TenantContext::new("   ").is_err());
    }

    #[test]
    fn builder_fills_patient_and_account() {
        let ctx = TenantContext::new("t-1")
            .unwrap()
            .with_account(AccountType::Managed, Some("be kind".to_string()))
            .with_patient("p-1", "Ana", "5511999999999");
        assert!(ctx.is_valid());
        assert_eq!(ctx.tenant_id(), "t-1");
        assert_eq!(ctx.account_type, Some(AccountType::Managed));
        assert_eq!(ctx.patient_id.as_deref(), Some("p-1"));
        assert_eq!(ctx.to_string(), "tenant:t-1:patient:p-1");
    }

    #[test]
    fn account_type_accepts_legacy_codes() {
        assert_eq!("B2B".parse::<AccountType>().unwrap(), AccountType::Managed);
        assert_eq!("b2c".parse::<AccountType>().unwrap(), AccountType::Individual);
        assert!("enterprise".parse::<AccountType>().is_err());
    }

    #[test]
    fn only_active_and_trial_are_active_like() {
        assert!(AccountStatus::Active.is_active_like());
        assert!(AccountStatus::Trial.is_active_like());
        assert!(!AccountStatus::Suspended.is_active_like());
        assert!(!AccountStatus::Cancelled.is_active_like());
        let listed: Vec<_> = AccountStatus::active_like().collect();
        assert_eq!(listed, [AccountStatus::Active, AccountStatus::Trial]);
    }
}
