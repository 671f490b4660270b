//! Check-in domain types, shared between the scheduler, the message
//! generator and the delivery gateway.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HealthlinkError, Result};
use crate::tenant::{AccountStatus, AccountType, TenantContext};

pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";
pub const DEFAULT_MAX_MESSAGES_PER_DAY: u32 = 3;

/// Cadence rule of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    /// Every day at `time_of_day`.
    Daily,
    /// On the ISO weekdays listed in `days_of_week` at `time_of_day`.
    Weekly,
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleType::Daily => "DAILY",
            ScheduleType::Weekly => "WEEKLY",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScheduleType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "DAILY" => Ok(ScheduleType::Daily),
            "WEEKLY" => Ok(ScheduleType::Weekly),
            other => Err(format!("unknown schedule type: {other}")),
        }
    }
}

/// Tenant and patient attributes loaded together with a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOwner {
    pub account_name: String,
    pub account_type: AccountType,
    pub account_status: AccountStatus,
    pub custom_prompt: Option<String>,
    pub patient_name: String,
    pub whatsapp_number: String,
    pub patient_active: bool,
    /// Tenant the patient row belongs to; must equal the schedule's tenant.
    pub patient_account_id: String,
}

/// One recurring proactive check-in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// UUID v4 string, primary key.
    pub id: String,
    pub tenant_id: String,
    pub patient_id: String,

    pub schedule_type: ScheduleType,
    pub time_of_day: NaiveTime,
    /// ISO weekdays, 1 = Monday … 7 = Sunday.
    pub days_of_week: Vec<u8>,
    /// IANA zone name. Stored for owners; due times use the reference clock.
    pub timezone: String,

    pub use_ai_generation: bool,
    pub custom_message: Option<String>,

    pub max_messages_per_day: u32,
    pub messages_sent_today: u32,
    /// The counter above is only meaningful for this date.
    pub last_reset_date: NaiveDate,

    pub is_active: bool,
    pub last_execution_at: Option<DateTime<Utc>>,
    /// Sole trigger for "due".
    pub next_execution_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,

    pub owner: ScheduleOwner,
}

impl Schedule {
    /// Build the tenant scope for evaluating this schedule.
    ///
    /// A patient that belongs to another tenant is an authorization failure;
    /// it is reported, never corrected.
    pub fn tenant_context(&self) -> Result<TenantContext> {
        if self.owner.patient_account_id != self.tenant_id {
            return Err(HealthlinkError::TenantMismatch {
                reason: format!(
                    "patient {} belongs to tenant {}, schedule {} to tenant {}",
                    self.patient_id, self.owner.patient_account_id, self.id, self.tenant_id
                ),
            });
        }
        Ok(TenantContext::new(self.tenant_id.clone())?
            .with_account(self.owner.account_type, self.owner.custom_prompt.clone())
            .with_patient(
                self.patient_id.clone(),
                self.owner.patient_name.clone(),
                self.owner.whatsapp_number.clone(),
            ))
    }

    /// The fixed message to send instead of a generated one, if any.
    pub fn fixed_message(&self) -> Option<&str> {
        if self.use_ai_generation {
            return None;
        }
        self.custom_message.as_deref().filter(|m| !m.is_empty())
    }
}

/// Outcome of one evaluated schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Skipped => "SKIPPED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "SKIPPED" => Ok(ExecutionStatus::Skipped),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Immutable record of one attempt. Only the response-tracking fields are
/// ever updated, by the inbound message flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub schedule_id: String,
    pub tenant_id: String,
    pub patient_id: String,
    pub executed_at: DateTime<Utc>,
    pub status: ExecutionStatus,
    /// Present iff status is FAILED or SKIPPED.
    pub failure_reason: Option<String>,
    /// Present iff status is SUCCESS.
    pub message_sent: Option<String>,
    /// Gateway correlation id.
    pub message_id: Option<String>,
    pub execution_duration_ms: Option<u64>,
    pub patient_responded: bool,
    pub response_received_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule() -> Schedule {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        Schedule {
            id: "s-1".to_string(),
            tenant_id: "t-1".to_string(),
            patient_id: "p-1".to_string(),
            schedule_type: ScheduleType::Daily,
            time_of_day: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            days_of_week: Vec::new(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            use_ai_generation: true,
            custom_message: None,
            max_messages_per_day: 3,
            messages_sent_today: 0,
            last_reset_date: now.date_naive(),
            is_active: true,
            last_execution_at: None,
            next_execution_at: now,
            created_at: now,
            updated_at: now,
            created_by: None,
            owner: ScheduleOwner {
                account_name: "Clinic".to_string(),
                account_type: AccountType::Managed,
                account_status: AccountStatus::Active,
                custom_prompt: Some("You are a caring assistant.".to_string()),
                patient_name: "Ana".to_string(),
                whatsapp_number: "5511999999999".to_string(),
                patient_active: true,
                patient_account_id: "t-1".to_string(),
            },
        }
    }

    #[test]
    fn tenant_context_carries_owner_fields() {
        let ctx = schedule().tenant_context().unwrap();
        assert_eq!(ctx.tenant_id(), "t-1");
        assert_eq!(ctx.patient_id.as_deref(), Some("p-1"));
        assert_eq!(ctx.whatsapp_number.as_deref(), Some("5511999999999"));
        assert_eq!(ctx.account_type, Some(AccountType::Managed));
    }

    #[test]
    fn foreign_patient_is_an_authorization_error() {
        let mut s = schedule();
        s.owner.patient_account_id = "t-2".to_string();
        let err = s.tenant_context().unwrap_err();
        assert_eq!(err.code(), "TENANT_MISMATCH");
    }

    #[test]
    fn fixed_message_requires_ai_off_and_text() {
        let mut s = schedule();
        s.custom_message = Some("Bom dia!".to_string());
        assert_eq!(s.fixed_message(), None);

        s.use_ai_generation = false;
        assert_eq!(s.fixed_message(), Some("Bom dia!"));

        s.custom_message = Some(String::new());
        assert_eq!(s.fixed_message(), None);
    }

    #[test]
    fn whitespace_fixed_message_is_sent_verbatim() {
        let mut s = schedule();
        s.use_ai_generation = false;
        s.custom_message = Some("  ".to_string());
        assert_eq!(s.fixed_message(), Some("  "));
    }
}
