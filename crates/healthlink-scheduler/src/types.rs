use chrono::NaiveTime;
use healthlink_core::checkin::{ScheduleType, DEFAULT_MAX_MESSAGES_PER_DAY, DEFAULT_TIMEZONE};
use serde::{Deserialize, Serialize};

/// Owner input for a new schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSchedule {
    pub patient_id: String,
    pub schedule_type: ScheduleType,
    pub time_of_day: NaiveTime,
    /// ISO weekdays; only read for WEEKLY.
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "bool_true")]
    pub use_ai_generation: bool,
    pub custom_message: Option<String>,
    #[serde(default = "default_max_per_day")]
    pub max_messages_per_day: u32,
    pub created_by: Option<String>,
}

impl NewSchedule {
    pub fn new(patient_id: impl Into<String>, schedule_type: ScheduleType, time_of_day: NaiveTime) -> Self {
        Self {
            patient_id: patient_id.into(),
            schedule_type,
            time_of_day,
            days_of_week: Vec::new(),
            timezone: default_timezone(),
            use_ai_generation: true,
            custom_message: None,
            max_messages_per_day: DEFAULT_MAX_MESSAGES_PER_DAY,
            created_by: None,
        }
    }

    pub fn on_days(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.days_of_week = days.into_iter().collect();
        self
    }

    pub fn with_fixed_message(mut self, text: impl Into<String>) -> Self {
        self.use_ai_generation = false;
        self.custom_message = Some(text.into());
        self
    }
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    pub schedule_type: Option<ScheduleType>,
    pub time_of_day: Option<NaiveTime>,
    pub days_of_week: Option<Vec<u8>>,
    pub timezone: Option<String>,
    pub use_ai_generation: Option<bool>,
    /// `Some(None)` clears the message.
    pub custom_message: Option<Option<String>>,
    pub max_messages_per_day: Option<u32>,
}

impl ScheduleUpdate {
    /// True when the next due time has to be recomputed.
    pub fn changes_cadence(&self) -> bool {
        self.schedule_type.is_some()
            || self.time_of_day.is_some()
            || self.days_of_week.is_some()
            || self.timezone.is_some()
    }
}

/// Outcome of a rate-limit check. Only `Allowed` permits a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RateDecision {
    Allowed,
    PatientLimit { sent: u32, limit: u32 },
    TenantLimit { used: u32, limit: u32 },
    GlobalLimit { used: u32, limit: u32 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }

    /// Failure reason stored on SKIPPED records.
    pub fn reason(&self) -> String {
        match self {
            RateDecision::Allowed => "allowed".to_string(),
            RateDecision::PatientLimit { sent, limit } => {
                format!("Rate limit exceeded: patient sent {sent}/{limit} today")
            }
            RateDecision::TenantLimit { used, limit } => {
                format!("Rate limit exceeded: tenant used {used}/{limit} today")
            }
            RateDecision::GlobalLimit { used, limit } => {
                format!("Rate limit exceeded: global usage {used}/{limit} today")
            }
        }
    }
}

/// Daily usage of one tenant against its tier limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub messages_used: u32,
    pub daily_limit: u32,
    pub remaining: u32,
    pub usage_percentage: f64,
}

impl UsageSummary {
    pub fn new(messages_used: u32, daily_limit: u32) -> Self {
        let usage_percentage = if daily_limit == 0 {
            100.0
        } else {
            f64::from(messages_used) / f64::from(daily_limit) * 100.0
        };
        Self {
            messages_used,
            daily_limit,
            remaining: daily_limit.saturating_sub(messages_used),
            usage_percentage,
        }
    }
}

/// Counts for one cycle that held the lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub selected: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Result of one wake of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleReport {
    /// Another instance holds the lease; nothing was touched.
    LockHeld,
    Ran(CycleStats),
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn bool_true() -> bool {
    true
}
fn default_max_per_day() -> u32 {
    DEFAULT_MAX_MESSAGES_PER_DAY
}
