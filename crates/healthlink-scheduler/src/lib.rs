//! `healthlink-scheduler`: proactive check-in scheduling with SQLite persistence.
//!
//! # Overview
//!
//! Schedules live in the `checkin_schedules` table. The [`engine::CheckinEngine`]
//! wakes every interval, takes a cluster-wide lease from a [`lock::LockProvider`],
//! and sends one check-in for every schedule whose `next_execution_at` has
//! arrived. Each attempt is appended to `checkin_executions`.
//!
//! # Per-schedule pipeline
//!
//! | Step          | Component                          | On failure              |
//! |---------------|------------------------------------|-------------------------|
//! | Tenant scope  | `Schedule::tenant_context`         | FAILED record           |
//! | Daily caps    | [`rate_limit::RateLimiter`]        | SKIPPED record          |
//! | Text          | `healthlink_agent::MessageGenerator` | FAILED record         |
//! | Delivery      | `healthlink_whatsapp::Dispatcher`  | FAILED record           |
//! | Bookkeeping   | [`recorder::ExecutionRecorder`], [`store::ScheduleStore`] | FAILED record |
//!
//! Only a SUCCESS advances `next_execution_at`; anything else is retried on
//! the next cycle.

pub mod db;
pub mod engine;
pub mod error;
pub mod lock;
pub mod rate_limit;
pub mod recorder;
pub mod schedule;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::{CheckinEngine, EngineSettings};
pub use error::{Result, SchedulerError};
pub use lock::{Lease, LockProvider, SqliteLockProvider};
pub use rate_limit::RateLimiter;
pub use recorder::ExecutionRecorder;
pub use store::ScheduleStore;
pub use types::{CycleReport, CycleStats, NewSchedule, RateDecision, ScheduleUpdate, UsageSummary};
