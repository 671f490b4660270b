use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use healthlink_accounts::db::parse_column;
use healthlink_accounts::AccountError;
use healthlink_core::checkin::Schedule;
use healthlink_core::config::RateLimitConfig;
use healthlink_core::tenant::AccountType;
use healthlink_core::time;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::Result;
use crate::store::save_rate_state;
use crate::types::{RateDecision, UsageSummary};

/// Three-tier daily cap: per patient schedule, per tenant, and an optional
/// global ceiling. "Today" is the UTC calendar date passed in.
pub struct RateLimiter {
    db: Arc<Mutex<Connection>>,
    limits: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(db: Arc<Mutex<Connection>>, limits: RateLimitConfig) -> Self {
        Self { db, limits }
    }

    pub fn tenant_limit(&self, account_type: AccountType) -> u32 {
        match account_type {
            AccountType::Managed => self.limits.managed_daily_limit,
            AccountType::Individual => self.limits.individual_daily_limit,
        }
    }

    /// Decide whether `schedule` may send now.
    ///
    /// A counter whose `last_reset_date` is not `today` is zeroed and
    /// persisted first, and `schedule` is updated to match. Denial has no
    /// other side effect.
    pub fn can_send(&self, schedule: &mut Schedule, today: NaiveDate) -> Result<RateDecision> {
        let conn = self.db.lock().unwrap();

        if schedule.last_reset_date != today {
            save_rate_state(&conn, &schedule.id, 0, today, Utc::now())?;
            debug!(
                schedule_id = %schedule.id,
                previous = %schedule.last_reset_date,
                "daily counter reset"
            );
            schedule.messages_sent_today = 0;
            schedule.last_reset_date = today;
        }

        if schedule.messages_sent_today >= schedule.max_messages_per_day {
            return Ok(RateDecision::PatientLimit {
                sent: schedule.messages_sent_today,
                limit: schedule.max_messages_per_day,
            });
        }

        let limit = self.tenant_limit(schedule.owner.account_type);
        let used = successes_on(&conn, Some(&schedule.tenant_id), today)?;
        if used >= limit {
            return Ok(RateDecision::TenantLimit { used, limit });
        }

        if let Some(limit) = self.limits.global_daily_limit {
            let used = successes_on(&conn, None, today)?;
            if used >= limit {
                return Ok(RateDecision::GlobalLimit { used, limit });
            }
        }

        Ok(RateDecision::Allowed)
    }

    /// Zero every active schedule counter last reset before `today`.
    /// Returns the number of schedules reset.
    pub fn reset_daily_counters(&self, today: NaiveDate) -> Result<usize> {
        let conn = self.db.lock().unwrap();
        let today_str = time::date_to_db(today);
        let n = conn.execute(
            "UPDATE checkin_schedules
             SET messages_sent_today = 0, last_reset_date = ?1, updated_at = ?2
             WHERE is_active = 1 AND deleted_at IS NULL AND last_reset_date < ?1",
            params![today_str, time::to_db(Utc::now())],
        )?;
        if n > 0 {
            info!(count = n, %today, "daily counters reset");
        }
        Ok(n)
    }

    /// Successful sends of `tenant_id` on `today` against its tier limit.
    pub fn tenant_usage(&self, tenant_id: &str, today: NaiveDate) -> Result<UsageSummary> {
        let conn = self.db.lock().unwrap();
        let account_type: Option<AccountType> = conn
            .query_row(
                "SELECT account_type FROM accounts WHERE id = ?1",
                params![tenant_id],
                |row| parse_column(row, 0),
            )
            .optional()?;
        let account_type =
            account_type.ok_or_else(|| AccountError::AccountNotFound(tenant_id.to_string()))?;
        let used = successes_on(&conn, Some(tenant_id), today)?;
        Ok(UsageSummary::new(used, self.tenant_limit(account_type)))
    }
}

/// SUCCESS records on `day`, for one tenant or across all of them.
fn successes_on(conn: &Connection, tenant_id: Option<&str>, day: NaiveDate) -> rusqlite::Result<u32> {
    let (start, end) = time::day_bounds(day);
    match tenant_id {
        Some(t) => conn.query_row(
            "SELECT COUNT(*) FROM checkin_executions
             WHERE tenant_id = ?1 AND status = 'SUCCESS'
               AND executed_at >= ?2 AND executed_at < ?3",
            params![t, start, end],
            |row| row.get(0),
        ),
        None => conn.query_row(
            "SELECT COUNT(*) FROM checkin_executions
             WHERE status = 'SUCCESS' AND executed_at >= ?1 AND executed_at < ?2",
            params![start, end],
            |row| row.get(0),
        ),
    }
}
