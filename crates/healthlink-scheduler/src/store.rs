use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use healthlink_accounts::db::parse_column;
use healthlink_accounts::directory::patient_for_tenant;
use healthlink_core::checkin::{Schedule, ScheduleOwner};
use healthlink_core::tenant::AccountStatus;
use healthlink_core::time;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument};

use crate::db::{conversion_error, date_column, opt_ts_column, ts_column};
use crate::error::{Result, SchedulerError};
use crate::schedule::{first_execution, normalize_days, validate_cadence};
use crate::types::{NewSchedule, ScheduleUpdate};

/// Column order is shared by every query through [`row_to_schedule`].
const SCHEDULE_SELECT_SQL: &str = "
    SELECT s.id, s.tenant_id, s.patient_id, s.schedule_type, s.time_of_day,
           s.days_of_week, s.timezone, s.use_ai_generation, s.custom_message,
           s.max_messages_per_day, s.messages_sent_today, s.last_reset_date,
           s.is_active, s.last_execution_at, s.next_execution_at,
           s.created_at, s.updated_at, s.created_by,
           a.name, a.account_type, a.status, a.custom_prompt,
           p.name, p.whatsapp_number, p.is_active, p.account_id
    FROM checkin_schedules s
    JOIN accounts a ON a.id = s.tenant_id
    JOIN patients p ON p.id = s.patient_id";

/// Persistence for check-in schedules.
///
/// Owner operations are tenant-scoped: a schedule of another tenant is an
/// [`SchedulerError::Unauthorized`], never silently filtered or corrected.
pub struct ScheduleStore {
    db: Arc<Mutex<Connection>>,
}

impl ScheduleStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Active, non-deleted schedules due at `now` whose tenant is active or
    /// trial and whose patient is active. Earliest due first, ties by id.
    #[instrument(skip(self))]
    pub fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>> {
        let statuses = AccountStatus::active_like()
            .map(|s| format!("'{s}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let conn = self.db.lock().unwrap();
        let sql = format!(
            "{SCHEDULE_SELECT_SQL}
             WHERE s.is_active = 1
               AND s.deleted_at IS NULL
               AND s.next_execution_at <= ?1
               AND a.status IN ({statuses})
               AND p.is_active = 1
             ORDER BY s.next_execution_at ASC, s.id ASC"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![time::to_db(now)], row_to_schedule)?;
        let due = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(count = due.len(), "due schedules selected");
        Ok(due)
    }

    #[instrument(skip(self, input), fields(patient_id = %input.patient_id))]
    pub fn create(&self, tenant_id: &str, input: NewSchedule, now: DateTime<Utc>) -> Result<Schedule> {
        validate_cadence(&input.days_of_week, input.max_messages_per_day)?;
        let days = normalize_days(&input.days_of_week);
        let next = first_execution(input.schedule_type, input.time_of_day, &days, now);

        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.db.lock().unwrap();
        patient_for_tenant(&conn, tenant_id, &input.patient_id)?;

        let now_str = time::to_db(now);
        conn.execute(
            "INSERT INTO checkin_schedules
             (id, tenant_id, patient_id, schedule_type, time_of_day, days_of_week, timezone,
              use_ai_generation, custom_message, max_messages_per_day, messages_sent_today,
              last_reset_date, is_active, last_execution_at, next_execution_at,
              created_at, updated_at, created_by, deleted_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,0,?11,1,NULL,?12,?13,?13,?14,NULL)",
            params![
                id,
                tenant_id,
                input.patient_id,
                input.schedule_type.to_string(),
                time_of_day_to_db(input.time_of_day),
                days_to_db(&days),
                input.timezone,
                input.use_ai_generation as i32,
                input.custom_message,
                input.max_messages_per_day,
                time::date_to_db(now.date_naive()),
                time::to_db(next),
                now_str,
                input.created_by,
            ],
        )?;
        info!(schedule_id = %id, next_execution_at = %next, "schedule created");
        load(&conn, &id)?.ok_or(SchedulerError::ScheduleNotFound { id })
    }

    /// Apply a partial update. A cadence change recomputes the next
    /// execution from `now`.
    #[instrument(skip(self, update))]
    pub fn update(
        &self,
        tenant_id: &str,
        schedule_id: &str,
        update: ScheduleUpdate,
        now: DateTime<Utc>,
    ) -> Result<Schedule> {
        let conn = self.db.lock().unwrap();
        let mut s = load_for_tenant(&conn, tenant_id, schedule_id)?;

        if let Some(t) = update.schedule_type {
            s.schedule_type = t;
        }
        if let Some(t) = update.time_of_day {
            s.time_of_day = t;
        }
        if let Some(days) = &update.days_of_week {
            s.days_of_week = normalize_days(days);
        }
        if let Some(tz) = &update.timezone {
            s.timezone = tz.clone();
        }
        if let Some(ai) = update.use_ai_generation {
            s.use_ai_generation = ai;
        }
        if let Some(msg) = &update.custom_message {
            s.custom_message = msg.clone();
        }
        if let Some(max) = update.max_messages_per_day {
            s.max_messages_per_day = max;
        }
        validate_cadence(&s.days_of_week, s.max_messages_per_day)?;
        if update.changes_cadence() {
            s.next_execution_at = first_execution(s.schedule_type, s.time_of_day, &s.days_of_week, now);
        }

        conn.execute(
            "UPDATE checkin_schedules
             SET schedule_type = ?2, time_of_day = ?3, days_of_week = ?4, timezone = ?5,
                 use_ai_generation = ?6, custom_message = ?7, max_messages_per_day = ?8,
                 next_execution_at = ?9, updated_at = ?10
             WHERE id = ?1",
            params![
                s.id,
                s.schedule_type.to_string(),
                time_of_day_to_db(s.time_of_day),
                days_to_db(&s.days_of_week),
                s.timezone,
                s.use_ai_generation as i32,
                s.custom_message,
                s.max_messages_per_day,
                time::to_db(s.next_execution_at),
                time::to_db(now),
            ],
        )?;
        info!(next_execution_at = %s.next_execution_at, "schedule updated");
        load(&conn, schedule_id)?.ok_or_else(|| SchedulerError::ScheduleNotFound {
            id: schedule_id.to_string(),
        })
    }

    /// Flip `is_active`. The next execution is left as stored.
    #[instrument(skip(self))]
    pub fn toggle(&self, tenant_id: &str, schedule_id: &str, now: DateTime<Utc>) -> Result<Schedule> {
        let conn = self.db.lock().unwrap();
        let s = load_for_tenant(&conn, tenant_id, schedule_id)?;
        conn.execute(
            "UPDATE checkin_schedules SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![schedule_id, (!s.is_active) as i32, time::to_db(now)],
        )?;
        info!(is_active = !s.is_active, "schedule toggled");
        load(&conn, schedule_id)?.ok_or_else(|| SchedulerError::ScheduleNotFound {
            id: schedule_id.to_string(),
        })
    }

    /// Logical delete. Execution history is kept.
    #[instrument(skip(self))]
    pub fn delete(&self, tenant_id: &str, schedule_id: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.db.lock().unwrap();
        load_for_tenant(&conn, tenant_id, schedule_id)?;
        let now_str = time::to_db(now);
        conn.execute(
            "UPDATE checkin_schedules SET is_active = 0, deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![schedule_id, now_str],
        )?;
        info!("schedule deleted");
        Ok(())
    }

    pub fn get(&self, tenant_id: &str, schedule_id: &str) -> Result<Schedule> {
        let conn = self.db.lock().unwrap();
        load_for_tenant(&conn, tenant_id, schedule_id)
    }

    pub fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<Schedule>> {
        let conn = self.db.lock().unwrap();
        let sql = format!(
            "{SCHEDULE_SELECT_SQL}
             WHERE s.tenant_id = ?1 AND s.deleted_at IS NULL
             ORDER BY s.created_at DESC, s.id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![tenant_id], row_to_schedule)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_for_patient(&self, tenant_id: &str, patient_id: &str) -> Result<Vec<Schedule>> {
        let conn = self.db.lock().unwrap();
        patient_for_tenant(&conn, tenant_id, patient_id)?;
        let sql = format!(
            "{SCHEDULE_SELECT_SQL}
             WHERE s.tenant_id = ?1 AND s.patient_id = ?2 AND s.deleted_at IS NULL
             ORDER BY s.created_at DESC, s.id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![tenant_id, patient_id], row_to_schedule)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Persist the next due time computed by the loop after a send.
    pub fn set_next_execution(
        &self,
        schedule_id: &str,
        next: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "UPDATE checkin_schedules SET next_execution_at = ?2, updated_at = ?3 WHERE id = ?1",
            params![schedule_id, time::to_db(next), time::to_db(now)],
        )?;
        if n == 0 {
            return Err(SchedulerError::ScheduleNotFound {
                id: schedule_id.to_string(),
            });
        }
        Ok(())
    }
}

/// Counter bookkeeping used by the rate limiter.
pub(crate) fn save_rate_state(
    conn: &Connection,
    schedule_id: &str,
    messages_sent_today: u32,
    last_reset_date: NaiveDate,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE checkin_schedules
         SET messages_sent_today = ?2, last_reset_date = ?3, updated_at = ?4
         WHERE id = ?1",
        params![
            schedule_id,
            messages_sent_today,
            time::date_to_db(last_reset_date),
            time::to_db(now)
        ],
    )?;
    Ok(())
}

/// Count one delivered message, in the recorder's transaction.
pub(crate) fn mark_sent(conn: &Connection, schedule_id: &str, at: DateTime<Utc>) -> rusqlite::Result<()> {
    let at = time::to_db(at);
    conn.execute(
        "UPDATE checkin_schedules
         SET messages_sent_today = messages_sent_today + 1,
             last_execution_at = ?2, updated_at = ?2
         WHERE id = ?1",
        params![schedule_id, at],
    )?;
    Ok(())
}

fn load(conn: &Connection, schedule_id: &str) -> Result<Option<Schedule>> {
    let sql = format!("{SCHEDULE_SELECT_SQL} WHERE s.id = ?1 AND s.deleted_at IS NULL");
    Ok(conn
        .query_row(&sql, params![schedule_id], row_to_schedule)
        .optional()?)
}

fn load_for_tenant(conn: &Connection, tenant_id: &str, schedule_id: &str) -> Result<Schedule> {
    let s = load(conn, schedule_id)?.ok_or_else(|| SchedulerError::ScheduleNotFound {
        id: schedule_id.to_string(),
    })?;
    if s.tenant_id != tenant_id {
        return Err(SchedulerError::Unauthorized(format!(
            "schedule {schedule_id} does not belong to tenant {tenant_id}"
        )));
    }
    Ok(s)
}

fn time_of_day_to_db(t: chrono::NaiveTime) -> String {
    t.format("%H:%M:%S").to_string()
}

fn days_to_db(days: &[u8]) -> String {
    serde_json::to_string(days).unwrap_or_else(|_| "[]".to_string())
}

/// Map a row (column order from SCHEDULE_SELECT_SQL) to a Schedule.
fn row_to_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schedule> {
    let time_of_day: String = row.get(4)?;
    let time_of_day = chrono::NaiveTime::parse_from_str(&time_of_day, "%H:%M:%S")
        .map_err(|e| conversion_error(4, Box::new(e)))?;
    let days: String = row.get(5)?;
    let days_of_week: Vec<u8> =
        serde_json::from_str(&days).map_err(|e| conversion_error(5, Box::new(e)))?;

    Ok(Schedule {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        patient_id: row.get(2)?,
        schedule_type: parse_column(row, 3)?,
        time_of_day,
        days_of_week,
        timezone: row.get(6)?,
        use_ai_generation: row.get::<_, i32>(7)? != 0,
        custom_message: row.get(8)?,
        max_messages_per_day: row.get(9)?,
        messages_sent_today: row.get(10)?,
        last_reset_date: date_column(row, 11)?,
        is_active: row.get::<_, i32>(12)? != 0,
        last_execution_at: opt_ts_column(row, 13)?,
        next_execution_at: ts_column(row, 14)?,
        created_at: ts_column(row, 15)?,
        updated_at: ts_column(row, 16)?,
        created_by: row.get(17)?,
        owner: ScheduleOwner {
            account_name: row.get(18)?,
            account_type: parse_column(row, 19)?,
            account_status: parse_column(row, 20)?,
            custom_prompt: row.get(21)?,
            patient_name: row.get(22)?,
            whatsapp_number: row.get(23)?,
            patient_active: row.get::<_, i32>(24)? != 0,
            patient_account_id: row.get(25)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fixture, hm, tuesday};
    use chrono::{Duration, TimeZone};
    use healthlink_core::checkin::ScheduleType;

    #[test]
    fn create_sets_first_execution_and_zeroed_counters() {
        let f = fixture();
        let s = f
            .store
            .create(&f.tenant, NewSchedule::new(&f.patient, ScheduleType::Daily, hm(18, 0)), tuesday(10, 0))
            .unwrap();
        assert_eq!(s.next_execution_at, tuesday(18, 0));
        assert_eq!(s.messages_sent_today, 0);
        assert_eq!(s.last_reset_date, tuesday(10, 0).date_naive());
        assert!(s.is_active);
        assert_eq!(s.owner.patient_account_id, f.tenant);
        assert_eq!(s.owner.whatsapp_number, "5511999999999");
    }

    #[test]
    fn create_rejects_foreign_patient_and_bad_days() {
        let f = fixture();
        let other = f.other_tenant();
        let err = f
            .store
            .create(&other, NewSchedule::new(&f.patient, ScheduleType::Daily, hm(8, 0)), tuesday(10, 0))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Unauthorized(_)));

        let err = f
            .store
            .create(
                &f.tenant,
                NewSchedule::new(&f.patient, ScheduleType::Weekly, hm(8, 0)).on_days([2, 8]),
                tuesday(10, 0),
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
    }

    #[test]
    fn due_selection_is_ordered_and_idempotent() {
        let f = fixture();
        let now = tuesday(10, 0);
        let yesterday = now - Duration::days(1);
        let a = f.daily_at(hm(8, 0), yesterday);
        let b = f.daily_at(hm(7, 0), yesterday);
        let later = f.daily_at(hm(23, 0), yesterday);
        f.force_next(&later.id, now + Duration::hours(1));

        let first: Vec<_> = f.store.due_schedules(now).unwrap().into_iter().map(|s| s.id).collect();
        let second: Vec<_> = f.store.due_schedules(now).unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(first, second);
        // b's first execution (today 07:00) precedes a's (today 08:00).
        assert_eq!(first, vec![b.id, a.id]);
    }

    #[test]
    fn due_selection_excludes_inactive_owners() {
        let f = fixture();
        let now = tuesday(10, 0);
        f.daily_at(hm(8, 0), now - Duration::days(1));
        assert_eq!(f.store.due_schedules(now).unwrap().len(), 1);

        f.directory.set_account_status(&f.tenant, AccountStatus::Trial).unwrap();
        assert_eq!(f.store.due_schedules(now).unwrap().len(), 1);

        f.directory.set_account_status(&f.tenant, AccountStatus::Suspended).unwrap();
        assert!(f.store.due_schedules(now).unwrap().is_empty());

        f.directory.set_account_status(&f.tenant, AccountStatus::Cancelled).unwrap();
        assert!(f.store.due_schedules(now).unwrap().is_empty());

        f.directory.set_account_status(&f.tenant, AccountStatus::Active).unwrap();
        f.directory.set_patient_active(&f.tenant, &f.patient, false).unwrap();
        assert!(f.store.due_schedules(now).unwrap().is_empty());
    }

    #[test]
    fn toggle_and_delete_remove_from_due_set() {
        let f = fixture();
        let now = tuesday(10, 0);
        let s = f.daily_at(hm(8, 0), now - Duration::days(1));

        let off = f.store.toggle(&f.tenant, &s.id, now).unwrap();
        assert!(!off.is_active);
        assert!(f.store.due_schedules(now).unwrap().is_empty());
        let on = f.store.toggle(&f.tenant, &s.id, now).unwrap();
        assert!(on.is_active);
        assert_eq!(on.next_execution_at, s.next_execution_at);

        f.store.delete(&f.tenant, &s.id, now).unwrap();
        assert!(f.store.due_schedules(now).unwrap().is_empty());
        assert!(matches!(
            f.store.get(&f.tenant, &s.id),
            Err(SchedulerError::ScheduleNotFound { .. })
        ));
        assert!(f.store.list_for_tenant(&f.tenant).unwrap().is_empty());
    }

    #[test]
    fn owner_operations_are_tenant_scoped() {
        let f = fixture();
        let now = tuesday(10, 0);
        let s = f.daily_at(hm(8, 0), now);
        let other = f.other_tenant();

        assert!(matches!(f.store.get(&other, &s.id), Err(SchedulerError::Unauthorized(_))));
        assert!(matches!(f.store.toggle(&other, &s.id, now), Err(SchedulerError::Unauthorized(_))));
        assert!(matches!(f.store.delete(&other, &s.id, now), Err(SchedulerError::Unauthorized(_))));
        assert!(f.store.list_for_tenant(&other).unwrap().is_empty());
        assert!(f.store.list_for_patient(&other, &f.patient).is_err());
        assert_eq!(f.store.list_for_patient(&f.tenant, &f.patient).unwrap().len(), 1);
    }

    #[test]
    fn cadence_update_recomputes_next_execution() {
        let f = fixture();
        let now = tuesday(10, 0);
        let s = f.daily_at(hm(8, 0), now);
        assert_eq!(s.next_execution_at, Utc.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap());

        let msg_only = f
            .store
            .update(
                &f.tenant,
                &s.id,
                ScheduleUpdate {
                    custom_message: Some(Some("Oi".to_string())),
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        assert_eq!(msg_only.next_execution_at, s.next_execution_at);
        assert_eq!(msg_only.custom_message.as_deref(), Some("Oi"));

        let weekly = f
            .store
            .update(
                &f.tenant,
                &s.id,
                ScheduleUpdate {
                    schedule_type: Some(ScheduleType::Weekly),
                    days_of_week: Some(vec![5, 1]),
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        assert_eq!(weekly.days_of_week, vec![1, 5]);
        // Friday 2026-03-13 08:00.
        assert_eq!(weekly.next_execution_at, Utc.with_ymd_and_hms(2026, 3, 13, 8, 0, 0).unwrap());
    }
}
