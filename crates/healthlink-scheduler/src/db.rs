use chrono::{DateTime, NaiveDate, Utc};
use healthlink_core::time;
use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`. Idempotent.
///
/// The due query joins `accounts` and `patients`, which are created by
/// `healthlink_accounts::db::init_db` on the same database.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS checkin_schedules (
            id                   TEXT    NOT NULL PRIMARY KEY,
            tenant_id            TEXT    NOT NULL,
            patient_id           TEXT    NOT NULL,
            schedule_type        TEXT    NOT NULL,   -- DAILY | WEEKLY
            time_of_day          TEXT    NOT NULL,   -- HH:MM:SS
            days_of_week         TEXT    NOT NULL DEFAULT '[]',  -- JSON array of 1..=7
            timezone             TEXT    NOT NULL,
            use_ai_generation    INTEGER NOT NULL DEFAULT 1,
            custom_message       TEXT,
            max_messages_per_day INTEGER NOT NULL DEFAULT 3,
            messages_sent_today  INTEGER NOT NULL DEFAULT 0,
            last_reset_date      TEXT    NOT NULL,   -- YYYY-MM-DD
            is_active            INTEGER NOT NULL DEFAULT 1,
            last_execution_at    TEXT,
            next_execution_at    TEXT    NOT NULL,
            created_at           TEXT    NOT NULL,
            updated_at           TEXT    NOT NULL,
            created_by           TEXT,
            deleted_at           TEXT
        ) STRICT;

        -- Polling: WHERE is_active = 1 AND next_execution_at <= ? ORDER BY next_execution_at
        CREATE INDEX IF NOT EXISTS idx_schedules_due
            ON checkin_schedules (is_active, next_execution_at);
        CREATE INDEX IF NOT EXISTS idx_schedules_tenant
            ON checkin_schedules (tenant_id, patient_id);

        CREATE TABLE IF NOT EXISTS checkin_executions (
            id                    TEXT    NOT NULL PRIMARY KEY,
            schedule_id           TEXT    NOT NULL,
            tenant_id             TEXT    NOT NULL,
            patient_id            TEXT    NOT NULL,
            executed_at           TEXT    NOT NULL,
            status                TEXT    NOT NULL,   -- SUCCESS | FAILED | SKIPPED
            failure_reason        TEXT,
            message_sent          TEXT,
            message_id            TEXT,
            execution_duration_ms INTEGER,
            patient_responded     INTEGER NOT NULL DEFAULT 0,
            response_received_at  TEXT
        ) STRICT;

        -- Tenant daily usage: WHERE tenant_id = ? AND status = 'SUCCESS' AND executed_at in [day)
        CREATE INDEX IF NOT EXISTS idx_executions_tenant_day
            ON checkin_executions (tenant_id, status, executed_at);
        CREATE INDEX IF NOT EXISTS idx_executions_schedule
            ON checkin_executions (schedule_id, executed_at DESC);
        CREATE INDEX IF NOT EXISTS idx_executions_patient
            ON checkin_executions (tenant_id, patient_id, executed_at DESC);
        ",
    )?;
    Ok(())
}

pub(crate) fn ts_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    time::from_db(&raw).map_err(|e| conversion_error(idx, Box::new(e)))
}

pub(crate) fn opt_ts_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => time::from_db(&raw)
            .map(Some)
            .map_err(|e| conversion_error(idx, Box::new(e))),
        None => Ok(None),
    }
}

pub(crate) fn date_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    time::date_from_db(&raw).map_err(|e| conversion_error(idx, Box::new(e)))
}

pub(crate) fn conversion_error(
    idx: usize,
    err: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err)
}
