use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use healthlink_core::checkin::{ExecutionRecord, ExecutionStatus, Schedule};
use healthlink_core::time;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::db::{opt_ts_column, ts_column};
use crate::error::Result;
use crate::store::mark_sent;

const EXECUTION_SELECT_SQL: &str = "
    SELECT id, schedule_id, tenant_id, patient_id, executed_at, status, failure_reason,
           message_sent, message_id, execution_duration_ms, patient_responded,
           response_received_at
    FROM checkin_executions";

/// Append-only log of check-in attempts.
///
/// A success also counts the message against the schedule's daily quota,
/// in the same transaction. No outcome touches `next_execution_at`.
pub struct ExecutionRecorder {
    db: Arc<Mutex<Connection>>,
}

impl ExecutionRecorder {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn record_success(
        &self,
        schedule: &Schedule,
        text: &str,
        message_id: &str,
        duration_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<ExecutionRecord> {
        let record = ExecutionRecord {
            message_sent: Some(text.to_string()),
            message_id: Some(message_id.to_string()),
            execution_duration_ms: Some(duration_ms),
            ..new_record(schedule, ExecutionStatus::Success, now)
        };
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        insert(&tx, &record)?;
        mark_sent(&tx, &schedule.id, now)?;
        tx.commit()?;
        debug!(schedule_id = %schedule.id, execution_id = %record.id, "success recorded");
        Ok(record)
    }

    pub fn record_failure(
        &self,
        schedule: &Schedule,
        reason: &str,
        duration_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<ExecutionRecord> {
        let record = ExecutionRecord {
            failure_reason: Some(reason.to_string()),
            execution_duration_ms: Some(duration_ms),
            ..new_record(schedule, ExecutionStatus::Failed, now)
        };
        let conn = self.db.lock().unwrap();
        insert(&conn, &record)?;
        Ok(record)
    }

    pub fn record_skipped(
        &self,
        schedule: &Schedule,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ExecutionRecord> {
        let record = ExecutionRecord {
            failure_reason: Some(reason.to_string()),
            ..new_record(schedule, ExecutionStatus::Skipped, now)
        };
        let conn = self.db.lock().unwrap();
        insert(&conn, &record)?;
        Ok(record)
    }

    /// History of one schedule, newest first, visible only to its tenant.
    pub fn list_for_schedule(
        &self,
        tenant_id: &str,
        schedule_id: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>> {
        let conn = self.db.lock().unwrap();
        let sql = format!(
            "{EXECUTION_SELECT_SQL}
             WHERE tenant_id = ?1 AND schedule_id = ?2
             ORDER BY executed_at DESC, rowid DESC
             LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![tenant_id, schedule_id, limit as i64], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// FAILED records since the most recent SUCCESS of `schedule_id`.
    pub fn consecutive_failures(&self, schedule_id: &str) -> Result<u32> {
        let conn = self.db.lock().unwrap();
        let n: u32 = conn.query_row(
            "SELECT COUNT(*) FROM checkin_executions
             WHERE schedule_id = ?1 AND status = 'FAILED'
               AND executed_at > COALESCE(
                   (SELECT MAX(executed_at) FROM checkin_executions
                    WHERE schedule_id = ?1 AND status = 'SUCCESS'), '')",
            params![schedule_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Mark the patient's latest unanswered SUCCESS as answered.
    ///
    /// Returns the id of the record updated, if any.
    pub fn record_patient_response(
        &self,
        tenant_id: &str,
        patient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let conn = self.db.lock().unwrap();
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM checkin_executions
                 WHERE tenant_id = ?1 AND patient_id = ?2 AND status = 'SUCCESS'
                   AND patient_responded = 0 AND executed_at <= ?3
                 ORDER BY executed_at DESC, rowid DESC
                 LIMIT 1",
                params![tenant_id, patient_id, time::to_db(at)],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = &id {
            conn.execute(
                "UPDATE checkin_executions
                 SET patient_responded = 1, response_received_at = ?2
                 WHERE id = ?1",
                params![id, time::to_db(at)],
            )?;
            info!(tenant_id, patient_id, execution_id = %id, "patient responded to check-in");
        }
        Ok(id)
    }
}

fn new_record(schedule: &Schedule, status: ExecutionStatus, now: DateTime<Utc>) -> ExecutionRecord {
    ExecutionRecord {
        id: uuid::Uuid::now_v7().to_string(),
        schedule_id: schedule.id.clone(),
        tenant_id: schedule.tenant_id.clone(),
        patient_id: schedule.patient_id.clone(),
        executed_at: now,
        status,
        failure_reason: None,
        message_sent: None,
        message_id: None,
        execution_duration_ms: None,
        patient_responded: false,
        response_received_at: None,
    }
}

fn insert(conn: &Connection, r: &ExecutionRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO checkin_executions
         (id, schedule_id, tenant_id, patient_id, executed_at, status, failure_reason,
          message_sent, message_id, execution_duration_ms, patient_responded,
          response_received_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,0,NULL)",
        params![
            r.id,
            r.schedule_id,
            r.tenant_id,
            r.patient_id,
            time::to_db(r.executed_at),
            r.status.to_string(),
            r.failure_reason,
            r.message_sent,
            r.message_id,
            r.execution_duration_ms.map(|ms| ms as i64),
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        tenant_id: row.get(2)?,
        patient_id: row.get(3)?,
        executed_at: ts_column(row, 4)?,
        status: healthlink_accounts::db::parse_column(row, 5)?,
        failure_reason: row.get(6)?,
        message_sent: row.get(7)?,
        message_id: row.get(8)?,
        execution_duration_ms: row.get::<_, Option<i64>>(9)?.map(|ms| ms.max(0) as u64),
        patient_responded: row.get::<_, i32>(10)? != 0,
        response_received_at: opt_ts_column(row, 11)?,
    })
}
