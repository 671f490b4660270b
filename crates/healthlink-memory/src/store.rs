use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use healthlink_core::time;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::error::MemoryError;
use crate::types::{ChatRole, ChatTurn};

const TURN_SELECT_SQL: &str = "SELECT id, tenant_id, patient_id, role, content, whatsapp_message_id, created_at
     FROM chat_messages";

/// Conversation history, always addressed by (tenant, patient).
///
/// There is no query that spans tenants.
pub struct ConversationStore {
    db: Arc<Mutex<Connection>>,
}

impl ConversationStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Store an inbound patient message.
    ///
    /// A redelivered gateway id returns the turn stored the first time.
    pub fn save_user_message(
        &self,
        tenant_id: &str,
        patient_id: &str,
        content: &str,
        whatsapp_message_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<ChatTurn, MemoryError> {
        let db = self.db.lock().unwrap();
        if let Some(wa_id) = whatsapp_message_id {
            let sql = format!("{TURN_SELECT_SQL} WHERE tenant_id = ?1 AND whatsapp_message_id = ?2");
            if let Some(existing) = db
                .query_row(&sql, params![tenant_id, wa_id], row_to_turn)
                .optional()?
            {
                warn!(tenant_id, whatsapp_message_id = wa_id, "duplicate inbound message ignored");
                return Ok(existing);
            }
        }
        insert(&db, tenant_id, patient_id, ChatRole::User, content, whatsapp_message_id, at)
    }

    pub fn save_assistant_message(
        &self,
        tenant_id: &str,
        patient_id: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<ChatTurn, MemoryError> {
        let db = self.db.lock().unwrap();
        insert(&db, tenant_id, patient_id, ChatRole::Assistant, content, None, at)
    }

    /// The last `limit` turns of a conversation, oldest first.
    pub fn recent_turns(
        &self,
        tenant_id: &str,
        patient_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, MemoryError> {
        let db = self.db.lock().unwrap();
        let sql = format!(
            "{TURN_SELECT_SQL}
             WHERE tenant_id = ?1 AND patient_id = ?2
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params![tenant_id, patient_id, limit as i64], row_to_turn)?;
        let mut turns = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        // Reverse so oldest first
        turns.reverse();
        debug!(tenant_id, patient_id, count = turns.len(), "loaded recent turns");
        Ok(turns)
    }

    pub fn count_messages(&self, tenant_id: &str, patient_id: &str) -> Result<u64, MemoryError> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE tenant_id = ?1 AND patient_id = ?2",
            params![tenant_id, patient_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

fn insert(
    db: &Connection,
    tenant_id: &str,
    patient_id: &str,
    role: ChatRole,
    content: &str,
    whatsapp_message_id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<ChatTurn, MemoryError> {
    db.execute(
        "INSERT INTO chat_messages
         (tenant_id, patient_id, role, content, whatsapp_message_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            tenant_id,
            patient_id,
            role.as_str(),
            content,
            whatsapp_message_id,
            time::to_db(at)
        ],
    )?;
    Ok(ChatTurn {
        id: db.last_insert_rowid(),
        tenant_id: tenant_id.to_string(),
        patient_id: patient_id.to_string(),
        role,
        content: content.to_string(),
        whatsapp_message_id: whatsapp_message_id.map(String::from),
        created_at: at,
    })
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatTurn> {
    let role: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    Ok(ChatTurn {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        patient_id: row.get(2)?,
        role: role.parse::<ChatRole>().map_err(|e| conversion_error(3, e.into()))?,
        content: row.get(4)?,
        whatsapp_message_id: row.get(5)?,
        created_at: time::from_db(&created_at).map_err(|e| conversion_error(6, Box::new(e)))?,
    })
}

fn conversion_error(
    idx: usize,
    err: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err)
}
