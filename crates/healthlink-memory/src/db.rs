use rusqlite::{Connection, Result};

/// Initialise the chat history table. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id           TEXT NOT NULL,
            patient_id          TEXT NOT NULL,
            role                TEXT NOT NULL,
            content             TEXT NOT NULL,
            whatsapp_message_id TEXT,
            created_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_patient
            ON chat_messages(tenant_id, patient_id, created_at DESC);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_chat_wa_id
            ON chat_messages(tenant_id, whatsapp_message_id)
            WHERE whatsapp_message_id IS NOT NULL;",
    )
}
