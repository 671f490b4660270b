use rusqlite::{Connection, Result};

use crate::types::{Account, Patient};

pub(crate) const ACCOUNT_SELECT_SQL: &str =
    "SELECT id, name, account_type, status, custom_prompt, created_at, updated_at FROM accounts";

pub(crate) const PATIENT_SELECT_SQL: &str =
    "SELECT id, account_id, name, whatsapp_number, is_active, created_at, updated_at FROM patients";

/// Map a row (column order from ACCOUNT_SELECT_SQL) to an Account.
pub(crate) fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        account_type: parse_column(row, 2)?,
        status: parse_column(row, 3)?,
        custom_prompt: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Map a row (column order from PATIENT_SELECT_SQL) to a Patient.
pub(crate) fn row_to_patient(row: &rusqlite::Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        account_id: row.get(1)?,
        name: row.get(2)?,
        whatsapp_number: row.get(3)?,
        is_active: row.get::<_, i32>(4)? != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Parse a TEXT column through `FromStr`, surfacing bad values as a
/// conversion failure instead of silently defaulting.
pub fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })
}

/// Initialise the accounts subsystem tables. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS accounts (
            id              TEXT PRIMARY KEY NOT NULL,
            name            TEXT NOT NULL,
            account_type    TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'active',
            custom_prompt   TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS patients (
            id              TEXT PRIMARY KEY NOT NULL,
            account_id      TEXT NOT NULL REFERENCES accounts(id),
            name            TEXT NOT NULL,
            whatsapp_number TEXT NOT NULL,
            is_active       INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            UNIQUE(account_id, whatsapp_number)
        );
        CREATE INDEX IF NOT EXISTS idx_patients_account
            ON patients (account_id);",
    )
}
