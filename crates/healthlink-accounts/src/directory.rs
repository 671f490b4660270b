use std::sync::{Arc, Mutex};

use chrono::Utc;
use healthlink_core::tenant::{AccountStatus, AccountType};
use healthlink_core::time;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, instrument};

use crate::db::{row_to_account, row_to_patient, ACCOUNT_SELECT_SQL, PATIENT_SELECT_SQL};
use crate::error::{AccountError, Result};
use crate::types::{normalize_whatsapp_number, Account, Patient};

/// Owner-facing view over the accounts and patients tables.
///
/// Every patient lookup takes the caller's tenant id; a patient of another
/// tenant is reported as [`AccountError::Unauthorized`], never returned.
pub struct AccountDirectory {
    db: Arc<Mutex<Connection>>,
}

impl AccountDirectory {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, custom_prompt))]
    pub fn create_account(
        &self,
        name: &str,
        account_type: AccountType,
        custom_prompt: Option<&str>,
    ) -> Result<Account> {
        let id = uuid::Uuid::now_v7().to_string();
        let now = time::to_db(Utc::now());
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO accounts (id, name, account_type, status, custom_prompt, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                name,
                account_type.to_string(),
                AccountStatus::Active.to_string(),
                custom_prompt,
                now
            ],
        )?;
        info!(account_id = %id, "account created");
        get_account(&conn, &id)?.ok_or(AccountError::AccountNotFound(id))
    }

    pub fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        let conn = self.db.lock().unwrap();
        get_account(&conn, account_id)
    }

    /// Suspended and cancelled tenants drop out of the due query.
    #[instrument(skip(self))]
    pub fn set_account_status(&self, account_id: &str, status: AccountStatus) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE accounts SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![account_id, status.to_string(), time::to_db(Utc::now())],
        )?;
        if rows == 0 {
            return Err(AccountError::AccountNotFound(account_id.to_string()));
        }
        info!(%status, "account status changed");
        Ok(())
    }

    /// Replace the tenant persona used for generated check-ins. `None` falls
    /// back to the default prompt of the account type.
    #[instrument(skip(self, prompt))]
    pub fn set_custom_prompt(&self, account_id: &str, prompt: Option<&str>) -> Result<()> {
        let prompt = prompt.map(str::trim).filter(|p| !p.is_empty());
        let conn = self.db.lock().unwrap();
        let rows = conn.execute(
            "UPDATE accounts SET custom_prompt = ?2, updated_at = ?3 WHERE id = ?1",
            params![account_id, prompt, time::to_db(Utc::now())],
        )?;
        if rows == 0 {
            return Err(AccountError::AccountNotFound(account_id.to_string()));
        }
        info!(cleared = prompt.is_none(), "custom prompt updated");
        Ok(())
    }

    #[instrument(skip(self, whatsapp_number))]
    pub fn add_patient(&self, tenant_id: &str, name: &str, whatsapp_number: &str) -> Result<Patient> {
        let number = normalize_whatsapp_number(whatsapp_number)
            .ok_or_else(|| AccountError::InvalidNumber(whatsapp_number.to_string()))?;
        let id = uuid::Uuid::now_v7().to_string();
        let now = time::to_db(Utc::now());
        let conn = self.db.lock().unwrap();
        if get_account(&conn, tenant_id)?.is_none() {
            return Err(AccountError::AccountNotFound(tenant_id.to_string()));
        }
        conn.execute(
            "INSERT INTO patients (id, account_id, name, whatsapp_number, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![id, tenant_id, name, number, now],
        )?;
        info!(patient_id = %id, "patient added");
        find_patient(&conn, &id)?.ok_or(AccountError::PatientNotFound(id))
    }

    /// Tenant-scoped patient lookup.
    pub fn get_patient(&self, tenant_id: &str, patient_id: &str) -> Result<Patient> {
        let conn = self.db.lock().unwrap();
        patient_for_tenant(&conn, tenant_id, patient_id)
    }

    pub fn list_patients(&self, tenant_id: &str) -> Result<Vec<Patient>> {
        let conn = self.db.lock().unwrap();
        let sql = format!("{PATIENT_SELECT_SQL} WHERE account_id = ?1 ORDER BY name ASC, id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![tenant_id], row_to_patient)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Inactive patients keep their schedules but are never selected as due.
    #[instrument(skip(self))]
    pub fn set_patient_active(&self, tenant_id: &str, patient_id: &str, active: bool) -> Result<()> {
        let conn = self.db.lock().unwrap();
        patient_for_tenant(&conn, tenant_id, patient_id)?;
        conn.execute(
            "UPDATE patients SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![patient_id, active as i32, time::to_db(Utc::now())],
        )?;
        Ok(())
    }
}

fn get_account(conn: &Connection, account_id: &str) -> Result<Option<Account>> {
    let sql = format!("{ACCOUNT_SELECT_SQL} WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![account_id], row_to_account)
        .optional()?)
}

fn find_patient(conn: &Connection, patient_id: &str) -> Result<Option<Patient>> {
    let sql = format!("{PATIENT_SELECT_SQL} WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![patient_id], row_to_patient)
        .optional()?)
}

/// Load a patient and check it belongs to `tenant_id`.
///
/// Shared with other crates that validate a patient inside their own
/// transaction on the same connection.
pub fn patient_for_tenant(conn: &Connection, tenant_id: &str, patient_id: &str) -> Result<Patient> {
    let patient = find_patient(conn, patient_id)?
        .ok_or_else(|| AccountError::PatientNotFound(patient_id.to_string()))?;
    if patient.account_id != tenant_id {
        return Err(AccountError::Unauthorized {
            tenant_id: tenant_id.to_string(),
            patient_id: patient_id.to_string(),
        });
    }
    Ok(patient)
}
