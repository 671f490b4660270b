use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use healthlink_core::time;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, warn};

use crate::error::Result;

/// A held lock. Valid until `lock_until` even if the holder dies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub name: String,
    pub holder: String,
    pub locked_at: DateTime<Utc>,
    pub lock_until: DateTime<Utc>,
    pub at_least: Duration,
}

/// Cluster-wide mutual exclusion for the check-in cycle.
pub trait LockProvider: Send + Sync {
    /// Take the named lock for at most `at_most`, or `None` when another
    /// holder's lease is still live.
    fn try_acquire(
        &self,
        name: &str,
        at_most: Duration,
        at_least: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>>;

    /// Give the lock back, keeping it held until `locked_at + at_least`.
    fn release(&self, lease: &Lease, now: DateTime<Utc>) -> Result<()>;
}

/// Lock rows in a SQLite file shared by every instance.
///
/// Uses a dedicated connection so a lock wait never blocks the store's
/// connection, and `BEGIN IMMEDIATE` so two instances cannot both see the
/// row as free.
pub struct SqliteLockProvider {
    conn: Mutex<Connection>,
    holder: String,
}

impl SqliteLockProvider {
    pub fn new(conn: Connection, holder: impl Into<String>) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scheduler_locks (
                name       TEXT NOT NULL PRIMARY KEY,
                lock_until TEXT NOT NULL,
                locked_at  TEXT NOT NULL,
                locked_by  TEXT NOT NULL
            ) STRICT;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            holder: holder.into(),
        })
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }
}

impl LockProvider for SqliteLockProvider {
    fn try_acquire(
        &self,
        name: &str,
        at_most: Duration,
        at_least: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Lease>> {
        let lease = Lease {
            name: name.to_string(),
            holder: self.holder.clone(),
            locked_at: now,
            lock_until: now + at_most,
            at_least,
        };
        let now_str = time::to_db(now);
        let until_str = time::to_db(lease.lock_until);

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO scheduler_locks (name, lock_until, locked_at, locked_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, until_str, now_str, self.holder],
        )?;
        let taken = if inserted == 1 {
            true
        } else {
            tx.execute(
                "UPDATE scheduler_locks
                 SET lock_until = ?2, locked_at = ?3, locked_by = ?4
                 WHERE name = ?1 AND lock_until <= ?3",
                params![name, until_str, now_str, self.holder],
            )? == 1
        };
        tx.commit()?;

        if taken {
            debug!(lock = name, holder = %self.holder, until = %lease.lock_until, "lock acquired");
            Ok(Some(lease))
        } else {
            debug!(lock = name, holder = %self.holder, "lock held elsewhere");
            Ok(None)
        }
    }

    fn release(&self, lease: &Lease, now: DateTime<Utc>) -> Result<()> {
        let until = std::cmp::max(now, lease.locked_at + lease.at_least);
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE scheduler_locks SET lock_until = ?2
             WHERE name = ?1 AND locked_by = ?3 AND locked_at = ?4",
            params![lease.name, time::to_db(until), lease.holder, time::to_db(lease.locked_at)],
        )?;
        if n == 0 {
            let current: Option<String> = conn
                .query_row(
                    "SELECT locked_by FROM scheduler_locks WHERE name = ?1",
                    params![lease.name],
                    |row| row.get(0),
                )
                .optional()?;
            warn!(
                lock = %lease.name,
                holder = %lease.holder,
                current = current.as_deref().unwrap_or("none"),
                "lease lost before release"
            );
        } else {
            debug!(lock = %lease.name, until = %until, "lock released");
        }
        Ok(())
    }
}
