//! Shared fixtures for the in-crate tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use healthlink_accounts::AccountDirectory;
use healthlink_core::checkin::{Schedule, ScheduleType};
use healthlink_core::config::RateLimitConfig;
use healthlink_core::tenant::AccountType;
use healthlink_core::time;
use rusqlite::{params, Connection};

use crate::rate_limit::RateLimiter;
use crate::recorder::ExecutionRecorder;
use crate::store::ScheduleStore;
use crate::types::NewSchedule;

pub(crate) fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// 2026-03-10 is a Tuesday.
pub(crate) fn tuesday(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
}

/// Open every schema the scheduler touches on one connection.
pub(crate) fn open_db(conn: Connection) -> Arc<Mutex<Connection>> {
    healthlink_accounts::db::init_db(&conn).unwrap();
    healthlink_memory::db::init_db(&conn).unwrap();
    crate::db::init_db(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

pub(crate) struct Fixture {
    pub db: Arc<Mutex<Connection>>,
    pub store: ScheduleStore,
    pub directory: AccountDirectory,
    /// Managed tenant.
    pub tenant: String,
    /// Active patient of `tenant`, number 5511999999999.
    pub patient: String,
}

pub(crate) fn fixture() -> Fixture {
    fixture_on(Connection::open_in_memory().unwrap())
}

pub(crate) fn fixture_on(conn: Connection) -> Fixture {
    let db = open_db(conn);
    let directory = AccountDirectory::new(db.clone());
    let tenant = directory
        .create_account("Clinica Sol", AccountType::Managed, Some("Voce e a enfermeira da Clinica Sol."))
        .unwrap()
        .id;
    let patient = directory.add_patient(&tenant, "Ana", "5511999999999").unwrap().id;
    Fixture {
        store: ScheduleStore::new(db.clone()),
        db,
        directory,
        tenant,
        patient,
    }
}

impl Fixture {
    /// A second, individual tenant with no patients.
    pub fn other_tenant(&self) -> String {
        self.directory
            .create_account("Joao", AccountType::Individual, None)
            .unwrap()
            .id
    }

    /// DAILY schedule for the fixture patient, created at `created`.
    pub fn daily_at(&self, time_of_day: NaiveTime, created: DateTime<Utc>) -> Schedule {
        self.store
            .create(&self.tenant, NewSchedule::new(&self.patient, ScheduleType::Daily, time_of_day), created)
            .unwrap()
    }

    pub fn force_next(&self, schedule_id: &str, next: DateTime<Utc>) {
        self.db
            .lock()
            .unwrap()
            .execute(
                "UPDATE checkin_schedules SET next_execution_at = ?2 WHERE id = ?1",
                params![schedule_id, time::to_db(next)],
            )
            .unwrap();
    }

    pub fn set_counter(&self, schedule_id: &str, sent: u32, last_reset: NaiveDate) {
        self.db
            .lock()
            .unwrap()
            .execute(
                "UPDATE checkin_schedules SET messages_sent_today = ?2, last_reset_date = ?3 WHERE id = ?1",
                params![schedule_id, sent, time::date_to_db(last_reset)],
            )
            .unwrap();
    }

    pub fn record_successes(&self, schedule: &Schedule, n: usize, at: DateTime<Utc>) {
        let recorder = self.recorder();
        for i in 0..n {
            recorder
                .record_success(schedule, "Oi", &format!("WA-{i}"), 1, at)
                .unwrap();
        }
    }

    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::new(self.db.clone(), RateLimitConfig::default())
    }

    pub fn recorder(&self) -> ExecutionRecorder {
        ExecutionRecorder::new(self.db.clone())
    }
}
