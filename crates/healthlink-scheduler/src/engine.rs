use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use healthlink_agent::MessageGenerator;
use healthlink_core::checkin::Schedule;
use healthlink_core::config::{RateLimitConfig, SchedulerConfig};
use healthlink_whatsapp::Dispatcher;
use rusqlite::Connection;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SchedulerError};
use crate::lock::LockProvider;
use crate::rate_limit::RateLimiter;
use crate::recorder::ExecutionRecorder;
use crate::schedule::next_execution;
use crate::store::ScheduleStore;
use crate::types::{CycleReport, CycleStats, RateDecision};

/// Loop timing and lock parameters.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub interval: std::time::Duration,
    pub lock_name: String,
    pub lock_at_most: Duration,
    pub lock_at_least: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            interval: std::time::Duration::from_secs(config.interval_secs),
            lock_name: config.lock_name.clone(),
            lock_at_most: Duration::seconds(config.lock_at_most_secs as i64),
            lock_at_least: Duration::seconds(config.lock_at_least_secs as i64),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

enum Attempt {
    Sent,
    Denied(RateDecision),
}

enum Outcome {
    Sent,
    Skipped,
    Failed,
}

/// Drives proactive check-ins: one cycle per interval, under a cluster-wide
/// lock, evaluating every due schedule in its own tenant scope.
pub struct CheckinEngine {
    store: ScheduleStore,
    limiter: RateLimiter,
    recorder: ExecutionRecorder,
    generator: MessageGenerator,
    dispatcher: Dispatcher,
    lock: Arc<dyn LockProvider>,
    settings: EngineSettings,
}

impl CheckinEngine {
    /// `db` must carry the accounts, memory and scheduler schemas.
    pub fn new(
        db: Arc<Mutex<Connection>>,
        limits: RateLimitConfig,
        generator: MessageGenerator,
        dispatcher: Dispatcher,
        lock: Arc<dyn LockProvider>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store: ScheduleStore::new(db.clone()),
            limiter: RateLimiter::new(db.clone(), limits),
            recorder: ExecutionRecorder::new(db),
            generator,
            dispatcher,
            lock,
            settings,
        }
    }

    /// Main loop. Runs a cycle every interval until `shutdown` broadcasts
    /// `true`. An in-flight cycle always completes before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            lock = %self.settings.lock_name,
            "check-in engine started"
        );
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_cycle(Utc::now()).await {
                        error!("check-in cycle error: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("check-in engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One wake of the loop at `now`.
    ///
    /// Returns [`CycleReport::LockHeld`] without touching any schedule when
    /// another instance holds the lease. Per-schedule errors become FAILED
    /// records; only lock and due-query errors fail the cycle.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let started = Instant::now();
        let Some(lease) = self.lock.try_acquire(
            &self.settings.lock_name,
            self.settings.lock_at_most,
            self.settings.lock_at_least,
            now,
        )?
        else {
            debug!(lock = %self.settings.lock_name, "cycle skipped: lock held elsewhere");
            return Ok(CycleReport::LockHeld);
        };

        let result = self.process_due(now).await;

        let finished = now + Duration::from_std(started.elapsed()).unwrap_or_else(|_| Duration::zero());
        if let Err(e) = self.lock.release(&lease, finished) {
            error!(lock = %lease.name, "lock release failed: {e}");
        }

        let stats = result?;
        info!(
            selected = stats.selected,
            sent = stats.sent,
            failed = stats.failed,
            skipped = stats.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "check-in cycle finished"
        );
        Ok(CycleReport::Ran(stats))
    }

    async fn process_due(&self, now: DateTime<Utc>) -> Result<CycleStats> {
        self.limiter.reset_daily_counters(now.date_naive())?;
        let due = self.store.due_schedules(now)?;

        let mut stats = CycleStats {
            selected: due.len(),
            ..Default::default()
        };
        for schedule in due {
            match self.process_one(schedule, now).await {
                Outcome::Sent => stats.sent += 1,
                Outcome::Skipped => stats.skipped += 1,
                Outcome::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn process_one(&self, mut schedule: Schedule, now: DateTime<Utc>) -> Outcome {
        let started = Instant::now();
        match self.attempt(&mut schedule, now, started).await {
            Ok(Attempt::Sent) => Outcome::Sent,
            Ok(Attempt::Denied(decision)) => {
                let reason = decision.reason();
                info!(
                    schedule_id = %schedule.id,
                    tenant_id = %schedule.tenant_id,
                    %reason,
                    "check-in skipped"
                );
                if let Err(e) = self.recorder.record_skipped(&schedule, &reason, now) {
                    error!(schedule_id = %schedule.id, "failed to record skip: {e}");
                }
                Outcome::Skipped
            }
            Err(e) => {
                let reason = failure_reason(&e);
                error!(
                    schedule_id = %schedule.id,
                    tenant_id = %schedule.tenant_id,
                    %reason,
                    "check-in failed"
                );
                if let Err(e) = self
                    .recorder
                    .record_failure(&schedule, &reason, elapsed_ms(started), now)
                {
                    error!(schedule_id = %schedule.id, "failed to record failure: {e}");
                } else if let Ok(streak) = self.recorder.consecutive_failures(&schedule.id) {
                    if streak > 1 {
                        warn!(schedule_id = %schedule.id, consecutive_failures = streak, "schedule keeps failing");
                    }
                }
                Outcome::Failed
            }
        }
    }

    /// Evaluate one schedule. The tenant context lives only for this call.
    async fn attempt(
        &self,
        schedule: &mut Schedule,
        now: DateTime<Utc>,
        started: Instant,
    ) -> Result<Attempt> {
        let ctx = schedule.tenant_context()?;

        let decision = self.limiter.can_send(schedule, now.date_naive())?;
        if !decision.is_allowed() {
            return Ok(Attempt::Denied(decision));
        }

        let text = self.generator.generate(&ctx, schedule).await?;
        let message_id = self
            .dispatcher
            .send(&schedule.owner.whatsapp_number, &text)
            .await?;

        self.recorder
            .record_success(schedule, &text, &message_id, elapsed_ms(started), now)?;
        let next = next_execution(
            schedule.schedule_type,
            schedule.time_of_day,
            &schedule.days_of_week,
            now,
        );
        self.store.set_next_execution(&schedule.id, next, now)?;

        info!(
            schedule_id = %schedule.id,
            tenant_id = %ctx.tenant_id(),
            %message_id,
            next_execution_at = %next,
            "check-in sent"
        );
        Ok(Attempt::Sent)
    }
}

/// Reason stored on FAILED records.
fn failure_reason(e: &SchedulerError) -> String {
    match e {
        SchedulerError::Tenant(inner) => format!("{}: {inner}", inner.code()),
        other => other.to_string(),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::SqliteLockProvider;
    use crate::testutil::{fixture, fixture_on, hm, tuesday, Fixture};
    use crate::types::NewSchedule;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use healthlink_agent::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
    use healthlink_core::checkin::{ExecutionStatus, ScheduleType};
    use healthlink_core::tenant::AccountType;
    use healthlink_memory::ConversationStore;
    use healthlink_whatsapp::{GatewayError, MessageGateway};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Captures every outbound message; fails while `down` is set.
    #[derive(Default)]
    struct FakeGateway {
        sent: Mutex<Vec<(String, String)>>,
        down: AtomicBool,
    }

    #[async_trait]
    impl MessageGateway for FakeGateway {
        fn name(&self) -> &str {
            "fake"
        }
        async fn send_text(&self, number: &str, text: &str) -> std::result::Result<String, GatewayError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(GatewayError::Rejected {
                    status: 500,
                    body: "instance disconnected".to_string(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((number.to_string(), text.to_string()));
            Ok(format!("WA-{}", sent.len()))
        }
    }

    /// Replies with a fixed text and keeps every request it saw.
    struct RecordingLlm {
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        fn name(&self) -> &str {
            "recording"
        }
        async fn send(&self, req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            self.seen.lock().unwrap().push(req.clone());
            Ok(ChatResponse {
                content: "Bom dia! Como voce esta hoje?".to_string(),
                tokens_in: 10,
                tokens_out: 8,
            })
        }
    }

    struct Harness {
        f: Fixture,
        gateway: Arc<FakeGateway>,
        llm: Arc<RecordingLlm>,
        engine: CheckinEngine,
    }

    fn engine_for(
        f: &Fixture,
        gateway: Arc<FakeGateway>,
        llm: Option<Arc<RecordingLlm>>,
        lock: Arc<dyn LockProvider>,
    ) -> CheckinEngine {
        let history = Arc::new(ConversationStore::new(f.db.clone()));
        let provider = llm.map(|l| l as Arc<dyn LlmProvider>);
        CheckinEngine::new(
            f.db.clone(),
            RateLimitConfig::default(),
            MessageGenerator::new(provider, history),
            Dispatcher::new(gateway, std::time::Duration::from_secs(5)),
            lock,
            EngineSettings::default(),
        )
    }

    fn memory_lock(holder: &str) -> Arc<dyn LockProvider> {
        Arc::new(SqliteLockProvider::new(Connection::open_in_memory().unwrap(), holder).unwrap())
    }

    fn harness() -> Harness {
        let f = fixture();
        let gateway = Arc::new(FakeGateway::default());
        let llm = Arc::new(RecordingLlm {
            seen: Mutex::new(Vec::new()),
        });
        let engine = engine_for(&f, gateway.clone(), Some(llm.clone()), memory_lock("test"));
        Harness {
            f,
            gateway,
            llm,
            engine,
        }
    }

    fn ran(report: CycleReport) -> CycleStats {
        match report {
            CycleReport::Ran(stats) => stats,
            CycleReport::LockHeld => panic!("expected the cycle to run"),
        }
    }

    #[tokio::test]
    async fn due_daily_schedule_is_sent_and_advanced() {
        let h = harness();
        let monday = tuesday(10, 0) - Duration::days(1);
        let s = h.f.daily_at(hm(8, 0), monday);
        assert_eq!(s.next_execution_at, tuesday(8, 0));

        let now = tuesday(8, 0) + Duration::seconds(30);
        let stats = ran(h.engine.run_cycle(now).await.unwrap());
        assert_eq!(
            stats,
            CycleStats {
                selected: 1,
                sent: 1,
                failed: 0,
                skipped: 0
            }
        );

        let sent = h.gateway.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![("5511999999999".to_string(), "Bom dia! Como voce esta hoje?".to_string())]);

        let after = h.f.store.get(&h.f.tenant, &s.id).unwrap();
        assert_eq!(after.next_execution_at, Utc.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap());
        assert_eq!(after.messages_sent_today, 1);
        assert_eq!(after.last_execution_at, Some(now));

        let history = h.f.recorder().list_for_schedule(&h.f.tenant, &s.id, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ExecutionStatus::Success);
        assert_eq!(history[0].message_id.as_deref(), Some("WA-1"));

        // Nothing is due a minute later.
        let stats = ran(h.engine.run_cycle(now + Duration::seconds(60)).await.unwrap());
        assert_eq!(stats.selected, 0);
        assert_eq!(h.gateway.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn overdue_daily_schedule_moves_to_tomorrow() {
        let h = harness();
        let now = tuesday(10, 0);
        let s = h.f.daily_at(hm(8, 0), now - Duration::days(2));
        let yesterday_8 = tuesday(8, 0) - Duration::days(1);
        h.f.force_next(&s.id, yesterday_8);

        let due: Vec<_> = h.f.store.due_schedules(now).unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(due, vec![s.id.clone()]);

        let stats = ran(h.engine.run_cycle(now).await.unwrap());
        assert_eq!(stats.sent, 1);

        let after = h.f.store.get(&h.f.tenant, &s.id).unwrap();
        assert!(after.next_execution_at > yesterday_8);
        assert_eq!(after.next_execution_at, Utc.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap());
        assert_eq!(h.gateway.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_dispatch_keeps_schedule_due() {
        let h = harness();
        let s = h.f.daily_at(hm(8, 0), tuesday(10, 0) - Duration::days(1));
        h.gateway.down.store(true, Ordering::SeqCst);

        let now = tuesday(8, 0) + Duration::seconds(30);
        let stats = ran(h.engine.run_cycle(now).await.unwrap());
        assert_eq!(stats.failed, 1);

        let after = h.f.store.get(&h.f.tenant, &s.id).unwrap();
        assert_eq!(after.next_execution_at, s.next_execution_at);
        assert_eq!(after.messages_sent_today, 0);

        let history = h.f.recorder().list_for_schedule(&h.f.tenant, &s.id, 10).unwrap();
        assert_eq!(history[0].status, ExecutionStatus::Failed);
        assert!(history[0].failure_reason.as_deref().unwrap().contains("instance disconnected"));

        // Re-selected on the next cycle, and sent once the gateway is back.
        let later = now + Duration::seconds(60);
        let stats = ran(h.engine.run_cycle(later).await.unwrap());
        assert_eq!((stats.selected, stats.failed), (1, 1));
        assert_eq!(h.f.recorder().consecutive_failures(&s.id).unwrap(), 2);

        h.gateway.down.store(false, Ordering::SeqCst);
        let stats = ran(h.engine.run_cycle(later + Duration::seconds(60)).await.unwrap());
        assert_eq!(stats.sent, 1);
        assert_eq!(h.f.recorder().consecutive_failures(&s.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn exhausted_patient_quota_is_skipped() {
        let h = harness();
        let s = h.f.daily_at(hm(8, 0), tuesday(10, 0) - Duration::days(1));
        let now = tuesday(8, 0) + Duration::seconds(30);
        h.f.set_counter(&s.id, 3, now.date_naive());

        let stats = ran(h.engine.run_cycle(now).await.unwrap());
        assert_eq!((stats.selected, stats.skipped, stats.sent), (1, 1, 0));
        assert!(h.gateway.sent.lock().unwrap().is_empty());
        assert!(h.llm.seen.lock().unwrap().is_empty());

        let history = h.f.recorder().list_for_schedule(&h.f.tenant, &s.id, 10).unwrap();
        assert_eq!(history[0].status, ExecutionStatus::Skipped);
        assert!(history[0].failure_reason.as_deref().unwrap().starts_with("Rate limit exceeded"));
        assert_eq!(h.f.store.get(&h.f.tenant, &s.id).unwrap().next_execution_at, s.next_execution_at);
    }

    #[tokio::test]
    async fn counters_from_yesterday_do_not_block_today() {
        let h = harness();
        let s = h.f.daily_at(hm(8, 0), tuesday(10, 0) - Duration::days(1));
        let now = tuesday(8, 0) + Duration::seconds(30);
        h.f.set_counter(&s.id, 3, now.date_naive() - Duration::days(1));

        let stats = ran(h.engine.run_cycle(now).await.unwrap());
        assert_eq!(stats.sent, 1);
        let after = h.f.store.get(&h.f.tenant, &s.id).unwrap();
        assert_eq!(after.messages_sent_today, 1);
        assert_eq!(after.last_reset_date, now.date_naive());
    }

    #[tokio::test]
    async fn two_instances_sharing_a_lock_send_once() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("locks.db");
        let f = fixture_on(Connection::open(dir.path().join("data.db")).unwrap());
        let gateway = Arc::new(FakeGateway::default());
        f.daily_at(hm(8, 0), tuesday(10, 0) - Duration::days(1));

        let lock_a: Arc<dyn LockProvider> =
            Arc::new(SqliteLockProvider::new(Connection::open(&lock_path).unwrap(), "a").unwrap());
        let lock_b: Arc<dyn LockProvider> =
            Arc::new(SqliteLockProvider::new(Connection::open(&lock_path).unwrap(), "b").unwrap());
        let llm = Arc::new(RecordingLlm {
            seen: Mutex::new(Vec::new()),
        });
        let a = engine_for(&f, gateway.clone(), Some(llm.clone()), lock_a);
        let b = engine_for(&f, gateway.clone(), Some(llm), lock_b);

        let now = tuesday(8, 0) + Duration::seconds(30);
        let (ra, rb) = tokio::join!(a.run_cycle(now), b.run_cycle(now));
        let reports = [ra.unwrap(), rb.unwrap()];
        assert_eq!(reports.iter().filter(|r| **r == CycleReport::LockHeld).count(), 1);
        assert_eq!(gateway.sent.lock().unwrap().len(), 1);

        // Still inside the minimum hold: the other instance stays out.
        let soon = now + Duration::seconds(5);
        assert_eq!(b.run_cycle(soon).await.unwrap(), CycleReport::LockHeld);
        assert_eq!(gateway.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn each_request_sees_only_its_own_tenant() {
        let h = harness();
        let history = ConversationStore::new(h.f.db.clone());
        let earlier = tuesday(7, 0);
        history
            .save_user_message(&h.f.tenant, &h.f.patient, "dor nivel 7 ontem", Some("in-a"), earlier)
            .unwrap();

        let other = h
            .f
            .directory
            .create_account("Consultorio Lua", AccountType::Managed, Some("Persona do Consultorio Lua."))
            .unwrap()
            .id;
        let bruno = h.f.directory.add_patient(&other, "Bruno", "5521977777777").unwrap().id;
        history
            .save_user_message(&other, &bruno, "dormi muito mal", Some("in-b"), earlier)
            .unwrap();

        let monday = tuesday(10, 0) - Duration::days(1);
        h.f.daily_at(hm(8, 0), monday);
        h.f.store
            .create(&other, NewSchedule::new(&bruno, ScheduleType::Daily, hm(8, 0)), monday)
            .unwrap();

        let stats = ran(h.engine.run_cycle(tuesday(8, 1)).await.unwrap());
        assert_eq!(stats.sent, 2);

        let seen = h.llm.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        let text_of = |req: &ChatRequest| {
            let mut all = req.system.clone();
            for m in &req.messages {
                all.push('\n');
                all.push_str(&m.content);
            }
            all
        };
        let for_a = seen.iter().find(|r| r.system.contains("Ana")).map(text_of).unwrap();
        let for_b = seen.iter().find(|r| r.system.contains("Bruno")).map(text_of).unwrap();

        assert!(for_a.contains("Clinica Sol"));
        assert!(for_a.contains("dor nivel 7"));
        assert!(!for_a.contains("Consultorio Lua"));
        assert!(!for_a.contains("dormi muito mal"));

        assert!(for_b.contains("Consultorio Lua"));
        assert!(for_b.contains("dormi muito mal"));
        assert!(!for_b.contains("Clinica Sol"));
        assert!(!for_b.contains("dor nivel 7"));
        assert!(!for_b.contains("Ana"));

        let mut numbers: Vec<_> = h.gateway.sent.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
        numbers.sort();
        assert_eq!(numbers, vec!["5511999999999".to_string(), "5521977777777".to_string()]);
    }

    #[tokio::test]
    async fn patient_of_another_tenant_is_an_authorization_failure() {
        let h = harness();
        let s = h.f.daily_at(hm(8, 0), tuesday(10, 0) - Duration::days(1));
        let other = h.f.other_tenant();
        h.f.db
            .lock()
            .unwrap()
            .execute(
                "UPDATE checkin_schedules SET tenant_id = ?2 WHERE id = ?1",
                rusqlite::params![s.id, other],
            )
            .unwrap();

        let stats = ran(h.engine.run_cycle(tuesday(8, 1)).await.unwrap());
        assert_eq!((stats.selected, stats.failed), (1, 1));
        assert!(h.gateway.sent.lock().unwrap().is_empty());
        assert!(h.llm.seen.lock().unwrap().is_empty());

        let history = h.f.recorder().list_for_schedule(&other, &s.id, 10).unwrap();
        assert_eq!(history[0].status, ExecutionStatus::Failed);
        assert!(history[0].failure_reason.as_deref().unwrap().starts_with("TENANT_MISMATCH"));
    }

    #[tokio::test]
    async fn fixed_message_needs_no_model() {
        let f = fixture();
        let gateway = Arc::new(FakeGateway::default());
        let engine = engine_for(&f, gateway.clone(), None, memory_lock("test"));
        let monday = tuesday(10, 0) - Duration::days(1);
        f.store
            .create(
                &f.tenant,
                NewSchedule::new(&f.patient, ScheduleType::Daily, hm(8, 0)).with_fixed_message("Lembrete: tome o remedio"),
                monday,
            )
            .unwrap();
        let ai = f.daily_at(hm(8, 0), monday);

        let stats = ran(engine.run_cycle(tuesday(8, 1)).await.unwrap());
        assert_eq!((stats.sent, stats.failed), (1, 1));
        assert_eq!(gateway.sent.lock().unwrap()[0].1, "Lembrete: tome o remedio");

        // AI schedule without a configured model fails and stays due.
        let history = f.recorder().list_for_schedule(&f.tenant, &ai.id, 10).unwrap();
        assert_eq!(history[0].status, ExecutionStatus::Failed);
        assert_eq!(f.store.get(&f.tenant, &ai.id).unwrap().next_execution_at, ai.next_execution_at);
    }

    #[tokio::test]
    async fn weekly_schedule_advances_to_next_listed_day() {
        let h = harness();
        let monday = tuesday(10, 0) - Duration::days(1);
        let s = h
            .f
            .store
            .create(
                &h.f.tenant,
                NewSchedule::new(&h.f.patient, ScheduleType::Weekly, hm(9, 0)).on_days([2, 5]),
                monday,
            )
            .unwrap();
        assert_eq!(s.next_execution_at, tuesday(9, 0));

        ran(h.engine.run_cycle(tuesday(9, 0)).await.unwrap());
        let after = h.f.store.get(&h.f.tenant, &s.id).unwrap();
        // Friday 2026-03-13.
        assert_eq!(after.next_execution_at, Utc.with_ymd_and_hms(2026, 3, 13, 9, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let h = harness();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(h.engine.run(rx));
        tokio::task::yield_now().await;
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("engine should stop")
            .unwrap();
    }
}
