#![allow(dead_code)]

use async_trait::async_trait;
use booking_engine::notification::NotificationResult;
use booking_engine::storage::StorageResult;
use booking_engine::{
    BookingOrchestrator, BookingStore, Clock, EmailMessage, EngineConfig, InMemoryStore,
    ManualClock, NoopProfileDirectory, NotificationGateway, RunStore, SmsMessage, StorageError,
    WorkflowDeps, WriteOutcome,
};
use booking_types::{
    Booking, BookingStatus, CorrelationKey, DefinitionId, DomainEvent, EventType, RunId,
    RunStatus, WorkflowRun,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

// ── Recording gateway ────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct Sent {
    pub channel: &'static str,
    pub to: String,
    pub template: String,
    pub at: DateTime<Utc>,
}

pub struct RecordingGateway {
    clock: Arc<ManualClock>,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingGateway {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn with_template(&self, template: &str) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.template == template)
            .collect()
    }

    fn record(&self, channel: &'static str, to: &str, template: &str) {
        self.sent.lock().unwrap().push(Sent {
            channel,
            to: to.to_string(),
            template: template.to_string(),
            at: self.clock.now(),
        });
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send_email(&self, message: &EmailMessage) -> NotificationResult<()> {
        self.record("email", &message.to, &message.template);
        Ok(())
    }

    async fn send_sms(&self, message: &SmsMessage) -> NotificationResult<()> {
        self.record("sms", &message.to, &message.template);
        Ok(())
    }
}

// ── Crashing store ───────────────────────────────────────────────────

/// Delegates to an inner store and "crashes" at the n-th run write: that
/// write and every one after it fail without touching the inner store.
pub struct CrashingStore {
    inner: Arc<InMemoryStore>,
    writes_left: AtomicUsize,
    crashed: AtomicBool,
}

impl CrashingStore {
    pub fn new(inner: Arc<InMemoryStore>, crash_at_write: usize) -> Self {
        Self {
            inner,
            writes_left: AtomicUsize::new(crash_at_write),
            crashed: AtomicBool::new(false),
        }
    }

    pub fn crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    fn write(&self) -> StorageResult<()> {
        if self.crashed() {
            return Err(StorageError::Backend("process is down".into()));
        }
        let left = self.writes_left.load(Ordering::SeqCst);
        if left == 0 {
            self.crashed.store(true, Ordering::SeqCst);
            return Err(StorageError::Backend("crash".into()));
        }
        self.writes_left.store(left - 1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl RunStore for CrashingStore {
    async fn insert_run(&self, run: WorkflowRun) -> StorageResult<()> {
        self.inner.insert_run(run).await
    }

    async fn get_run(&self, id: &RunId) -> StorageResult<Option<WorkflowRun>> {
        self.inner.get_run(id).await
    }

    async fn update_run(
        &self,
        run: &WorkflowRun,
        expected: RunStatus,
    ) -> StorageResult<WriteOutcome<RunStatus>> {
        self.write()?;
        self.inner.update_run(run, expected).await
    }

    async fn transition_run(
        &self,
        id: &RunId,
        expected: RunStatus,
        to: RunStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<WriteOutcome<RunStatus>> {
        self.write()?;
        self.inner.transition_run(id, expected, to, at).await
    }

    async fn list_runs_by_status(&self, statuses: &[RunStatus]) -> StorageResult<Vec<WorkflowRun>> {
        self.inner.list_runs_by_status(statuses).await
    }

    async fn list_runs_by_correlation(
        &self,
        key: &CorrelationKey,
    ) -> StorageResult<Vec<WorkflowRun>> {
        self.inner.list_runs_by_correlation(key).await
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<RecordingGateway>,
    pub engine: Arc<BookingOrchestrator>,
}

impl Harness {
    pub fn new(start: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(RecordingGateway::new(clock.clone()));
        let engine = build_engine(store.clone(), store.clone(), gateway.clone(), clock.clone());
        Self {
            clock,
            store,
            gateway,
            engine,
        }
    }

    /// A fresh engine over the same storage, as after a process restart
    pub fn restart(&mut self) {
        self.engine = build_engine(
            self.store.clone(),
            self.store.clone(),
            self.gateway.clone(),
            self.clock.clone(),
        );
    }

    pub async fn seed_booking(&self, id: &str, status: BookingStatus) {
        self.store.put_booking(Booking::new(id, status)).await;
    }

    pub async fn booking_status(&self, id: &str) -> BookingStatus {
        self.store.get_booking(id).await.unwrap().unwrap().status
    }

    /// Move the clock and fire whatever became due
    pub async fn advance_to(&self, t: DateTime<Utc>) {
        self.clock.set(t);
        self.engine.fire_due_timers().await;
    }

    pub async fn run_of(&self, booking_id: &str, definition: &str) -> WorkflowRun {
        self.engine
            .runs_for(&CorrelationKey::new(booking_id))
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.definition_id == DefinitionId::new(definition))
            .unwrap_or_else(|| panic!("no {definition} run for {booking_id}"))
    }
}

pub fn build_engine(
    runs: Arc<dyn RunStore>,
    bookings: Arc<dyn BookingStore>,
    gateway: Arc<RecordingGateway>,
    clock: Arc<ManualClock>,
) -> Arc<BookingOrchestrator> {
    let deps = WorkflowDeps {
        bookings,
        notifications: gateway,
        profiles: Arc::new(NoopProfileDirectory),
    };
    let registry = booking_engine::standard_registry(&deps).unwrap();
    Arc::new(BookingOrchestrator::new(
        registry,
        runs,
        clock,
        &EngineConfig::default(),
    ))
}

// ── Payloads ─────────────────────────────────────────────────────────

fn parties() -> (Value, Value, Value) {
    (
        json!({"id": "biz-1", "name": "Cafe", "email": "cafe@example.com", "phone": "+15550100"}),
        json!({"id": "usr-1", "name": "Ada", "email": "ada@example.com", "phone": "+15550001"}),
        json!({"id": "own-1", "email": "owner@example.com", "phone": "+15550101"}),
    )
}

pub fn created_event(booking_id: &str, slots: &[&str], emitted_at: DateTime<Utc>) -> DomainEvent {
    let (business, user, owner) = parties();
    let payload = json!({
        "booking": {
            "id": booking_id,
            "status": "pending",
            "timeSlots": slots,
            "listing": {"id": "l-1", "title": "Tasting menu", "redeemType": "timeSlot"},
            "business": business,
            "user": user
        },
        "businessUser": owner
    });
    DomainEvent::new(EventType::BookingCreated, payload, emitted_at).unwrap()
}

pub fn booking_event(
    event_type: EventType,
    booking_id: &str,
    confirmed_slot: Option<&str>,
    redeem_type: &str,
    emitted_at: DateTime<Utc>,
) -> DomainEvent {
    let (business, user, owner) = parties();
    let payload = json!({
        "booking": {
            "id": booking_id,
            "confirmedSlot": confirmed_slot,
            "listing": {"id": "l-1", "title": "Tasting menu", "redeemType": redeem_type},
            "business": business,
            "user": user
        },
        "businessUser": owner
    });
    DomainEvent::new(event_type, payload, emitted_at).unwrap()
}

pub fn approved_event(booking_id: &str, slot: &str, emitted_at: DateTime<Utc>) -> DomainEvent {
    booking_event(EventType::BookingApproved, booking_id, Some(slot), "timeSlot", emitted_at)
}

pub fn canceled_event(booking_id: &str, emitted_at: DateTime<Utc>) -> DomainEvent {
    booking_event(EventType::BookingCanceled, booking_id, None, "timeSlot", emitted_at)
}
