//! A durable (in-process) outbox: events are enqueued under a single mutex,
//! leased out in batches by `OutboxPublisher`, and retried with exponential
//! backoff until delivered or marked terminally failed.

pub mod bus;
pub mod error;
pub mod registry;
pub mod types;

pub use bus::{EventBus, InMemoryEventBus, NullEventBus};
pub use error::EventBusError;
pub use registry::EventTypeRegistry;
pub use types::{OutboxConfig, OutboxRecord, OutboxStatus, RecordId};

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub struct Outbox {
    records: Mutex<HashMap<RecordId, OutboxRecord>>,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbox {
    pub fn new() -> Self {
        Self { records: Mutex::new(HashMap::new()) }
    }

    pub fn enqueue(&self, type_name: impl Into<String>, payload: serde_json::Value, now: DateTime<Utc>) -> RecordId {
        let record = OutboxRecord::new(type_name, payload, now);
        let id = record.id;
        self.records.lock().expect("outbox mutex poisoned").insert(id, record);
        id
    }

    /// Selects eligible records (not Published/Failed, due, unlocked),
    /// ordered by (created_at, id), takes up to `batch_size`, and leases
    /// them as InFlight.
    pub fn try_lease_batch(&self, now: DateTime<Utc>, batch_size: usize, lease_duration: Duration) -> Vec<OutboxRecord> {
        let mut records = self.records.lock().expect("outbox mutex poisoned");
        let mut eligible: Vec<RecordId> = records
            .values()
            .filter(|r| {
                !matches!(r.status, OutboxStatus::Published | OutboxStatus::Failed)
                    && r.next_attempt_at <= now
                    && r.locked_until.map(|l| l <= now).unwrap_or(true)
            })
            .map(|r| r.id)
            .collect();

        eligible.sort_by(|a, b| {
            let ra = &records[a];
            let rb = &records[b];
            ra.created_at.cmp(&rb.created_at).then(ra.id.0.cmp(&rb.id.0))
        });

        let leased_ids: Vec<RecordId> = eligible.into_iter().take(batch_size).collect();
        let mut leased = Vec::with_capacity(leased_ids.len());
        for id in leased_ids {
            if let Some(record) = records.get_mut(&id) {
                record.status = OutboxStatus::InFlight;
                record.locked_until = Some(now + lease_duration);
                leased.push(record.clone());
            }
        }
        leased
    }

    pub fn mark_published(&self, id: RecordId) {
        let mut records = self.records.lock().expect("outbox mutex poisoned");
        if let Some(record) = records.get_mut(&id) {
            record.status = OutboxStatus::Published;
            record.locked_until = None;
            record.last_error = None;
        }
    }

    pub fn mark_failed_or_reschedule(
        &self,
        id: RecordId,
        error: impl Into<String>,
        next_attempt_at: DateTime<Utc>,
        status: OutboxStatus,
    ) {
        debug_assert!(matches!(status, OutboxStatus::Pending | OutboxStatus::Failed));
        let mut records = self.records.lock().expect("outbox mutex poisoned");
        if let Some(record) = records.get_mut(&id) {
            record.attempts += 1;
            record.status = status;
            record.next_attempt_at = next_attempt_at;
            record.locked_until = None;
            record.last_error = Some(error.into());
        }
    }

    pub fn get(&self, id: RecordId) -> Option<OutboxRecord> {
        self.records.lock().expect("outbox mutex poisoned").get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("outbox mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Computes the backoff delay for the attempt number about to be made.
pub fn backoff_delay(attempts: u32, base_delay: Duration, max_delay: Duration) -> Duration {
    let exponent = attempts.min(20);
    let multiplier = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let millis = (base_delay.num_milliseconds() as u64).saturating_mul(multiplier);
    let capped = millis.min(max_delay.num_milliseconds() as u64);
    Duration::milliseconds(capped as i64)
}

/// Periodically leases batches from an `Outbox` and dispatches them to an
/// `EventBus`, retrying with exponential backoff and giving up after
/// `max_attempts`.
pub struct OutboxPublisher {
    outbox: Arc<Outbox>,
    bus: Arc<dyn EventBus>,
    registry: Arc<EventTypeRegistry>,
    config: OutboxConfig,
}

impl OutboxPublisher {
    pub fn new(
        outbox: Arc<Outbox>,
        bus: Arc<dyn EventBus>,
        registry: Arc<EventTypeRegistry>,
        config: OutboxConfig,
    ) -> Self {
        Self { outbox, bus, registry, config }
    }

    /// Runs one lease+dispatch cycle; returns the number of records leased.
    /// `OutboxPublisher::run` loops this on `poll_interval` until cancelled.
    pub async fn run_once(&self) -> usize {
        let now = Utc::now();
        let batch = self.outbox.try_lease_batch(
            now,
            self.config.batch_size,
            Duration::milliseconds(self.config.lease_ms),
        );
        let leased = batch.len();
        if leased == 0 {
            return 0;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallelism));
        let mut handles = Vec::with_capacity(leased);
        for record in batch {
            let semaphore = semaphore.clone();
            let outbox = self.outbox.clone();
            let bus = self.bus.clone();
            let registry = self.registry.clone();
            let config = self.config.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                dispatch_one(&outbox, bus.as_ref(), registry.as_ref(), &config, record).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        leased
    }

    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(self.config.poll_interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let leased = self.run_once().await;
                    if leased > 0 {
                        debug!(leased, "outbox publisher dispatched batch");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

async fn dispatch_one(
    outbox: &Outbox,
    bus: &dyn EventBus,
    registry: &EventTypeRegistry,
    config: &OutboxConfig,
    record: OutboxRecord,
) {
    if let Err(decode_err) = registry.decode(&record.type_name, &record.payload) {
        warn!(record_id = %record.id, type_name = %record.type_name, error = %decode_err, "outbox record has no registered decoder, marking terminally failed");
        outbox.mark_failed_or_reschedule(record.id, decode_err, Utc::now(), OutboxStatus::Failed);
        return;
    }

    match bus.publish(&record).await {
        Ok(()) => outbox.mark_published(record.id),
        Err(err) => {
            let next_attempt = record.attempts + 1;
            if next_attempt >= config.max_attempts {
                warn!(record_id = %record.id, error = %err, "outbox record exhausted retries");
                outbox.mark_failed_or_reschedule(record.id, err.to_string(), Utc::now(), OutboxStatus::Failed);
            } else {
                let delay = backoff_delay(
                    record.attempts,
                    Duration::milliseconds(config.base_delay_ms),
                    Duration::milliseconds(config.max_delay_ms),
                );
                outbox.mark_failed_or_reschedule(
                    record.id,
                    err.to_string(),
                    Utc::now() + delay,
                    OutboxStatus::Pending,
                );
            }
        }
    }
}
