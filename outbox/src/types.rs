use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    InFlight,
    Published,
    Failed,
}

/// A durable record of one domain event awaiting delivery to the event bus.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: RecordId,
    pub type_name: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl OutboxRecord {
    pub fn new(type_name: impl Into<String>, payload: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::new(),
            type_name: type_name.into(),
            payload,
            created_at: now,
            status: OutboxStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            locked_until: None,
            last_error: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OutboxConfig {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    pub lease_ms: i64,
    pub max_parallelism: usize,
    pub base_delay_ms: i64,
    pub max_delay_ms: i64,
    pub max_attempts: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            batch_size: 50,
            lease_ms: 30_000,
            max_parallelism: 8,
            base_delay_ms: 200,
            max_delay_ms: 30_000,
            max_attempts: 8,
        }
    }
}
