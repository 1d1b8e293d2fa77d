use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Clone, Debug)]
pub struct IdempotencyConfig {
    pub ttl_seconds: i64,
    pub max_total: usize,
    pub max_per_client: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { ttl_seconds: 86_400, max_total: 100_000, max_per_client: 1_000 }
    }
}

/// A cached response keyed by (client_id, idempotency key). `id` is a
/// monotonically increasing store-local sequence, used only to break ties
/// between entries created in the same instant during eviction.
#[derive(Clone, Debug)]
pub struct IdempotencyEntry {
    pub id: u64,
    pub client_id: String,
    pub key: String,
    pub status_code: u16,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedResponse {
    pub status_code: u16,
    pub payload: Value,
}
