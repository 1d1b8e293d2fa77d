//! Client-scoped idempotency cache: a (client_id, key) -> cached response
//! store with TTL expiry and oldest-first eviction under global and
//! per-client capacity caps.
//!
//! All operations serialize under a single mutex, so `try_get` and `store`
//! are linearizable with respect to one another.

pub mod types;

pub use types::{CachedResponse, IdempotencyConfig, IdempotencyEntry};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

struct Inner {
    entries: HashMap<(String, String), IdempotencyEntry>,
    next_id: u64,
}

pub struct IdempotencyStore {
    config: IdempotencyConfig,
    inner: Mutex<Inner>,
}

impl IdempotencyStore {
    pub fn new(config: IdempotencyConfig) -> Self {
        Self { config, inner: Mutex::new(Inner { entries: HashMap::new(), next_id: 0 }) }
    }

    /// Returns the cached response if present and not expired. An expired
    /// entry is purged as a side effect of looking it up.
    pub fn try_get(&self, client_id: &str, key: &str, now: DateTime<Utc>) -> Option<CachedResponse> {
        let mut inner = self.inner.lock().expect("idempotency store mutex poisoned");
        let map_key = (client_id.to_string(), key.to_string());
        match inner.entries.get(&map_key) {
            Some(entry) if entry.expires_at > now => {
                Some(CachedResponse { status_code: entry.status_code, payload: entry.payload.clone() })
            }
            Some(_) => {
                inner.entries.remove(&map_key);
                None
            }
            None => None,
        }
    }

    /// Inserts a new entry for (client_id, key), then enforces global and
    /// per-client capacity by evicting the oldest entries first.
    pub fn store(&self, client_id: &str, key: &str, status_code: u16, payload: Value, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().expect("idempotency store mutex poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        let expires_at = now + Duration::seconds(self.config.ttl_seconds);
        let entry = IdempotencyEntry {
            id,
            client_id: client_id.to_string(),
            key: key.to_string(),
            status_code,
            payload,
            created_at: now,
            expires_at,
        };
        inner.entries.insert((client_id.to_string(), key.to_string()), entry);

        while inner.entries.len() > self.config.max_total {
            let oldest = oldest_key(inner.entries.values());
            if let Some(k) = oldest {
                inner.entries.remove(&k);
            } else {
                break;
            }
        }

        loop {
            let count = inner.entries.values().filter(|e| e.client_id == client_id).count();
            if count <= self.config.max_per_client {
                break;
            }
            let oldest = oldest_key(inner.entries.values().filter(|e| e.client_id == client_id));
            if let Some(k) = oldest {
                inner.entries.remove(&k);
            } else {
                break;
            }
        }
    }

    /// Evicts every entry past its TTL outright, rather than waiting for a
    /// matching `try_get` to trigger the lazy purge on that one key.
    pub fn purge_expired(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().expect("idempotency store mutex poisoned");
        inner.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("idempotency store mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn oldest_key<'a>(entries: impl Iterator<Item = &'a IdempotencyEntry>) -> Option<(String, String)> {
    entries
        .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
        .map(|e| (e.client_id.clone(), e.key.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg(max_total: usize, max_per_client: usize) -> IdempotencyConfig {
        IdempotencyConfig { ttl_seconds: 3600, max_total, max_per_client }
    }

    #[test]
    fn miss_then_store_then_hit() {
        let store = IdempotencyStore::new(cfg(10, 10));
        let now = Utc::now();
        assert!(store.try_get("c1", "k1", now).is_none());
        store.store("c1", "k1", 200, json!({"ok": true}), now);
        let hit = store.try_get("c1", "k1", now).unwrap();
        assert_eq!(hit.status_code, 200);
        assert_eq!(hit.payload, json!({"ok": true}));
    }

    #[test]
    fn expired_entry_is_purged_on_access() {
        let store = IdempotencyStore::new(cfg(10, 10));
        let now = Utc::now();
        store.store("c1", "k1", 200, json!({}), now);
        let later = now + Duration::seconds(3601);
        assert!(store.try_get("c1", "k1", later).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn distinct_keys_per_client_do_not_collide() {
        let store = IdempotencyStore::new(cfg(10, 10));
        let now = Utc::now();
        store.store("c1", "k1", 200, json!(1), now);
        store.store("c1", "k2", 200, json!(2), now);
        assert_eq!(store.try_get("c1", "k1", now).unwrap().payload, json!(1));
        assert_eq!(store.try_get("c1", "k2", now).unwrap().payload, json!(2));
    }

    #[test]
    fn same_client_id_different_key_namespace_does_not_leak() {
        let store = IdempotencyStore::new(cfg(10, 10));
        let now = Utc::now();
        store.store("c1", "k1", 200, json!(1), now);
        assert!(store.try_get("c2", "k1", now).is_none());
    }

    #[test]
    fn global_capacity_evicts_oldest_first() {
        let store = IdempotencyStore::new(cfg(2, 10));
        let now = Utc::now();
        store.store("c1", "k1", 200, json!(1), now);
        store.store("c1", "k2", 200, json!(2), now + Duration::seconds(1));
        store.store("c1", "k3", 200, json!(3), now + Duration::seconds(2));
        assert_eq!(store.len(), 2);
        assert!(store.try_get("c1", "k1", now + Duration::seconds(2)).is_none());
        assert!(store.try_get("c1", "k3", now + Duration::seconds(2)).is_some());
    }

    #[test]
    fn per_client_capacity_evicts_only_that_clients_oldest() {
        let store = IdempotencyStore::new(cfg(100, 1));
        let now = Utc::now();
        store.store("c1", "k1", 200, json!(1), now);
        store.store("c2", "k1", 200, json!("other"), now);
        store.store("c1", "k2", 200, json!(2), now + Duration::seconds(1));

        assert!(store.try_get("c1", "k1", now + Duration::seconds(1)).is_none());
        assert!(store.try_get("c1", "k2", now + Duration::seconds(1)).is_some());
        assert!(store.try_get("c2", "k1", now + Duration::seconds(1)).is_some());
    }

    #[test]
    fn purge_expired_evicts_without_requiring_access() {
        let store = IdempotencyStore::new(cfg(10, 10));
        let now = Utc::now();
        store.store("c1", "k1", 200, json!({}), now);
        store.store("c1", "k2", 200, json!({}), now);
        store.purge_expired(now + Duration::seconds(3601));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn purge_expired_keeps_unexpired_entries() {
        let store = IdempotencyStore::new(cfg(10, 10));
        let now = Utc::now();
        store.store("c1", "k1", 200, json!({}), now);
        store.purge_expired(now + Duration::seconds(10));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn restore_overwrites_existing_key() {
        let store = IdempotencyStore::new(cfg(10, 10));
        let now = Utc::now();
        store.store("c1", "k1", 200, json!("first"), now);
        store.store("c1", "k1", 201, json!("second"), now);
        let hit = store.try_get("c1", "k1", now).unwrap();
        assert_eq!(hit.status_code, 201);
        assert_eq!(hit.payload, json!("second"));
    }
}
