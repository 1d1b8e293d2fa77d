//! The `EventBus` abstraction the publisher drives. A real implementation
//! would declare a topic exchange once per channel, publish with
//! publish-confirm enabled and routing-key = event type-name, and pool
//! channels over one long-lived broker connection with reconnect backoff —
//! none of that transport is implemented here; only the contract and two
//! in-process stand-ins are.

use crate::error::EventBusError;
use crate::types::OutboxRecord;
use async_trait::async_trait;
use std::sync::Mutex;

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, record: &OutboxRecord) -> Result<(), EventBusError>;
}

/// Discards every record. Useful where only the leasing/retry machinery is
/// under test.
pub struct NullEventBus;

#[async_trait]
impl EventBus for NullEventBus {
    async fn publish(&self, _record: &OutboxRecord) -> Result<(), EventBusError> {
        Ok(())
    }
}

/// Publishes by appending to an in-memory log, for tests and the demo
/// binary. Never fails.
#[derive(Default)]
pub struct InMemoryEventBus {
    published: Mutex<Vec<OutboxRecord>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<OutboxRecord> {
        self.published.lock().expect("in-memory event bus mutex poisoned").clone()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, record: &OutboxRecord) -> Result<(), EventBusError> {
        self.published.lock().expect("in-memory event bus mutex poisoned").push(record.clone());
        Ok(())
    }
}
