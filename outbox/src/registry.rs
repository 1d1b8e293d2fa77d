//! Type-tagged event registry: maps an `OutboxRecord`'s `type_name` tag to a
//! decoder that validates its JSON payload before the record is handed to an
//! `EventBus`. A tag with no registered decoder is a terminal failure on
//! dispatch — there is nothing capable of interpreting the payload, so
//! retrying it can never succeed.

use serde::de::DeserializeOwned;
use std::collections::HashMap;

type Decoder = Box<dyn Fn(&serde_json::Value) -> Result<(), String> + Send + Sync>;

#[derive(Default)]
pub struct EventTypeRegistry {
    decoders: HashMap<String, Decoder>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self { decoders: HashMap::new() }
    }

    /// Registers `type_name` as decodable into `T`. Builder-style so callers
    /// can chain registrations for every event type they enqueue at startup.
    pub fn register<T: DeserializeOwned>(mut self, type_name: impl Into<String>) -> Self {
        let decoder: Decoder = Box::new(|payload: &serde_json::Value| {
            serde_json::from_value::<T>(payload.clone()).map(|_| ()).map_err(|e| e.to_string())
        });
        self.decoders.insert(type_name.into(), decoder);
        self
    }

    /// Validates that `payload` decodes as the type registered for
    /// `type_name`. An unregistered tag or an undecodable payload both
    /// return `Err` — neither is retryable.
    pub fn decode(&self, type_name: &str, payload: &serde_json::Value) -> Result<(), String> {
        match self.decoders.get(type_name) {
            Some(decoder) => decoder(payload)
                .map_err(|e| format!("payload does not match registered type for '{type_name}': {e}")),
            None => Err(format!("unknown event type tag: {type_name}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Widget {
        #[allow(dead_code)]
        name: String,
    }

    #[test]
    fn unregistered_tag_is_rejected() {
        let registry = EventTypeRegistry::new();
        assert!(registry.decode("Widget", &json!({"name": "a"})).is_err());
    }

    #[test]
    fn registered_tag_with_matching_payload_decodes() {
        let registry = EventTypeRegistry::new().register::<Widget>("Widget");
        assert!(registry.decode("Widget", &json!({"name": "a"})).is_ok());
    }

    #[test]
    fn registered_tag_with_mismatched_payload_is_rejected() {
        let registry = EventTypeRegistry::new().register::<Widget>("Widget");
        assert!(registry.decode("Widget", &json!({"not_name": 1})).is_err());
    }
}
