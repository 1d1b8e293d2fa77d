use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("publish confirmation timed out after {0}ms")]
    ConfirmTimeout(u64),
    #[error("event bus transport error: {0}")]
    Transport(String),
}
