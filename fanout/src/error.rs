use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send timed out")]
    Timeout,
    #[error("transport closed or faulted: {0}")]
    Faulted(String),
}
