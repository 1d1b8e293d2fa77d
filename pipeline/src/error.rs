use ledger::LedgerError;
use orderbook::OrderValidationError;
use risk::RiskViolation;
use thiserror::Error;

/// Every variant here is a 400-class error surfaced to the caller as
/// `{errors: [string, ...]}`. Programmer errors (symbol mismatch into
/// `OrderBook`, a missing `OrderOwner` at settlement) are not represented
/// here — they abort the operation loudly instead, per the spec's error
/// taxonomy.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("market buy orders are not supported")]
    MarketBuyUnsupported,
    #[error("{0}")]
    InvalidOrder(#[from] OrderValidationError),
    #[error("risk check failed: {0:?}")]
    RiskRejected(Vec<RiskViolation>),
    #[error("insufficient balance: {0}")]
    Reservation(#[from] LedgerError),
}

impl PipelineError {
    pub fn messages(&self) -> Vec<String> {
        match self {
            PipelineError::RiskRejected(violations) => violations.iter().map(|v| v.to_string()).collect(),
            other => vec![other.to_string()],
        }
    }
}
