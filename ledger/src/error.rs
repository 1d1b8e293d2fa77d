use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: have {available}, need {requested}")]
    InsufficientBalance { available: Decimal, requested: Decimal },
    #[error("amount must be positive")]
    NonPositiveAmount,
}
