use orderbook::{OrderType, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Risk limits. A zero value disables the corresponding check, matching the
/// "(if configured >0)" wording in the spec.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_quantity_per_order: Decimal,
    pub price_band_percent: Decimal,
    pub requests_per_minute_per_client: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_quantity_per_order: Decimal::ZERO,
            price_band_percent: Decimal::ZERO,
            requests_per_minute_per_client: 0,
        }
    }
}

/// Everything `RiskGate::validate` needs about one incoming order request.
#[derive(Clone, Debug)]
pub struct RiskContext {
    pub client_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RiskViolation {
    #[error("client id must not be empty")]
    MissingClientId,
    #[error("quantity {quantity} exceeds max order quantity {max}")]
    QuantityExceedsCap { quantity: Decimal, max: Decimal },
    #[error("limit orders require a positive price")]
    MissingLimitPrice,
    #[error("price {price} deviates {deviation_percent}% from last trade {last_trade}, exceeding the {band}% band")]
    PriceBandExceeded { price: Decimal, last_trade: Decimal, deviation_percent: Decimal, band: Decimal },
    #[error("client exceeded {limit} requests/minute")]
    RateLimitExceeded { limit: u32 },
}
