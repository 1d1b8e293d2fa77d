//! Core domain types shared by the matching engine: orders, trades, sides,
//! and the bounded snapshot projection handed to market-data subscribers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, globally-unique order identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, globally-unique trade identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeId(pub Uuid);

impl TradeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side a resting maker must be on to cross against this side's taker.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

/// A resting or in-flight order.
///
/// Invariant: `price.is_some() <=> order_type == Limit`. `remaining_quantity`
/// is monotonically non-increasing and never exceeds `original_quantity`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub original_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new order, enforcing the quantity and limit/price invariants.
    ///
    /// Returns `Err` for caller mistakes that are cheap to catch here rather
    /// than at matching time; callers in the ingress path surface this as a
    /// 400-class validation error.
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, OrderValidationError> {
        if quantity <= Decimal::ZERO {
            return Err(OrderValidationError::NonPositiveQuantity);
        }
        match (order_type, price) {
            (OrderType::Limit, Some(p)) if p > Decimal::ZERO => {}
            (OrderType::Limit, _) => return Err(OrderValidationError::MissingLimitPrice),
            (OrderType::Market, None) => {}
            (OrderType::Market, Some(_)) => return Err(OrderValidationError::MarketOrderHasPrice),
        }
        Ok(Self {
            id: OrderId::new(),
            symbol: symbol.into(),
            side,
            order_type,
            original_quantity: quantity,
            remaining_quantity: quantity,
            price,
            created_at,
        })
    }

    pub fn is_resting_eligible(&self) -> bool {
        matches!(self.order_type, OrderType::Limit)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrderValidationError {
    #[error("quantity must be positive")]
    NonPositiveQuantity,
    #[error("limit orders require a positive price")]
    MissingLimitPrice,
    #[error("market orders must not carry a price")]
    MarketOrderHasPrice,
}

/// A single fill produced by matching. Trade price is always the maker's
/// resting price; quantity never exceeds either side's remaining at match
/// time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub executed_at: DateTime<Utc>,
}

/// One aggregated price level in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevelView {
    pub price: Decimal,
    pub quantity: Decimal,
    pub order_count: usize,
}

/// Bounded, point-in-time projection of an order book.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: String,
    pub bids: Vec<PriceLevelView>,
    pub asks: Vec<PriceLevelView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn limit_order_requires_positive_price() {
        let err = Order::new("BTC-USD", Side::Buy, OrderType::Limit, Decimal::ONE, None, now())
            .unwrap_err();
        assert_eq!(err, OrderValidationError::MissingLimitPrice);
    }

    #[test]
    fn market_order_rejects_price() {
        let err = Order::new(
            "BTC-USD",
            Side::Buy,
            OrderType::Market,
            Decimal::ONE,
            Some(Decimal::ONE),
            now(),
        )
        .unwrap_err();
        assert_eq!(err, OrderValidationError::MarketOrderHasPrice);
    }

    #[test]
    fn nonpositive_quantity_rejected() {
        let err =
            Order::new("BTC-USD", Side::Sell, OrderType::Market, Decimal::ZERO, None, now())
                .unwrap_err();
        assert_eq!(err, OrderValidationError::NonPositiveQuantity);
    }

    #[test]
    fn valid_limit_order_carries_full_remaining() {
        let o = Order::new(
            "BTC-USD",
            Side::Sell,
            OrderType::Limit,
            Decimal::new(15, 1),
            Some(Decimal::new(30000, 0)),
            now(),
        )
        .unwrap();
        assert_eq!(o.remaining_quantity, o.original_quantity);
    }
}
