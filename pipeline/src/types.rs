use chrono::{DateTime, Utc};
use orderbook::{OrderType, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct PlaceOrderRequest {
    pub client_id: String,
    pub idempotency_key: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Filled,
    PartiallyFilled,
    Accepted,
}

impl OrderStatus {
    pub fn resolve(original_quantity: Decimal, remaining_quantity: Decimal, trade_count: usize) -> Self {
        if remaining_quantity == Decimal::ZERO {
            OrderStatus::Filled
        } else if remaining_quantity < original_quantity && trade_count > 0 {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Accepted
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradeView {
    pub id: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub maker_order_id: String,
    pub taker_order_id: String,
    pub executed_at_utc: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub remaining_quantity: Decimal,
    pub trades: Vec<TradeView>,
}

/// What the pipeline knows about an order beyond what `OrderBook` tracks —
/// the matching engine itself never learns who owns an order or at what
/// limit price a taker was willing to transact, only what it needs to match.
#[derive(Clone, Debug)]
pub struct OrderOwner {
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderAcceptedEvent {
    pub order_id: String,
    pub client_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderMatchedEvent {
    pub trade_id: String,
    pub order_id: String,
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradeSettledEvent {
    pub trade_id: String,
    pub symbol: String,
    pub buyer_account_id: String,
    pub seller_account_id: String,
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceUpdatedEvent {
    pub account_id: String,
    pub asset: String,
    pub available: Decimal,
    pub reserved: Decimal,
}
