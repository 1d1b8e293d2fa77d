//! HTTP/WebSocket wire types. These are a thin camelCase skin over the
//! pipeline's internal snake_case DTOs — the core stays serialization-agnostic.

use orderbook::{OrderType, PriceLevelView, Side};
use pipeline::{OrderResponse, TradeView};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PlaceOrderBody {
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub depth: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeHttpView {
    pub id: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub maker_order_id: String,
    pub taker_order_id: String,
    pub executed_at_utc: chrono::DateTime<chrono::Utc>,
}

impl From<TradeView> for TradeHttpView {
    fn from(trade: TradeView) -> Self {
        Self {
            id: trade.id,
            price: trade.price,
            quantity: trade.quantity,
            maker_order_id: trade.maker_order_id,
            taker_order_id: trade.taker_order_id,
            executed_at_utc: trade.executed_at_utc,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHttpResponse {
    pub order_id: String,
    pub status: pipeline::OrderStatus,
    pub remaining_quantity: Decimal,
    pub trades: Vec<TradeHttpView>,
}

impl From<OrderResponse> for OrderHttpResponse {
    fn from(resp: OrderResponse) -> Self {
        Self {
            order_id: resp.order_id,
            status: resp.status,
            remaining_quantity: resp.remaining_quantity,
            trades: resp.trades.into_iter().map(TradeHttpView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevelHttpView {
    pub price: Decimal,
    pub quantity: Decimal,
    pub order_count: usize,
}

impl From<PriceLevelView> for PriceLevelHttpView {
    fn from(level: PriceLevelView) -> Self {
        Self { price: level.price, quantity: level.quantity, order_count: level.order_count }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderBookHttpResponse {
    pub symbol: String,
    pub bids: Vec<PriceLevelHttpView>,
    pub asks: Vec<PriceLevelHttpView>,
}

impl From<orderbook::OrderBookSnapshot> for OrderBookHttpResponse {
    fn from(snapshot: orderbook::OrderBookSnapshot) -> Self {
        Self {
            symbol: snapshot.symbol,
            bids: snapshot.bids.into_iter().map(PriceLevelHttpView::from).collect(),
            asks: snapshot.asks.into_iter().map(PriceLevelHttpView::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DepositBody {
    pub asset: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BalanceView {
    pub asset: String,
    pub available: Decimal,
    pub reserved: Decimal,
}
