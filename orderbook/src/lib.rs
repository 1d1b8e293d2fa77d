//! Price-time priority limit order book for a single trading symbol.
//!
//! Core features:
//! - Price-time priority matching (best price first, then FIFO within a level)
//! - Partial fills; Limit orders with residual quantity rest, Market orders
//!   never do
//! - Eager, index-assisted cancellation that preserves the order of
//!   untouched resting orders
//! - Exact decimal arithmetic throughout — no floating point

pub mod price_levels;
pub mod types;

pub use price_levels::PriceLevels;
pub use types::{
    Order, OrderBookSnapshot, OrderId, OrderType, OrderValidationError, PriceLevelView, Side,
    Trade, TradeId,
};

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Outcome of submitting an order: any trades produced immediately, plus the
/// order's own final state (its `remaining_quantity` reflects any fills).
/// `order.remaining_quantity > 0 && order.order_type == Limit` means the
/// order is now resting in the book.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchResult {
    pub trades: Vec<Trade>,
    pub order: Order,
}

impl MatchResult {
    pub fn is_resting(&self) -> bool {
        self.order.remaining_quantity > Decimal::ZERO
            && matches!(self.order.order_type, OrderType::Limit)
    }
}

/// A single-symbol central limit order book.
///
/// Not thread-safe by itself — callers hold a per-symbol exclusive lock
/// (see the `pipeline` crate) around every `add_order`/`cancel_order` call so
/// that matching, ledger settlement, and event enqueueing observe the book as
/// one atomic step.
pub struct OrderBook {
    pub symbol: String,
    pub bids: PriceLevels,
    pub asks: PriceLevels,
    /// order id -> (side, price), for O(1) level lookup on cancel.
    index: HashMap<OrderId, (Side, Decimal)>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: PriceLevels::new(Side::Buy),
            asks: PriceLevels::new(Side::Sell),
            index: HashMap::new(),
        }
    }

    /// Matches `taker` against the resting book, then rests any residual
    /// Limit quantity. Symbol mismatch is a programmer error: it panics
    /// rather than returning a user-facing error, per this component's
    /// failure-semantics contract.
    pub fn add_order(&mut self, mut taker: Order) -> MatchResult {
        assert_eq!(
            taker.symbol, self.symbol,
            "OrderBook::add_order called with mismatched symbol (book={}, order={})",
            self.symbol, taker.symbol
        );

        let mut trades = Vec::new();
        let opposite_side = taker.side.opposite();

        loop {
            if taker.remaining_quantity <= Decimal::ZERO {
                break;
            }
            let opposite = match opposite_side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            let Some(best_opposite_price) = opposite.best_price() else {
                break;
            };
            if let (OrderType::Limit, Some(limit_price)) = (taker.order_type, taker.price) {
                let crossable = match taker.side {
                    Side::Buy => best_opposite_price <= limit_price,
                    Side::Sell => best_opposite_price >= limit_price,
                };
                if !crossable {
                    break;
                }
            }

            let mut maker = match opposite.pop_best() {
                Some(o) => o,
                None => break,
            };

            let fill = taker.remaining_quantity.min(maker.remaining_quantity);
            taker.remaining_quantity -= fill;
            maker.remaining_quantity -= fill;

            let trade = Trade {
                id: TradeId::new(),
                symbol: taker.symbol.clone(),
                price: maker.price.expect("resting maker always carries a Limit price"),
                quantity: fill,
                maker_order_id: maker.id,
                taker_order_id: taker.id,
                executed_at: Utc::now(),
            };
            trades.push(trade);

            if maker.remaining_quantity > Decimal::ZERO {
                let maker_id = maker.id;
                let maker_price = maker.price.expect("resting maker always carries a price");
                opposite.push_front(maker);
                self.index.insert(maker_id, (opposite_side, maker_price));
            } else {
                self.index.remove(&maker.id);
            }
        }

        if taker.remaining_quantity > Decimal::ZERO && taker.is_resting_eligible() {
            let id = taker.id;
            let price = taker.price.expect("Limit order carries a price");
            match taker.side {
                Side::Buy => self.bids.push(taker.clone()),
                Side::Sell => self.asks.push(taker.clone()),
            }
            self.index.insert(id, (taker.side, price));
        }

        MatchResult { trades, order: taker }
    }

    /// Removes a resting order by id, preserving the relative order of
    /// everyone else at that price level. No-op if the order isn't resting
    /// (already filled, already cancelled, or never existed).
    pub fn cancel_order(&mut self, id: OrderId) -> Option<Order> {
        let (side, price) = self.index.remove(&id)?;
        match side {
            Side::Buy => self.bids.remove(id, price),
            Side::Sell => self.asks.remove(id, price),
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.best_price()
    }

    /// Bounded projection of both sides, best price first, up to `depth`
    /// levels per side.
    pub fn snapshot(&self, depth: usize) -> OrderBookSnapshot {
        let to_views = |levels: &PriceLevels| {
            levels
                .levels_best_first()
                .take(depth)
                .map(|(price, quantity, order_count)| PriceLevelView { price, quantity, order_count })
                .collect()
        };
        OrderBookSnapshot {
            symbol: self.symbol.clone(),
            bids: to_views(&self.bids),
            asks: to_views(&self.asks),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
