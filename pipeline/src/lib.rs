//! Orchestrates a single order's journey: idempotency short-circuit, risk
//! checks, funds reservation, matching, settlement, event enqueueing, and
//! market-data fan-out.
//!
//! Settlement's limit-price-improvement refund lives here deliberately, not
//! in `OrderBook` (which stays ownership-agnostic) or `Ledger` (which stays
//! trade-agnostic) — only the pipeline knows both a trade's execution price
//! and the taker's original limit price.

pub mod error;
pub mod types;

pub use error::PipelineError;
pub use types::{
    BalanceUpdatedEvent, OrderAcceptedEvent, OrderMatchedEvent, OrderOwner, OrderResponse,
    OrderStatus, PlaceOrderRequest, TradeSettledEvent, TradeView,
};

use chrono::Utc;
use dashmap::DashMap;
use fanout::MarketFanout;
use idempotency::IdempotencyStore;
use ledger::{AccountId, Ledger};
use orderbook::{Order, OrderBook, OrderId, OrderType, Side, Trade};
use outbox::{EventTypeRegistry, Outbox};
use risk::{RiskContext, RiskGate};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

const QUOTE_ASSET: &str = "QUOTE";
const BASE_ASSET: &str = "BASE";

/// Builds the outbox decoder registry for every event type this pipeline
/// enqueues. `OutboxPublisher` rejects any tag not registered here as a
/// terminal failure, so this list must stay in sync with every
/// `self.outbox.enqueue(...)` call site below.
pub fn event_type_registry() -> EventTypeRegistry {
    EventTypeRegistry::new()
        .register::<OrderAcceptedEvent>("OrderAccepted")
        .register::<OrderMatchedEvent>("OrderMatched")
        .register::<TradeSettledEvent>("TradeSettled")
        .register::<BalanceUpdatedEvent>("BalanceUpdated")
}

/// Splits a "BASE-QUOTE" symbol, e.g. "BTC-USD" -> ("BTC", "USD"). Falls
/// back to fixed placeholder assets if the symbol carries no separator, so
/// demo symbols without a real asset pair still settle consistently.
fn split_symbol(symbol: &str) -> (String, String) {
    match symbol.split_once('-') {
        Some((base, quote)) => (base.to_string(), quote.to_string()),
        None => (BASE_ASSET.to_string(), QUOTE_ASSET.to_string()),
    }
}

pub struct OrderPipeline {
    books: DashMap<String, Mutex<OrderBook>>,
    owners: DashMap<OrderId, OrderOwner>,
    ledger: Arc<Ledger>,
    risk: Arc<RiskGate>,
    idempotency: Arc<IdempotencyStore>,
    outbox: Arc<Outbox>,
    fanout: Arc<MarketFanout>,
}

impl OrderPipeline {
    pub fn new(
        symbols: impl IntoIterator<Item = impl Into<String>>,
        ledger: Arc<Ledger>,
        risk: Arc<RiskGate>,
        idempotency: Arc<IdempotencyStore>,
        outbox: Arc<Outbox>,
        fanout: Arc<MarketFanout>,
    ) -> Self {
        let books = DashMap::new();
        for symbol in symbols {
            let symbol = symbol.into();
            books.insert(symbol.clone(), Mutex::new(OrderBook::new(symbol)));
        }
        Self { books, owners: DashMap::new(), ledger, risk, idempotency, outbox, fanout }
    }

    pub fn deposit(&self, client_id: &str, asset: &str, amount: Decimal) -> Result<(), PipelineError> {
        self.ledger.deposit(&AccountId::new(client_id), asset, amount).map_err(PipelineError::from)
    }

    pub fn balances(&self, client_id: &str) -> std::collections::HashMap<String, ledger::Balance> {
        self.ledger.balances(&AccountId::new(client_id))
    }

    pub fn orderbook_snapshot(&self, symbol: &str, depth: usize) -> Option<orderbook::OrderBookSnapshot> {
        let book = self.books.get(symbol)?;
        let guard = book.lock().expect("orderbook mutex poisoned");
        Some(guard.snapshot(depth))
    }

    /// Checks the idempotency cache directly, for transport layers that
    /// need to short-circuit before a `PlaceOrderRequest` can even be built
    /// (e.g. a request body that fails to parse).
    pub fn idempotency_lookup(&self, client_id: &str, key: &str, now: chrono::DateTime<Utc>) -> Option<idempotency::CachedResponse> {
        self.idempotency.try_get(client_id, key, now)
    }

    /// Caches a transport-level error response under the same
    /// (client_id, key) namespace `place_order` itself uses, for errors
    /// raised before a `PlaceOrderRequest` could be built.
    pub fn idempotency_store_error(
        &self,
        client_id: &str,
        key: &str,
        status_code: u16,
        payload: serde_json::Value,
        now: chrono::DateTime<Utc>,
    ) {
        self.idempotency.store(client_id, key, status_code, payload, now);
    }

    pub fn place_order(&self, req: PlaceOrderRequest) -> Result<OrderResponse, PipelineError> {
        let now = Utc::now();

        if let Some(cached) = self.idempotency.try_get(&req.client_id, &req.idempotency_key, now) {
            return Ok(serde_json::from_value(cached.payload).expect("cached idempotency payload is always a valid OrderResponse"));
        }

        match self.try_place_order(&req, now) {
            Ok(response) => {
                let payload = serde_json::to_value(&response).expect("OrderResponse always serializes");
                self.idempotency.store(&req.client_id, &req.idempotency_key, 200, payload, now);
                Ok(response)
            }
            Err(err) => {
                let payload = serde_json::json!({ "errors": err.messages() });
                self.idempotency.store(&req.client_id, &req.idempotency_key, 400, payload, now);
                Err(err)
            }
        }
    }

    fn try_place_order(&self, req: &PlaceOrderRequest, now: chrono::DateTime<Utc>) -> Result<OrderResponse, PipelineError> {
        if matches!((req.side, req.order_type), (Side::Buy, OrderType::Market)) {
            return Err(PipelineError::MarketBuyUnsupported);
        }

        let book_entry = self.books.get(&req.symbol).ok_or_else(|| PipelineError::UnknownSymbol(req.symbol.clone()))?;

        let order = Order::new(req.symbol.clone(), req.side, req.order_type, req.quantity, req.price, now)?;

        let risk_ctx = RiskContext {
            client_id: req.client_id.clone(),
            symbol: req.symbol.clone(),
            side: req.side,
            order_type: req.order_type,
            quantity: req.quantity,
            price: req.price,
        };
        let violations = self.risk.validate(&risk_ctx, now);
        if !violations.is_empty() {
            return Err(PipelineError::RiskRejected(violations));
        }

        let (base, quote) = split_symbol(&req.symbol);
        let account = AccountId::new(&req.client_id);
        let (reserve_asset, reserve_amount) = match req.side {
            Side::Buy => (quote.clone(), req.price.expect("Limit buy always carries a price") * req.quantity),
            Side::Sell => (base.clone(), req.quantity),
        };
        self.ledger.reserve(&account, &reserve_asset, reserve_amount)?;

        self.owners.insert(
            order.id,
            OrderOwner {
                account_id: req.client_id.clone(),
                symbol: req.symbol.clone(),
                side: req.side,
                order_type: req.order_type,
                limit_price: req.price,
            },
        );

        let match_result = {
            let mut book = book_entry.lock().expect("orderbook mutex poisoned");
            book.add_order(order)
        };
        // Release the book's shard guard now: later calls in this function
        // re-enter `self.books.get(...)` for the post-match snapshot, and
        // the underlying map lock isn't reentrant on the same thread.
        drop(book_entry);
        let order_id = match_result.order.id;
        let remaining = match_result.order.remaining_quantity;
        let original = match_result.order.original_quantity;
        let trade_count = match_result.trades.len();

        self.outbox.enqueue(
            "OrderAccepted",
            serde_json::to_value(OrderAcceptedEvent {
                order_id: order_id.to_string(),
                client_id: req.client_id.clone(),
                symbol: req.symbol.clone(),
                side: req.side,
                order_type: req.order_type,
                quantity: req.quantity,
                price: req.price,
            })
            .expect("event always serializes"),
            now,
        );

        let mut trade_views = Vec::with_capacity(match_result.trades.len());
        for trade in &match_result.trades {
            self.settle_trade(trade, now);
            trade_views.push(TradeView {
                id: trade.id.to_string(),
                price: trade.price,
                quantity: trade.quantity,
                maker_order_id: trade.maker_order_id.to_string(),
                taker_order_id: trade.taker_order_id.to_string(),
                executed_at_utc: trade.executed_at,
            });
        }

        if !match_result.trades.is_empty() {
            self.risk.update_last_trade_price(&req.symbol, match_result.trades.last().expect("non-empty").price);
            self.fanout.broadcast_trades(&req.symbol, match_result.trades.clone());
        }

        // Market orders never rest; any remainder left unmatched releases
        // its up-front reservation rather than sitting reserved forever.
        if matches!(req.order_type, OrderType::Market) && remaining > Decimal::ZERO {
            if let Err(err) = self.ledger.release(&account, &reserve_asset, remaining) {
                error!(order_id = %order_id, error = %err, "failed to release unfilled market order reservation");
            }
        }

        if let Some(snapshot) = self.orderbook_snapshot(&req.symbol, 25) {
            self.fanout.broadcast_orderbook(&req.symbol, snapshot);
        }

        if remaining == Decimal::ZERO {
            self.owners.remove(&order_id);
        }

        info!(order_id = %order_id, symbol = %req.symbol, trades = trade_count, "order accepted");

        Ok(OrderResponse {
            order_id: order_id.to_string(),
            status: OrderStatus::resolve(original, remaining, trade_count),
            remaining_quantity: remaining,
            trades: trade_views,
        })
    }

    /// Settles one trade: release+debit+credit on both sides, plus the
    /// buyer's limit-price-improvement refund when applicable.
    fn settle_trade(&self, trade: &Trade, now: chrono::DateTime<Utc>) {
        let Some(maker_owner) = self.owners.get(&trade.maker_order_id).map(|o| o.clone()) else {
            error!(trade_id = %trade.id, order_id = %trade.maker_order_id, "missing OrderOwner for maker at settlement");
            return;
        };
        let Some(taker_owner) = self.owners.get(&trade.taker_order_id).map(|o| o.clone()) else {
            error!(trade_id = %trade.id, order_id = %trade.taker_order_id, "missing OrderOwner for taker at settlement");
            return;
        };

        let (buyer, seller) = match taker_owner.side {
            Side::Buy => (&taker_owner, &maker_owner),
            Side::Sell => (&maker_owner, &taker_owner),
        };

        let (base, quote) = split_symbol(&trade.symbol);
        let notional = trade.price * trade.quantity;
        let buyer_account = AccountId::new(&buyer.account_id);
        let seller_account = AccountId::new(&seller.account_id);

        if let Err(err) = self.settle_buyer(&buyer_account, &quote, &base, notional, trade.quantity, buyer.limit_price, trade.price) {
            error!(trade_id = %trade.id, error = %err, "buyer settlement failed");
        }
        if let Err(err) = self.settle_seller(&seller_account, &base, &quote, trade.quantity, notional) {
            error!(trade_id = %trade.id, error = %err, "seller settlement failed");
        }

        self.outbox.enqueue(
            "OrderMatched",
            serde_json::to_value(OrderMatchedEvent {
                trade_id: trade.id.to_string(),
                order_id: trade.taker_order_id.to_string(),
                symbol: trade.symbol.clone(),
                price: trade.price,
                quantity: trade.quantity,
            })
            .expect("event always serializes"),
            now,
        );
        self.outbox.enqueue(
            "TradeSettled",
            serde_json::to_value(TradeSettledEvent {
                trade_id: trade.id.to_string(),
                symbol: trade.symbol.clone(),
                buyer_account_id: buyer.account_id.clone(),
                seller_account_id: seller.account_id.clone(),
                price: trade.price,
                quantity: trade.quantity,
            })
            .expect("event always serializes"),
            now,
        );

        for (account_id, account, asset) in [
            (buyer.account_id.clone(), &buyer_account, quote.as_str()),
            (buyer.account_id.clone(), &buyer_account, base.as_str()),
            (seller.account_id.clone(), &seller_account, base.as_str()),
            (seller.account_id.clone(), &seller_account, quote.as_str()),
        ] {
            let balance = self.ledger.balance(account, asset);
            self.outbox.enqueue(
                "BalanceUpdated",
                serde_json::to_value(BalanceUpdatedEvent {
                    account_id,
                    asset: asset.to_string(),
                    available: balance.available,
                    reserved: balance.reserved,
                })
                .expect("event always serializes"),
                now,
            );
        }
    }

    fn settle_buyer(
        &self,
        buyer: &AccountId,
        quote: &str,
        base: &str,
        notional: Decimal,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        trade_price: Decimal,
    ) -> Result<(), ledger::LedgerError> {
        self.ledger.release(buyer, quote, notional)?;
        self.ledger.debit(buyer, quote, notional)?;
        self.ledger.credit(buyer, base, quantity)?;

        if let Some(limit_price) = limit_price {
            if limit_price > trade_price {
                let refund = (limit_price - trade_price) * quantity;
                self.ledger.release(buyer, quote, refund)?;
            }
        }
        Ok(())
    }

    fn settle_seller(
        &self,
        seller: &AccountId,
        base: &str,
        quote: &str,
        quantity: Decimal,
        notional: Decimal,
    ) -> Result<(), ledger::LedgerError> {
        self.ledger.release(seller, base, quantity)?;
        self.ledger.debit(seller, base, quantity)?;
        self.ledger.credit(seller, quote, notional)?;
        Ok(())
    }

    /// Cancels a resting order, releasing whatever reservation remains for
    /// its unfilled quantity. No-op (returns `false`) if the order isn't
    /// resting under this symbol.
    pub fn cancel_order(&self, symbol: &str, order_id: OrderId) -> bool {
        let Some(book_entry) = self.books.get(symbol) else { return false };
        let cancelled = {
            let mut book = book_entry.lock().expect("orderbook mutex poisoned");
            book.cancel_order(order_id)
        };
        drop(book_entry);
        let Some(order) = cancelled else { return false };

        if let Some(owner) = self.owners.get(&order_id).map(|o| o.clone()) {
            let (base, quote) = split_symbol(symbol);
            let account = AccountId::new(&owner.account_id);
            let result = match owner.side {
                Side::Sell => self.ledger.release(&account, &base, order.remaining_quantity),
                Side::Buy => {
                    let limit_price = owner.limit_price.unwrap_or(order.price.unwrap_or(Decimal::ZERO));
                    self.ledger.release(&account, &quote, limit_price * order.remaining_quantity)
                }
            };
            if let Err(err) = result {
                error!(order_id = %order_id, error = %err, "failed to release reservation on cancel");
            }
            self.owners.remove(&order_id);
        }

        if let Some(snapshot) = self.orderbook_snapshot(symbol, 25) {
            self.fanout.broadcast_orderbook(symbol, snapshot);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use risk::RiskConfig;
    use std::sync::Arc;

    fn new_pipeline() -> OrderPipeline {
        OrderPipeline::new(
            vec!["BTC-USD"],
            Arc::new(Ledger::new()),
            Arc::new(RiskGate::new(RiskConfig::default())),
            Arc::new(IdempotencyStore::new(idempotency::IdempotencyConfig::default())),
            Arc::new(Outbox::new()),
            MarketFanout::new(fanout::FanoutConfig::default()),
        )
    }

    fn limit_order(client_id: &str, key: &str, side: Side, quantity: i64, price: i64) -> PlaceOrderRequest {
        PlaceOrderRequest {
            client_id: client_id.to_string(),
            idempotency_key: key.to_string(),
            symbol: "BTC-USD".to_string(),
            side,
            order_type: OrderType::Limit,
            quantity: Decimal::from(quantity),
            price: Some(Decimal::from(price)),
        }
    }

    #[test]
    fn simple_cross_fills_both_sides_and_settles() {
        let pipeline = new_pipeline();
        pipeline.deposit("seller", "BTC", Decimal::ONE).unwrap();
        pipeline.deposit("buyer", "USD", Decimal::from(100)).unwrap();

        pipeline.place_order(limit_order("seller", "k1", Side::Sell, 1, 100)).unwrap();
        let response = pipeline.place_order(limit_order("buyer", "k2", Side::Buy, 1, 100)).unwrap();

        assert_eq!(response.status, OrderStatus::Filled);
        assert_eq!(response.trades.len(), 1);
        assert_eq!(response.trades[0].price, Decimal::from(100));

        let seller_balances = pipeline.balances("seller");
        assert_eq!(seller_balances["BTC"].available, Decimal::ZERO);
        assert_eq!(seller_balances["USD"].available, Decimal::from(100));

        let buyer_balances = pipeline.balances("buyer");
        assert_eq!(buyer_balances["BTC"].available, Decimal::ONE);
        assert_eq!(buyer_balances["USD"].available, Decimal::ZERO);
    }

    #[test]
    fn time_priority_at_same_price_fills_fifo() {
        let pipeline = new_pipeline();
        pipeline.deposit("seller1", "BTC", Decimal::ONE).unwrap();
        pipeline.deposit("seller2", "BTC", Decimal::ONE).unwrap();
        pipeline.deposit("buyer", "USD", Decimal::from(200)).unwrap();

        pipeline.place_order(limit_order("seller1", "s1", Side::Sell, 1, 100)).unwrap();
        pipeline.place_order(limit_order("seller2", "s2", Side::Sell, 1, 100)).unwrap();
        let response = pipeline.place_order(limit_order("buyer", "b1", Side::Buy, 2, 100)).unwrap();

        assert_eq!(response.trades.len(), 2);
        assert_eq!(pipeline.balances("seller1")["USD"].available, Decimal::from(100));
        assert_eq!(pipeline.balances("seller2")["USD"].available, Decimal::from(100));
    }

    #[test]
    fn crosses_multiple_price_levels_best_first() {
        let pipeline = new_pipeline();
        pipeline.deposit("seller1", "BTC", Decimal::ONE).unwrap();
        pipeline.deposit("seller2", "BTC", Decimal::ONE).unwrap();
        pipeline.deposit("buyer", "USD", Decimal::from(300)).unwrap();

        pipeline.place_order(limit_order("seller1", "s1", Side::Sell, 1, 99)).unwrap();
        pipeline.place_order(limit_order("seller2", "s2", Side::Sell, 1, 101)).unwrap();
        let response = pipeline.place_order(limit_order("buyer", "b1", Side::Buy, 2, 101)).unwrap();

        assert_eq!(response.trades[0].price, Decimal::from(99));
        assert_eq!(response.trades[1].price, Decimal::from(101));
    }

    #[test]
    fn limit_buy_price_improvement_refunds_excess_reservation() {
        let pipeline = new_pipeline();
        pipeline.deposit("seller", "BTC", Decimal::ONE).unwrap();
        pipeline.deposit("buyer", "USD", Decimal::from(200)).unwrap();

        pipeline.place_order(limit_order("seller", "s1", Side::Sell, 1, 100)).unwrap();
        pipeline.place_order(limit_order("buyer", "b1", Side::Buy, 1, 150)).unwrap();

        // Deposited 200, reserved 150 at ingress (limit price), but only
        // the trade price (100) is actually spent once settlement refunds
        // the price-improvement excess.
        let buyer_balances = pipeline.balances("buyer");
        assert_eq!(buyer_balances["USD"].available, Decimal::from(100));
        assert_eq!(buyer_balances["USD"].reserved, Decimal::ZERO);

        let seller_balances = pipeline.balances("seller");
        assert_eq!(seller_balances["USD"].available, Decimal::from(100));
    }

    #[test]
    fn market_buy_is_rejected_with_no_state_change() {
        let pipeline = new_pipeline();
        pipeline.deposit("buyer", "USD", Decimal::from(100)).unwrap();

        let req = PlaceOrderRequest {
            client_id: "buyer".to_string(),
            idempotency_key: "mb1".to_string(),
            symbol: "BTC-USD".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: Decimal::ONE,
            price: None,
        };
        let err = pipeline.place_order(req).unwrap_err();
        assert!(matches!(err, PipelineError::MarketBuyUnsupported));
        assert_eq!(pipeline.balances("buyer")["USD"].available, Decimal::from(100));
    }

    #[test]
    fn idempotent_replay_returns_identical_response_without_rematching() {
        let pipeline = new_pipeline();
        pipeline.deposit("seller", "BTC", Decimal::ONE).unwrap();
        pipeline.deposit("buyer", "USD", Decimal::from(100)).unwrap();
        pipeline.place_order(limit_order("seller", "s1", Side::Sell, 1, 100)).unwrap();

        let first = pipeline.place_order(limit_order("buyer", "replay-key", Side::Buy, 1, 100)).unwrap();
        let second = pipeline.place_order(limit_order("buyer", "replay-key", Side::Buy, 1, 100)).unwrap();

        assert_eq!(first.order_id, second.order_id);
        assert_eq!(first.trades.len(), second.trades.len());
        assert_eq!(pipeline.balances("buyer")["BTC"].available, Decimal::ONE);
    }

    #[test]
    fn market_sell_partial_fill_releases_unfilled_reservation() {
        let pipeline = new_pipeline();
        pipeline.deposit("seller", "BTC", Decimal::from(5)).unwrap();
        pipeline.deposit("buyer", "USD", Decimal::from(100)).unwrap();
        pipeline.place_order(limit_order("buyer", "b1", Side::Buy, 1, 100)).unwrap();

        let req = PlaceOrderRequest {
            client_id: "seller".to_string(),
            idempotency_key: "ms1".to_string(),
            symbol: "BTC-USD".to_string(),
            side: Side::Sell,
            order_type: OrderType::Market,
            quantity: Decimal::from(5),
            price: None,
        };
        let response = pipeline.place_order(req).unwrap();
        assert_eq!(response.status, OrderStatus::PartiallyFilled);
        assert_eq!(response.remaining_quantity, Decimal::from(4));

        // 1 of 5 BTC traded away, the unfilled 4 releases back to available.
        let seller_balances = pipeline.balances("seller");
        assert_eq!(seller_balances["BTC"].reserved, Decimal::ZERO);
        assert_eq!(seller_balances["BTC"].available, Decimal::from(4));
    }

    #[test]
    fn cancel_releases_remaining_reservation() {
        let pipeline = new_pipeline();
        pipeline.deposit("seller", "BTC", Decimal::ONE).unwrap();
        let response = pipeline.place_order(limit_order("seller", "s1", Side::Sell, 1, 100)).unwrap();
        let order_id = orderbook::OrderId(response.order_id.parse().unwrap());

        assert!(pipeline.cancel_order("BTC-USD", order_id));
        let balances = pipeline.balances("seller");
        assert_eq!(balances["BTC"].available, Decimal::ONE);
        assert_eq!(balances["BTC"].reserved, Decimal::ZERO);
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let pipeline = new_pipeline();
        let req = PlaceOrderRequest {
            client_id: "buyer".to_string(),
            idempotency_key: "u1".to_string(),
            symbol: "ETH-USD".to_string(),
            side: Side::Sell,
            order_type: OrderType::Limit,
            quantity: Decimal::ONE,
            price: Some(Decimal::from(100)),
        };
        let err = pipeline.place_order(req).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownSymbol(_)));
    }
}
