//! Exchange core demo — deposits, crosses two limit orders, prints the
//! resulting balances and order book state without going through HTTP.

use idempotency::IdempotencyStore;
use ledger::Ledger;
use orderbook::{OrderType, Side};
use outbox::{NullEventBus, Outbox, OutboxPublisher};
use pipeline::{event_type_registry, OrderPipeline, PlaceOrderRequest};
use risk::RiskGate;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

fn main() {
    tracing_subscriber::fmt::init();

    let ledger = Arc::new(Ledger::new());
    let risk = Arc::new(RiskGate::new(Default::default()));
    let idempotency = Arc::new(IdempotencyStore::new(Default::default()));
    let outbox = Arc::new(Outbox::new());
    let fanout = fanout::MarketFanout::new(Default::default());
    let _publisher = OutboxPublisher::new(
        outbox.clone(),
        Arc::new(NullEventBus),
        Arc::new(event_type_registry()),
        Default::default(),
    );

    let pipeline = OrderPipeline::new(["BTC-USD"], ledger, risk, idempotency, outbox, fanout);

    println!("=== Exchange Core Demo ===");

    pipeline.deposit("seller", "BTC", Decimal::from(1)).unwrap();
    pipeline.deposit("buyer", "USD", Decimal::from(100)).unwrap();
    println!("Seller deposits 1 BTC, buyer deposits 100 USD.");

    let sell = pipeline
        .place_order(PlaceOrderRequest {
            client_id: "seller".to_string(),
            idempotency_key: "sell-1".to_string(),
            symbol: "BTC-USD".to_string(),
            side: Side::Sell,
            order_type: OrderType::Limit,
            quantity: Decimal::from(1),
            price: Some(Decimal::from_str("100").unwrap()),
        })
        .expect("sell order accepted");
    println!("Seller posts LIMIT SELL 1@100 -> status={:?}", sell.status);

    let buy = pipeline
        .place_order(PlaceOrderRequest {
            client_id: "buyer".to_string(),
            idempotency_key: "buy-1".to_string(),
            symbol: "BTC-USD".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: Decimal::from(1),
            price: Some(Decimal::from_str("100").unwrap()),
        })
        .expect("buy order accepted");
    println!("Buyer posts LIMIT BUY 1@100 -> status={:?}, trades={}", buy.status, buy.trades.len());

    println!("\nFinal balances:");
    for (asset, balance) in pipeline.balances("seller") {
        println!("  seller {asset}: available={} reserved={}", balance.available, balance.reserved);
    }
    for (asset, balance) in pipeline.balances("buyer") {
        println!("  buyer {asset}: available={} reserved={}", balance.available, balance.reserved);
    }

    let book = pipeline.orderbook_snapshot("BTC-USD", 10).unwrap();
    println!("\nBook after match: {} bid levels, {} ask levels", book.bids.len(), book.asks.len());
}
