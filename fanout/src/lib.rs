//! Per-symbol market-data fan-out: batches snapshots and trades on a timer,
//! rate-limits each subscriber's share of the flush, and sends an immediate
//! unconditional snapshot on subscribe.

pub mod error;
pub mod token_bucket;
pub mod types;

pub use error::TransportError;
pub use types::{ConnectionId, FanoutConfig, FanoutMessage};

use async_trait::async_trait;
use dashmap::DashMap;
use orderbook::{OrderBookSnapshot, Trade};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration as StdDuration;
use token_bucket::TokenBucket;
use tracing::warn;

/// The transport (WebSocket connection, test harness, ...) a subscriber is
/// addressed through. `MarketFanout` only ever sees this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &FanoutMessage) -> Result<(), TransportError>;
}

struct Subscriber {
    transport: Arc<dyn Transport>,
    bucket: Mutex<TokenBucket>,
}

#[derive(Default)]
struct PendingBuffer {
    snapshot: Option<OrderBookSnapshot>,
    trades: Vec<Trade>,
}

struct SymbolState {
    subscribers: DashMap<ConnectionId, Subscriber>,
    buffer: Mutex<PendingBuffer>,
    flush_scheduled: AtomicBool,
}

impl SymbolState {
    fn new() -> Self {
        Self { subscribers: DashMap::new(), buffer: Mutex::new(PendingBuffer::default()), flush_scheduled: AtomicBool::new(false) }
    }
}

pub struct MarketFanout {
    config: FanoutConfig,
    symbols: DashMap<String, Arc<SymbolState>>,
    self_weak: Weak<MarketFanout>,
}

impl MarketFanout {
    pub fn new(config: FanoutConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self { config, symbols: DashMap::new(), self_weak: weak.clone() })
    }

    fn symbol_state(&self, symbol: &str) -> Arc<SymbolState> {
        self.symbols.entry(symbol.to_string()).or_insert_with(|| Arc::new(SymbolState::new())).clone()
    }

    pub fn subscribe(&self, symbol: &str, transport: Arc<dyn Transport>) -> ConnectionId {
        let id = ConnectionId::new();
        let state = self.symbol_state(symbol);
        let bucket = TokenBucket::new(self.config.max_messages_per_second, chrono::Utc::now());
        state.subscribers.insert(id, Subscriber { transport, bucket: Mutex::new(bucket) });
        id
    }

    pub fn unsubscribe(&self, symbol: &str, connection_id: ConnectionId) {
        if let Some(state) = self.symbols.get(symbol) {
            state.subscribers.remove(&connection_id);
        }
    }

    /// Unconditional unicast, bypassing the rate limiter — used right after
    /// subscribe so the new connection immediately sees book state.
    pub async fn send_snapshot(&self, symbol: &str, connection_id: ConnectionId, snapshot: OrderBookSnapshot) {
        let Some(state) = self.symbols.get(symbol).map(|s| s.clone()) else { return };
        let Some(subscriber) = state.subscribers.get(&connection_id) else { return };
        let message = FanoutMessage::Snapshot(snapshot);
        if send_with_timeout(subscriber.transport.as_ref(), &message, self.config.send_timeout_ms).await.is_err() {
            drop(subscriber);
            state.subscribers.remove(&connection_id);
        }
    }

    pub fn broadcast_orderbook(&self, symbol: &str, snapshot: OrderBookSnapshot) {
        let state = self.symbol_state(symbol);
        {
            let mut buffer = state.buffer.lock().expect("fanout buffer mutex poisoned");
            buffer.snapshot = Some(snapshot);
        }
        self.arm_timer(symbol.to_string(), state);
    }

    pub fn broadcast_trades(&self, symbol: &str, trades: Vec<Trade>) {
        if trades.is_empty() {
            return;
        }
        let state = self.symbol_state(symbol);
        {
            let mut buffer = state.buffer.lock().expect("fanout buffer mutex poisoned");
            buffer.trades.extend(trades);
        }
        self.arm_timer(symbol.to_string(), state);
    }

    fn arm_timer(&self, symbol: String, state: Arc<SymbolState>) {
        if state.flush_scheduled.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return;
        }
        // Upgrade is expected to always succeed: a timer is only armed while
        // `self` is alive to arm it, and `MarketFanout` is always held
        // behind the `Arc` returned from `new`.
        let Some(this) = self.self_weak.upgrade() else { return };
        let window = self.config.batch_window_ms;
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(window)).await;
            this.flush(&symbol, &state).await;
        });
    }

    async fn flush(&self, symbol: &str, state: &Arc<SymbolState>) {
        let (snapshot, trades) = {
            let mut buffer = state.buffer.lock().expect("fanout buffer mutex poisoned");
            state.flush_scheduled.store(false, Ordering::SeqCst);
            (buffer.snapshot.take(), std::mem::take(&mut buffer.trades))
        };

        if snapshot.is_none() && trades.is_empty() {
            return;
        }

        let trade_message = match trades.len() {
            0 => None,
            1 => Some(FanoutMessage::Trade(trades.into_iter().next().expect("len checked"))),
            _ => Some(FanoutMessage::Trades(trades)),
        };

        let mut faulted = Vec::new();
        for entry in state.subscribers.iter() {
            let id = *entry.key();
            let subscriber = entry.value();
            if let Some(snapshot) = &snapshot {
                if !self.send_rate_limited(subscriber, &FanoutMessage::Orderbook(snapshot.clone())).await {
                    faulted.push(id);
                    continue;
                }
            }
            if let Some(trade_message) = &trade_message {
                if !self.send_rate_limited(subscriber, trade_message).await {
                    faulted.push(id);
                }
            }
        }
        for id in faulted {
            state.subscribers.remove(&id);
        }
        let _ = symbol;
    }

    pub async fn send_heartbeat(&self) {
        for entry in self.symbols.iter() {
            let state = entry.value().clone();
            let mut faulted = Vec::new();
            for sub_entry in state.subscribers.iter() {
                let id = *sub_entry.key();
                if !self.send_rate_limited(sub_entry.value(), &FanoutMessage::Ping).await {
                    faulted.push(id);
                }
            }
            for id in faulted {
                state.subscribers.remove(&id);
            }
        }
    }

    pub async fn run_heartbeat(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(StdDuration::from_secs(self.config.heartbeat_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => self.send_heartbeat().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Returns `true` if the subscriber is still good after this attempt —
    /// a dropped-for-rate-limit send still counts as healthy; only a
    /// timeout or transport fault marks the subscriber for removal.
    async fn send_rate_limited(&self, subscriber: &Subscriber, message: &FanoutMessage) -> bool {
        let allowed = {
            let mut bucket = subscriber.bucket.lock().expect("token bucket mutex poisoned");
            bucket.try_consume(chrono::Utc::now())
        };
        if !allowed {
            return true;
        }
        send_with_timeout(subscriber.transport.as_ref(), message, self.config.send_timeout_ms).await.is_ok()
    }

    pub fn subscriber_count(&self, symbol: &str) -> usize {
        self.symbols.get(symbol).map(|s| s.subscribers.len()).unwrap_or(0)
    }
}

async fn send_with_timeout(transport: &dyn Transport, message: &FanoutMessage, timeout_ms: u64) -> Result<(), TransportError> {
    match tokio::time::timeout(StdDuration::from_millis(timeout_ms), transport.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            warn!(error = %err, "market fanout send faulted");
            Err(err)
        }
        Err(_) => {
            warn!("market fanout send timed out");
            Err(TransportError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    struct RecordingTransport {
        received: Mutex<Vec<FanoutMessage>>,
        fail: AtomicBool,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self { received: Mutex::new(Vec::new()), fail: AtomicBool::new(false) })
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, message: &FanoutMessage) -> Result<(), TransportError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::Faulted("boom".to_string()));
            }
            self.received.lock().expect("mutex").push(message.clone());
            Ok(())
        }
    }

    fn snapshot(symbol: &str) -> OrderBookSnapshot {
        OrderBookSnapshot { symbol: symbol.to_string(), bids: vec![], asks: vec![] }
    }

    fn trade(price: i64) -> Trade {
        Trade {
            id: orderbook::TradeId::new(),
            symbol: "BTC-USD".to_string(),
            price: Decimal::from(price),
            quantity: Decimal::ONE,
            maker_order_id: orderbook::OrderId::new(),
            taker_order_id: orderbook::OrderId::new(),
            executed_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribe_then_send_snapshot_bypasses_rate_limit() {
        let fanout = MarketFanout::new(FanoutConfig { max_messages_per_second: 0, ..Default::default() });
        let transport = RecordingTransport::new();
        let id = fanout.subscribe("BTC-USD", transport.clone());
        fanout.send_snapshot("BTC-USD", id, snapshot("BTC-USD")).await;
        assert_eq!(transport.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn flush_coalesces_snapshot_and_batches_trades() {
        let fanout = MarketFanout::new(FanoutConfig { batch_window_ms: 20, ..Default::default() });
        let transport = RecordingTransport::new();
        let id = fanout.subscribe("BTC-USD", transport.clone());
        let state = fanout.symbol_state("BTC-USD");

        fanout.broadcast_orderbook("BTC-USD", snapshot("BTC-USD"));
        fanout.broadcast_orderbook("BTC-USD", snapshot("BTC-USD"));
        fanout.broadcast_trades("BTC-USD", vec![trade(100), trade(101)]);

        fanout.flush("BTC-USD", &state).await;
        let received = transport.received.lock().unwrap().clone();
        assert_eq!(received.len(), 2);
        assert!(matches!(received[0], FanoutMessage::Orderbook(_)));
        match &received[1] {
            FanoutMessage::Trades(trades) => assert_eq!(trades.len(), 2),
            other => panic!("expected Trades batch, got {other:?}"),
        }
        let _ = id;
    }

    #[tokio::test]
    async fn single_trade_flush_sends_singular_trade_message() {
        let fanout = MarketFanout::new(FanoutConfig::default());
        let transport = RecordingTransport::new();
        fanout.subscribe("BTC-USD", transport.clone());
        let state = fanout.symbol_state("BTC-USD");
        fanout.broadcast_trades("BTC-USD", vec![trade(100)]);
        fanout.flush("BTC-USD", &state).await;
        let received = transport.received.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0], FanoutMessage::Trade(_)));
    }

    #[tokio::test]
    async fn faulted_subscriber_is_removed_after_flush() {
        let fanout = MarketFanout::new(FanoutConfig::default());
        let transport = RecordingTransport::new();
        transport.fail.store(true, Ordering::SeqCst);
        let id = fanout.subscribe("BTC-USD", transport.clone());
        let state = fanout.symbol_state("BTC-USD");
        fanout.broadcast_orderbook("BTC-USD", snapshot("BTC-USD"));
        fanout.flush("BTC-USD", &state).await;
        assert_eq!(fanout.subscriber_count("BTC-USD"), 0);
        let _ = id;
    }

    #[tokio::test]
    async fn rate_limited_subscriber_is_not_removed_when_dropped() {
        let fanout = MarketFanout::new(FanoutConfig { max_messages_per_second: 0, ..Default::default() });
        let transport = RecordingTransport::new();
        fanout.subscribe("BTC-USD", transport.clone());
        let state = fanout.symbol_state("BTC-USD");
        fanout.broadcast_orderbook("BTC-USD", snapshot("BTC-USD"));
        fanout.flush("BTC-USD", &state).await;
        assert_eq!(fanout.subscriber_count("BTC-USD"), 1);
        assert!(transport.received.lock().unwrap().is_empty());
    }

    #[test]
    fn multi_trade_flush_message_serializes_to_json() {
        let message = FanoutMessage::Trades(vec![trade(100), trade(101), trade(102)]);
        let json = serde_json::to_string(&message).expect("Trades(Vec<Trade>) must serialize");
        assert!(json.contains("\"type\":\"trades\""));
        let decoded: FanoutMessage = serde_json::from_str(&json).expect("must round-trip");
        match decoded {
            FanoutMessage::Trades(trades) => assert_eq!(trades.len(), 3),
            other => panic!("expected Trades, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_and_orderbook_messages_carry_distinct_tags() {
        let unicast = serde_json::to_string(&FanoutMessage::Snapshot(snapshot("BTC-USD"))).unwrap();
        let broadcast = serde_json::to_string(&FanoutMessage::Orderbook(snapshot("BTC-USD"))).unwrap();
        assert!(unicast.contains("\"type\":\"snapshot\""));
        assert!(broadcast.contains("\"type\":\"orderbook\""));
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_fanout() {
        let fanout = MarketFanout::new(FanoutConfig::default());
        let transport = RecordingTransport::new();
        let id = fanout.subscribe("BTC-USD", transport.clone());
        fanout.unsubscribe("BTC-USD", id);
        assert_eq!(fanout.subscriber_count("BTC-USD"), 0);
    }
}
