use orderbook::{OrderBookSnapshot, Trade};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The wire-agnostic message shapes fanned out to subscribers. A real
/// transport serializes one of these to JSON before writing to the socket.
///
/// Externally tagged (`tag`/`content`) rather than internally tagged: serde
/// cannot serialize a newtype variant wrapping a sequence (`Trades(Vec<_>)`)
/// under an internally-tagged representation, so `content` gives every
/// variant's payload its own nested field instead of being spliced into the
/// top level.
///
/// `Snapshot` is the unicast, unrated message sent once on subscribe;
/// `Orderbook` is the periodic, rate-limited broadcast of a fresh book
/// state — distinct tags so a client can tell "your initial snapshot" apart
/// from "a periodic book update" per the subscribe contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FanoutMessage {
    Snapshot(OrderBookSnapshot),
    Orderbook(OrderBookSnapshot),
    Trade(Trade),
    Trades(Vec<Trade>),
    Ping,
}

#[derive(Clone, Debug)]
pub struct FanoutConfig {
    pub batch_window_ms: u64,
    pub max_messages_per_second: u32,
    pub send_timeout_ms: u64,
    pub heartbeat_interval_secs: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: 100,
            max_messages_per_second: 20,
            send_timeout_ms: 1_000,
            heartbeat_interval_secs: 30,
        }
    }
}
