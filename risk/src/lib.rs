//! Pre-trade validation: quantity cap, price band vs. last trade, and a
//! per-client sliding-window request rate limit.
//!
//! Stateless with respect to orders themselves — the only state kept is the
//! last traded price per symbol and each client's recent request timestamps.

pub mod types;

pub use types::{RiskConfig, RiskContext, RiskViolation};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use orderbook::OrderType;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Mutex;

const RATE_WINDOW_SECONDS: i64 = 60;

pub struct RiskGate {
    config: RiskConfig,
    last_trade_price: DashMap<String, Decimal>,
    request_log: DashMap<String, Mutex<VecDeque<DateTime<Utc>>>>,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config, last_trade_price: DashMap::new(), request_log: DashMap::new() }
    }

    /// Collects every violation found; an empty result means the request
    /// passes. Always records this call as one request against the client's
    /// rate window, even when other checks already fail.
    pub fn validate(&self, ctx: &RiskContext, now: DateTime<Utc>) -> Vec<RiskViolation> {
        let mut violations = Vec::new();

        if ctx.client_id.trim().is_empty() {
            violations.push(RiskViolation::MissingClientId);
        }

        if self.config.max_quantity_per_order > Decimal::ZERO
            && ctx.quantity > self.config.max_quantity_per_order
        {
            violations.push(RiskViolation::QuantityExceedsCap {
                quantity: ctx.quantity,
                max: self.config.max_quantity_per_order,
            });
        }

        if matches!(ctx.order_type, OrderType::Limit) {
            match ctx.price {
                Some(p) if p > Decimal::ZERO => {}
                _ => violations.push(RiskViolation::MissingLimitPrice),
            }
        }

        if let (Some(price), true) = (ctx.price, self.config.price_band_percent > Decimal::ZERO) {
            if let Some(last) = self.last_trade_price.get(&ctx.symbol).map(|r| *r) {
                if last > Decimal::ZERO {
                    let deviation_percent = ((price - last).abs() / last) * Decimal::from(100);
                    if deviation_percent > self.config.price_band_percent {
                        violations.push(RiskViolation::PriceBandExceeded {
                            price,
                            last_trade: last,
                            deviation_percent,
                            band: self.config.price_band_percent,
                        });
                    }
                }
            }
        }

        if self.config.requests_per_minute_per_client > 0
            && !self.within_rate_limit(&ctx.client_id, now)
        {
            violations.push(RiskViolation::RateLimitExceeded {
                limit: self.config.requests_per_minute_per_client,
            });
        }

        violations
    }

    fn within_rate_limit(&self, client_id: &str, now: DateTime<Utc>) -> bool {
        let entry = self
            .request_log
            .entry(client_id.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut log = entry.lock().expect("risk gate rate log mutex poisoned");
        let cutoff = now - Duration::seconds(RATE_WINDOW_SECONDS);
        while matches!(log.front(), Some(ts) if *ts < cutoff) {
            log.pop_front();
        }
        log.push_back(now);
        log.len() as u32 <= self.config.requests_per_minute_per_client
    }

    /// Drops idle clients' rate-limit windows entirely once every timestamp
    /// in them has aged out, so a client that stops sending requests doesn't
    /// hold a `request_log` entry forever.
    pub fn purge_idle_clients(&self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(RATE_WINDOW_SECONDS);
        self.request_log.retain(|_, log| {
            let mut log = log.lock().expect("risk gate rate log mutex poisoned");
            while matches!(log.front(), Some(ts) if *ts < cutoff) {
                log.pop_front();
            }
            !log.is_empty()
        });
    }

    pub fn update_last_trade_price(&self, symbol: &str, price: Decimal) {
        self.last_trade_price.insert(symbol.to_string(), price);
    }

    pub fn last_trade_price(&self, symbol: &str) -> Option<Decimal> {
        self.last_trade_price.get(symbol).map(|r| *r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderbook::Side;

    fn ctx(client_id: &str, order_type: OrderType, quantity: Decimal, price: Option<Decimal>) -> RiskContext {
        RiskContext {
            client_id: client_id.to_string(),
            symbol: "BTC-USD".to_string(),
            side: Side::Buy,
            order_type,
            quantity,
            price,
        }
    }

    #[test]
    fn empty_client_id_is_rejected() {
        let gate = RiskGate::new(RiskConfig::default());
        let violations = gate.validate(&ctx("", OrderType::Market, Decimal::ONE, None), Utc::now());
        assert!(violations.contains(&RiskViolation::MissingClientId));
    }

    #[test]
    fn quantity_cap_disabled_when_zero() {
        let gate = RiskGate::new(RiskConfig::default());
        let violations =
            gate.validate(&ctx("c1", OrderType::Market, Decimal::from(1_000_000), None), Utc::now());
        assert!(violations.is_empty());
    }

    #[test]
    fn quantity_cap_enforced_when_configured() {
        let gate = RiskGate::new(RiskConfig { max_quantity_per_order: Decimal::from(10), ..Default::default() });
        let violations = gate.validate(&ctx("c1", OrderType::Market, Decimal::from(11), None), Utc::now());
        assert!(matches!(violations[0], RiskViolation::QuantityExceedsCap { .. }));
    }

    #[test]
    fn limit_order_without_price_is_rejected() {
        let gate = RiskGate::new(RiskConfig::default());
        let violations = gate.validate(&ctx("c1", OrderType::Limit, Decimal::ONE, None), Utc::now());
        assert!(violations.contains(&RiskViolation::MissingLimitPrice));
    }

    #[test]
    fn price_band_allows_when_no_last_trade_known() {
        let gate = RiskGate::new(RiskConfig { price_band_percent: Decimal::from(5), ..Default::default() });
        let violations =
            gate.validate(&ctx("c1", OrderType::Limit, Decimal::ONE, Some(Decimal::from(1000))), Utc::now());
        assert!(violations.is_empty());
    }

    #[test]
    fn price_band_rejects_large_deviation() {
        let gate = RiskGate::new(RiskConfig { price_band_percent: Decimal::from(5), ..Default::default() });
        gate.update_last_trade_price("BTC-USD", Decimal::from(100));
        let violations =
            gate.validate(&ctx("c1", OrderType::Limit, Decimal::ONE, Some(Decimal::from(120))), Utc::now());
        assert!(matches!(violations[0], RiskViolation::PriceBandExceeded { .. }));
    }

    #[test]
    fn price_band_allows_within_band() {
        let gate = RiskGate::new(RiskConfig { price_band_percent: Decimal::from(5), ..Default::default() });
        gate.update_last_trade_price("BTC-USD", Decimal::from(100));
        let violations =
            gate.validate(&ctx("c1", OrderType::Limit, Decimal::ONE, Some(Decimal::from(103))), Utc::now());
        assert!(violations.is_empty());
    }

    #[test]
    fn rate_limit_trips_after_threshold_within_window() {
        let gate = RiskGate::new(RiskConfig { requests_per_minute_per_client: 2, ..Default::default() });
        let now = Utc::now();
        assert!(gate.validate(&ctx("c1", OrderType::Market, Decimal::ONE, None), now).is_empty());
        assert!(gate.validate(&ctx("c1", OrderType::Market, Decimal::ONE, None), now).is_empty());
        let violations = gate.validate(&ctx("c1", OrderType::Market, Decimal::ONE, None), now);
        assert!(matches!(violations[0], RiskViolation::RateLimitExceeded { .. }));
    }

    #[test]
    fn rate_limit_window_slides() {
        let gate = RiskGate::new(RiskConfig { requests_per_minute_per_client: 1, ..Default::default() });
        let now = Utc::now();
        assert!(gate.validate(&ctx("c1", OrderType::Market, Decimal::ONE, None), now).is_empty());
        let later = now + Duration::seconds(61);
        assert!(gate.validate(&ctx("c1", OrderType::Market, Decimal::ONE, None), later).is_empty());
    }

    #[test]
    fn purge_idle_clients_drops_entries_whose_window_fully_expired() {
        let gate = RiskGate::new(RiskConfig { requests_per_minute_per_client: 5, ..Default::default() });
        let now = Utc::now();
        assert!(gate.validate(&ctx("c1", OrderType::Market, Decimal::ONE, None), now).is_empty());
        assert_eq!(gate.request_log.len(), 1);

        gate.purge_idle_clients(now + Duration::seconds(RATE_WINDOW_SECONDS + 1));
        assert_eq!(gate.request_log.len(), 0);
    }

    #[test]
    fn purge_idle_clients_keeps_entries_with_recent_activity() {
        let gate = RiskGate::new(RiskConfig { requests_per_minute_per_client: 5, ..Default::default() });
        let now = Utc::now();
        assert!(gate.validate(&ctx("c1", OrderType::Market, Decimal::ONE, None), now).is_empty());

        gate.purge_idle_clients(now + Duration::seconds(10));
        assert_eq!(gate.request_log.len(), 1);
    }
}
