//! Process configuration and logging setup.
//!
//! Everything is read from the environment with sane defaults so the service
//! can be started with zero configuration for local/demo use.

use fanout::FanoutConfig;
use idempotency::IdempotencyConfig;
use outbox::OutboxConfig;
use risk::RiskConfig;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_decimal_or(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|v| Decimal::from_str(&v).ok())
        .unwrap_or(default)
}

/// Initializes the global `tracing` subscriber.
///
/// `LOG_FORMAT=pretty` selects human-readable output for local development;
/// anything else (including unset) produces JSON suitable for log ingestion.
/// `RUST_LOG` controls the level filter, defaulting to `info`.
pub fn init_logging() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt().with_env_filter(env_filter).pretty().init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExchangeConfig {
    pub listen_addr: String,
    pub symbols: Vec<String>,
    pub risk: RiskConfig,
    pub idempotency: IdempotencyConfig,
    pub outbox: OutboxConfig,
    pub fanout: FanoutConfig,
    pub reaper_interval_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            symbols: std::env::var("SYMBOLS")
                .unwrap_or_else(|_| "BTC-USD".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            risk: RiskConfig {
                max_quantity_per_order: env_decimal_or("RISK_MAX_QUANTITY_PER_ORDER", Decimal::ZERO),
                price_band_percent: env_decimal_or("RISK_PRICE_BAND_PERCENT", Decimal::ZERO),
                requests_per_minute_per_client: env_or("RISK_REQUESTS_PER_MINUTE_PER_CLIENT", 0),
            },
            idempotency: IdempotencyConfig {
                ttl_seconds: env_or("IDEMPOTENCY_TTL_SECONDS", 86_400),
                max_total: env_or("IDEMPOTENCY_MAX_TOTAL", 100_000),
                max_per_client: env_or("IDEMPOTENCY_MAX_PER_CLIENT", 1_000),
            },
            outbox: OutboxConfig {
                poll_interval_ms: env_or("OUTBOX_POLL_INTERVAL_MS", 200),
                batch_size: env_or("OUTBOX_BATCH_SIZE", 50),
                lease_ms: env_or("OUTBOX_LEASE_MS", 30_000),
                max_parallelism: env_or("OUTBOX_MAX_PARALLELISM", 8),
                base_delay_ms: env_or("OUTBOX_BASE_DELAY_MS", 200),
                max_delay_ms: env_or("OUTBOX_MAX_DELAY_MS", 30_000),
                max_attempts: env_or("OUTBOX_MAX_ATTEMPTS", 8),
            },
            fanout: FanoutConfig {
                batch_window_ms: env_or("FANOUT_BATCH_WINDOW_MS", 100),
                max_messages_per_second: env_or("FANOUT_MAX_MESSAGES_PER_SECOND", 20),
                send_timeout_ms: env_or("FANOUT_SEND_TIMEOUT_MS", 1_000),
                heartbeat_interval_secs: env_or("FANOUT_HEARTBEAT_INTERVAL_SECS", 30),
            },
            reaper_interval_secs: env_or("REAPER_INTERVAL_SECS", 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_one_symbol_and_sane_defaults() {
        std::env::remove_var("SYMBOLS");
        std::env::remove_var("LISTEN_ADDR");
        let config = ExchangeConfig::default();
        assert_eq!(config.symbols, vec!["BTC-USD".to_string()]);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.outbox.max_attempts, 8);
    }

    #[test]
    fn symbols_env_var_is_split_on_commas() {
        std::env::set_var("SYMBOLS", "BTC-USD, ETH-USD");
        let config = ExchangeConfig::default();
        assert_eq!(config.symbols, vec!["BTC-USD".to_string(), "ETH-USD".to_string()]);
        std::env::remove_var("SYMBOLS");
    }
}
