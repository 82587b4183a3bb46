//! Application configuration, loaded once at startup.
//!
//! Follows the teacher's own convention: `dotenv().ok()` then
//! `std::env::var(KEY).unwrap_or_else(|_| default)` per field, no config
//! file format, no validation beyond `parse().unwrap_or(default)`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub testnet: bool,
    pub recv_window_ms: u64,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub binance_paper: VenueConfig,
    pub binance_real: VenueConfig,
    pub default_leverage: u32,
    pub max_position_fraction: f64,
    pub max_gross_exposure: f64,
    pub min_order_notional_usd: f64,
    pub requests_per_minute: u32,
    pub orders_per_10_seconds: u32,
    pub orders_per_day: u32,
    pub event_topic: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./council_exec.db".to_string());

        let recv_window_ms = std::env::var("BINANCE_RECV_WINDOW_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .unwrap_or(5000);

        let timeout_secs: u64 = std::env::var("EXCHANGE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let binance_paper = VenueConfig {
            base_url: std::env::var("BINANCE_TESTNET_BASE_URL")
                .unwrap_or_else(|_| "https://testnet.binancefuture.com".to_string()),
            api_key: std::env::var("BINANCE_TESTNET_API_KEY").unwrap_or_default(),
            api_secret: std::env::var("BINANCE_TESTNET_API_SECRET").unwrap_or_default(),
            testnet: true,
            recv_window_ms,
            request_timeout: Duration::from_secs(timeout_secs),
        };

        let binance_real = VenueConfig {
            base_url: std::env::var("BINANCE_BASE_URL")
                .unwrap_or_else(|_| "https://fapi.binance.com".to_string()),
            api_key: std::env::var("BINANCE_API_KEY").unwrap_or_default(),
            api_secret: std::env::var("BINANCE_API_SECRET").unwrap_or_default(),
            testnet: false,
            recv_window_ms,
            request_timeout: Duration::from_secs(timeout_secs),
        };

        let default_leverage = std::env::var("DEFAULT_LEVERAGE")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let max_position_fraction = std::env::var("MAX_POSITION_FRACTION")
            .unwrap_or_else(|_| "0.25".to_string())
            .parse()
            .unwrap_or(0.25);

        let max_gross_exposure = std::env::var("MAX_GROSS_EXPOSURE")
            .unwrap_or_else(|_| "5.0".to_string())
            .parse()
            .unwrap_or(5.0);

        let min_order_notional_usd = std::env::var("MIN_ORDER_NOTIONAL_USD")
            .unwrap_or_else(|_| "10.0".to_string())
            .parse()
            .unwrap_or(10.0);

        let requests_per_minute = std::env::var("RATE_LIMIT_RPM")
            .unwrap_or_else(|_| "1200".to_string())
            .parse()
            .unwrap_or(1200);

        let orders_per_10_seconds = std::env::var("ORDER_RATE_LIMIT_10S")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let orders_per_day = std::env::var("ORDER_RATE_LIMIT_1D")
            .unwrap_or_else(|_| "200000".to_string())
            .parse()
            .unwrap_or(200_000);

        let event_topic =
            std::env::var("EVENT_TOPIC").unwrap_or_else(|_| "council_trades".to_string());

        Ok(Self {
            database_path,
            binance_paper,
            binance_real,
            default_leverage,
            max_position_fraction,
            max_gross_exposure,
            min_order_notional_usd,
            requests_per_minute,
            orders_per_10_seconds,
            orders_per_day,
            event_topic,
        })
    }
}
