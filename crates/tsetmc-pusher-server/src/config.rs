//! Server configuration management

use crate::error::{ApiError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::{Time, UtcOffset};
use tsetmc_pusher::MarketHours;
use tsetmc_pusher::source::tsetmc::DEFAULT_BASE_URL;
use tsetmc_pusher::timing::{parse_offset, parse_time};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Market open in exchange time
    pub market_open: Time,

    /// Market close in exchange time; serving ends here
    pub market_close: Time,

    /// Exchange UTC offset
    pub market_utc_offset: UtcOffset,

    /// Delay between market-watch polls in milliseconds
    pub crawl_interval_ms: u64,

    /// Fetch client type on every Nth poll
    pub client_type_every: u64,

    /// Base URL of the TSETMC feeds
    pub tsetmc_base_url: String,

    /// Buffered market updates before slow consumers lag
    pub event_capacity: usize,

    /// Whether serving stops at market close
    pub shutdown_at_market_close: bool,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let hours = MarketHours::default();

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            market_open: match lookup("MARKET_OPEN") {
                Some(v) => parse_time(&v).map_err(|e| {
                    ApiError::Config(format!("Invalid MARKET_OPEN value: {}", e))
                })?,
                None => hours.open,
            },
            market_close: match lookup("MARKET_CLOSE") {
                Some(v) => parse_time(&v).map_err(|e| {
                    ApiError::Config(format!("Invalid MARKET_CLOSE value: {}", e))
                })?,
                None => hours.close,
            },
            market_utc_offset: match lookup("MARKET_UTC_OFFSET") {
                Some(v) => parse_offset(&v).map_err(|e| {
                    ApiError::Config(format!("Invalid MARKET_UTC_OFFSET value: {}", e))
                })?,
                None => hours.utc_offset,
            },
            crawl_interval_ms: parse_var(
                &lookup,
                "CRAWL_INTERVAL_MS",
                defaults.crawl_interval_ms,
            )?,
            client_type_every: parse_var(
                &lookup,
                "CLIENT_TYPE_EVERY",
                defaults.client_type_every,
            )?,
            tsetmc_base_url: lookup("TSETMC_BASE_URL").unwrap_or(defaults.tsetmc_base_url),
            event_capacity: parse_var(&lookup, "EVENT_CAPACITY", defaults.event_capacity)?,
            shutdown_at_market_close: lookup("SHUTDOWN_AT_MARKET_CLOSE")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(defaults.shutdown_at_market_close),
            cors_origins: lookup("CORS_ORIGINS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
        })
    }

    pub fn market_hours(&self) -> MarketHours {
        MarketHours::new(self.market_open, self.market_close, self.market_utc_offset)
    }

    pub fn crawl_interval(&self) -> Duration {
        Duration::from_millis(self.crawl_interval_ms)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ApiError::Config(format!("Invalid {} value", key))),
        None => Ok(default),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let hours = MarketHours::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            market_open: hours.open,
            market_close: hours.close,
            market_utc_offset: hours.utc_offset,
            crawl_interval_ms: 1000,
            client_type_every: 10,
            tsetmc_base_url: DEFAULT_BASE_URL.to_string(),
            event_capacity: 1024,
            shutdown_at_market_close: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}
