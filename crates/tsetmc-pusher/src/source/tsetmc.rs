//! Live TSETMC feeds over HTTP

use super::MarketWatchSource;
use super::parse::{parse_client_type, parse_market_watch};
use crate::models::{MarketWatchClientTypeData, MarketWatchTradeData};
use crate::{PusherError, Result, SourceError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://old.tsetmc.com";

const MARKET_WATCH_PATH: &str = "/tsev2/data/MarketWatchPlus.aspx?h=0&r=0";
const CLIENT_TYPE_PATH: &str = "/tsev2/data/ClientTypeAll.aspx";

/// User-Agent string for feed requests
const USER_AGENT: &str = concat!("tsetmc-pusher/", env!("CARGO_PKG_VERSION"));

/// Fetches the market-watch and client-type feeds from TSETMC
#[derive(Debug, Clone)]
pub struct TsetmcSource {
    client: Client,
    base_url: String,
}

impl TsetmcSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                PusherError::Source(SourceError::Request(format!(
                    "failed to build HTTP client: {e}"
                )))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Fetching {}", url);
        let text = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

impl Default for TsetmcSource {
    fn default() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[async_trait]
impl MarketWatchSource for TsetmcSource {
    async fn trade_data(&self) -> Result<Vec<MarketWatchTradeData>> {
        let text = self.fetch(MARKET_WATCH_PATH).await?;
        Ok(parse_market_watch(&text)?)
    }

    async fn client_type(&self) -> Result<Vec<MarketWatchClientTypeData>> {
        let text = self.fetch(CLIENT_TYPE_PATH).await?;
        Ok(parse_client_type(&text)?)
    }
}
