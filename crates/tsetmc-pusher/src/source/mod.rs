//! Market data sources
//!
//! This module provides the source trait the crawler polls, the parsers for
//! the TSETMC text feeds, and an in-memory source for tests and replay.

use crate::models::{MarketWatchClientTypeData, MarketWatchTradeData};
use crate::{PusherError, Result};
use async_trait::async_trait;
use std::sync::Mutex;

pub mod parse;

#[cfg(feature = "tsetmc")]
pub mod tsetmc;

/// Abstraction over where market-watch data comes from
#[async_trait]
pub trait MarketWatchSource: Send + Sync {
    /// Latest market-watch rows: trade candle, thresholds and order book
    async fn trade_data(&self) -> Result<Vec<MarketWatchTradeData>>;

    /// Latest client-type rows
    async fn client_type(&self) -> Result<Vec<MarketWatchClientTypeData>>;
}

/// In-memory source serving preset rows
#[derive(Debug, Default)]
pub struct StaticSource {
    trade_data: Mutex<Vec<MarketWatchTradeData>>,
    client_type: Mutex<Vec<MarketWatchClientTypeData>>,
}

impl StaticSource {
    pub fn new(
        trade_data: Vec<MarketWatchTradeData>,
        client_type: Vec<MarketWatchClientTypeData>,
    ) -> Self {
        Self {
            trade_data: Mutex::new(trade_data),
            client_type: Mutex::new(client_type),
        }
    }

    /// Replace the rows served by the next `trade_data` call
    pub fn set_trade_data(&self, rows: Vec<MarketWatchTradeData>) -> Result<()> {
        *self
            .trade_data
            .lock()
            .map_err(|_| PusherError::LockPoisoned("static trade data"))? = rows;
        Ok(())
    }

    /// Replace the rows served by the next `client_type` call
    pub fn set_client_type(&self, rows: Vec<MarketWatchClientTypeData>) -> Result<()> {
        *self
            .client_type
            .lock()
            .map_err(|_| PusherError::LockPoisoned("static client type"))? = rows;
        Ok(())
    }
}

#[async_trait]
impl MarketWatchSource for StaticSource {
    async fn trade_data(&self) -> Result<Vec<MarketWatchTradeData>> {
        let rows = self
            .trade_data
            .lock()
            .map_err(|_| PusherError::LockPoisoned("static trade data"))?;
        Ok(rows.clone())
    }

    async fn client_type(&self) -> Result<Vec<MarketWatchClientTypeData>> {
        let rows = self
            .client_type
            .lock()
            .map_err(|_| PusherError::LockPoisoned("static client type"))?;
        Ok(rows.clone())
    }
}
