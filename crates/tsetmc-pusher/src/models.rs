//! Market data models for instruments and market-watch rows

use serde::{Deserialize, Serialize};
use time::{PrimitiveDateTime, Time};

/// Number of rows TSETMC publishes for an order book
pub const ORDERBOOK_DEPTH: usize = 5;

/// Length of every valid ISIN
pub const ISIN_LENGTH: usize = 12;

/// Identifiers of a single instrument
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentIdentification {
    pub isin: String,
    /// Internal instrument code used by the TSETMC feeds
    pub tsetmc_code: String,
    pub ticker: String,
    pub name_persian: String,
}

impl InstrumentIdentification {
    pub fn new(isin: impl Into<String>, tsetmc_code: impl Into<String>) -> Self {
        Self {
            isin: isin.into(),
            tsetmc_code: tsetmc_code.into(),
            ..Default::default()
        }
    }
}

/// Daily price threshold band
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLimitations {
    pub max_price: i64,
    pub min_price: i64,
}

/// Intraday trade statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeCandle {
    pub previous_price: i64,
    pub open_price: i64,
    pub close_price: i64,
    pub last_price: i64,
    pub max_price: i64,
    pub min_price: i64,
    pub trade_num: u64,
    pub trade_volume: u64,
    pub trade_value: u64,
    pub last_trade_datetime: Option<PrimitiveDateTime>,
}

/// One side of an order book row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    pub num: u64,
    pub volume: u64,
    pub price: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookRow {
    pub demand: OrderBookEntry,
    pub supply: OrderBookEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    pub rows: [OrderBookRow; ORDERBOOK_DEPTH],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTypeFlow {
    pub num: u64,
    pub volume: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTypeSide {
    pub buy: ClientTypeFlow,
    pub sell: ClientTypeFlow,
}

/// Trade flow split by legal (institutional) and natural (individual) traders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientType {
    pub legal: ClientTypeSide,
    pub natural: ClientTypeSide,
}

/// Realtime state of a single instrument
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub identification: InstrumentIdentification,
    pub order_limitations: OrderLimitations,
    pub intraday_trade_candle: TradeCandle,
    pub orderbook: OrderBook,
    pub client_type: ClientType,
}

impl Instrument {
    pub fn new(identification: InstrumentIdentification) -> Self {
        Self {
            identification,
            ..Default::default()
        }
    }

    pub fn isin(&self) -> &str {
        &self.identification.isin
    }
}

/// One instrument row of the market-watch feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketWatchTradeData {
    pub identification: InstrumentIdentification,
    pub last_trade_time: Time,
    /// Candle values; `last_trade_datetime` is not used here
    pub intraday_trade_candle: TradeCandle,
    pub orderbook: OrderBook,
    pub order_limitations: OrderLimitations,
}

impl MarketWatchTradeData {
    pub fn new(identification: InstrumentIdentification, last_trade_time: Time) -> Self {
        Self {
            identification,
            last_trade_time,
            intraday_trade_candle: TradeCandle::default(),
            orderbook: OrderBook::default(),
            order_limitations: OrderLimitations::default(),
        }
    }
}

/// One instrument row of the client-type feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketWatchClientTypeData {
    pub tsetmc_code: String,
    pub client_type: ClientType,
}
