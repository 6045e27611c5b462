//! Parsers for the TSETMC market-watch and client-type text feeds
//!
//! The market-watch feed is split into `@`-separated sections. Section 2
//! holds one `;`-separated record per instrument, section 3 holds order book
//! rows. Fields inside a record are `,`-separated.

use crate::SourceError;
use crate::models::*;
use std::collections::HashMap;
use time::Time;
use tracing::warn;

const INSTRUMENTS_SECTION: usize = 2;
const ORDERBOOK_SECTION: usize = 3;
const INSTRUMENT_FIELDS: usize = 21;
const ORDERBOOK_FIELDS: usize = 8;
const CLIENT_TYPE_FIELDS: usize = 9;

/// Parse the market-watch feed into one row per instrument
///
/// Malformed records are skipped with a warning.
pub fn parse_market_watch(text: &str) -> Result<Vec<MarketWatchTradeData>, SourceError> {
    let sections: Vec<&str> = text.split('@').collect();
    let instruments = sections
        .get(INSTRUMENTS_SECTION)
        .ok_or(SourceError::MissingSection {
            section: INSTRUMENTS_SECTION,
        })?;
    let orderbook = sections
        .get(ORDERBOOK_SECTION)
        .ok_or(SourceError::MissingSection {
            section: ORDERBOOK_SECTION,
        })?;

    let mut rows = Vec::new();
    let mut by_code = HashMap::new();
    for record in records(instruments) {
        match parse_instrument_record(record) {
            Ok(row) => {
                by_code.insert(row.identification.tsetmc_code.clone(), rows.len());
                rows.push(row);
            }
            Err(e) => warn!("Skipping market-watch record: {}", e),
        }
    }

    for record in records(orderbook) {
        match parse_orderbook_record(record) {
            Ok((code, rn, book_row)) => match by_code.get(&code) {
                Some(&index) => rows[index].orderbook.rows[rn] = book_row,
                None => warn!("Order book row for unknown instrument [{}]", code),
            },
            Err(e) => warn!("Skipping order book record: {}", e),
        }
    }

    Ok(rows)
}

/// Parse the client-type feed
///
/// Natural traders are reported as "individual" and legal ones as
/// "non-individual" in the feed.
pub fn parse_client_type(text: &str) -> Result<Vec<MarketWatchClientTypeData>, SourceError> {
    let mut rows = Vec::new();
    for record in records(text) {
        match parse_client_type_record(record) {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Skipping client type record: {}", e),
        }
    }
    Ok(rows)
}

fn records(section: &str) -> impl Iterator<Item = &str> {
    section.split(';').map(str::trim).filter(|r| !r.is_empty())
}

fn fields(record: &str, expected: usize) -> Result<Vec<&str>, SourceError> {
    let fields: Vec<&str> = record.split(',').map(str::trim).collect();
    if fields.len() < expected {
        return Err(SourceError::InvalidRecord(format!(
            "expected {} fields, found {}: {}",
            expected,
            fields.len(),
            record
        )));
    }
    Ok(fields)
}

fn parse_instrument_record(record: &str) -> Result<MarketWatchTradeData, SourceError> {
    let f = fields(record, INSTRUMENT_FIELDS)?;

    let identification = InstrumentIdentification {
        tsetmc_code: f[0].to_string(),
        isin: f[1].to_string(),
        ticker: f[2].to_string(),
        name_persian: f[3].to_string(),
    };
    let mut row = MarketWatchTradeData::new(identification, parse_heven(f[4])?);

    let candle = &mut row.intraday_trade_candle;
    candle.open_price = int("open", f[5])?;
    candle.close_price = int("close", f[6])?;
    candle.last_price = int("last", f[7])?;
    candle.trade_num = unsigned("trade_num", f[8])?;
    candle.trade_volume = unsigned("volume", f[9])?;
    candle.trade_value = unsigned("value", f[10])?;
    candle.min_price = int("min", f[11])?;
    candle.max_price = int("max", f[12])?;
    candle.previous_price = int("previous", f[13])?;

    row.order_limitations = OrderLimitations {
        max_price: int("threshold_max", f[19])?,
        min_price: int("threshold_min", f[20])?,
    };
    Ok(row)
}

/// Returns the instrument code, zero-based row index and the row itself
fn parse_orderbook_record(record: &str) -> Result<(String, usize, OrderBookRow), SourceError> {
    let f = fields(record, ORDERBOOK_FIELDS)?;

    let number = unsigned("row", f[1])? as usize;
    if !(1..=ORDERBOOK_DEPTH).contains(&number) {
        return Err(SourceError::InvalidRecord(format!("row {} out of range", number)));
    }

    let row = OrderBookRow {
        supply: OrderBookEntry {
            num: unsigned("supply_num", f[2])?,
            price: int("supply_price", f[5])?,
            volume: unsigned("supply_volume", f[7])?,
        },
        demand: OrderBookEntry {
            num: unsigned("demand_num", f[3])?,
            price: int("demand_price", f[4])?,
            volume: unsigned("demand_volume", f[6])?,
        },
    };
    Ok((f[0].to_string(), number - 1, row))
}

fn parse_client_type_record(record: &str) -> Result<MarketWatchClientTypeData, SourceError> {
    let f = fields(record, CLIENT_TYPE_FIELDS)?;

    let flow = |num: usize, volume: usize| -> Result<ClientTypeFlow, SourceError> {
        Ok(ClientTypeFlow {
            num: unsigned("client_type_num", f[num])?,
            volume: unsigned("client_type_volume", f[volume])?,
        })
    };
    let client_type = ClientType {
        natural: ClientTypeSide {
            buy: flow(1, 3)?,
            sell: flow(5, 7)?,
        },
        legal: ClientTypeSide {
            buy: flow(2, 4)?,
            sell: flow(6, 8)?,
        },
    };
    Ok(MarketWatchClientTypeData {
        tsetmc_code: f[0].to_string(),
        client_type,
    })
}

/// Last trade time written as an `HHMMSS` integer, e.g. `91503`
fn parse_heven(value: &str) -> Result<Time, SourceError> {
    let heven = unsigned("heven", value)?;
    let invalid =
        |reason: String| SourceError::InvalidRecord(format!("heven {}: {}", value, reason));
    let component = |part: u64| u8::try_from(part).map_err(|e| invalid(e.to_string()));
    let (hour, minute, second) = (
        component(heven / 10000)?,
        component(heven / 100 % 100)?,
        component(heven % 100)?,
    );
    Time::from_hms(hour, minute, second).map_err(|e| invalid(e.to_string()))
}

/// Integers may arrive in exponent form, e.g. `1.2345E+10`
///
/// Exponent forms must still denote a whole number within `i64` range.
fn int(field: &'static str, value: &str) -> Result<i64, SourceError> {
    let invalid = || SourceError::InvalidNumber {
        field,
        value: value.to_string(),
    };
    if let Ok(parsed) = value.parse::<i64>() {
        return Ok(parsed);
    }
    let parsed = value.parse::<f64>().map_err(|_| invalid())?;
    // 2^63 is exact in f64; anything at or above it does not fit
    if !parsed.is_finite()
        || parsed.fract() != 0.0
        || parsed.abs() >= 9_223_372_036_854_775_808.0
    {
        return Err(invalid());
    }
    Ok(parsed as i64)
}

fn unsigned(field: &'static str, value: &str) -> Result<u64, SourceError> {
    let parsed = int(field, value)?;
    u64::try_from(parsed).map_err(|_| SourceError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
