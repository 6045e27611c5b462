//! Websocket wire protocol
//!
//! Clients send `<Action>.<Channel>.<Isin1>,<Isin2>,...`, for instance
//! `1.trade.IRO1FOLD0001,IRO1IKCO0001`. The server answers with JSON objects
//! keyed by ISIN, then by channel name:
//!
//! ```json
//! {"IRO1FOLD0001": {"thresholds": [5500, 5000], "trade": [...]}}
//! ```

use crate::models::{ISIN_LENGTH, Instrument};
use crate::ProtocolError;
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;
use time::PrimitiveDateTime;
use time::macros::format_description;

/// What a client wants done with a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Unsubscribe,
    Subscribe,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Unsubscribe => "0",
            Action::Subscribe => "1",
        }
    }
}

impl FromStr for Action {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Action::Unsubscribe),
            "1" => Ok(Action::Subscribe),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }
}

/// Data channels available per instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    All,
    Trade,
    OrderBook,
    ClientType,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::All => "all",
            Channel::Trade => "trade",
            Channel::OrderBook => "orderbook",
            Channel::ClientType => "clienttype",
        }
    }
}

impl FromStr for Channel {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Channel::All),
            "trade" => Ok(Channel::Trade),
            "orderbook" => Ok(Channel::OrderBook),
            "clienttype" => Ok(Channel::ClientType),
            other => Err(ProtocolError::UnknownChannel(other.to_string())),
        }
    }
}

/// A parsed subscription message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub action: Action,
    pub channel: Channel,
    pub isins: Vec<String>,
}

impl Command {
    pub fn new(action: Action, channel: Channel, isins: Vec<String>) -> Self {
        Self {
            action,
            channel,
            isins,
        }
    }

    pub fn subscribe(channel: Channel, isins: Vec<String>) -> Self {
        Self::new(Action::Subscribe, channel, isins)
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(message: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = message.split('.').collect();
        let [action, channel, isins] = parts.as_slice() else {
            return Err(ProtocolError::Format(message.to_string()));
        };

        let action = action.parse()?;
        let channel = channel.parse()?;
        let isins: Vec<String> = isins.split(',').map(str::to_string).collect();
        if let Some(fake) = isins.iter().find(|isin| isin.chars().count() != ISIN_LENGTH) {
            return Err(ProtocolError::InvalidIsin(fake.clone()));
        }

        Ok(Command {
            action,
            channel,
            isins,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.action.as_str(),
            self.channel.as_str(),
            self.isins.join(",")
        )
    }
}

/// Format of the last trade datetime inside trade payloads
pub fn format_trade_datetime(datetime: &PrimitiveDateTime) -> String {
    datetime
        .format(format_description!(
            "[year]/[month]/[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default()
}

pub fn parse_trade_datetime(text: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(
        text,
        format_description!("[year]/[month]/[day] [hour]:[minute]:[second]"),
    )
}

pub fn thresholds_payload(instrument: &Instrument) -> Value {
    let limits = &instrument.order_limitations;
    json!([limits.max_price, limits.min_price])
}

pub fn trade_payload(instrument: &Instrument) -> Value {
    let candle = &instrument.intraday_trade_candle;
    json!([
        candle.close_price,
        candle.last_price,
        candle.last_trade_datetime.as_ref().map(format_trade_datetime),
        candle.max_price,
        candle.min_price,
        candle.open_price,
        candle.previous_price,
        candle.trade_num,
        candle.trade_value,
        candle.trade_volume,
    ])
}

/// Order book rows as `[row, demand num/price/volume, supply num/price/volume]`
///
/// `rows` limits the payload to specific row indices; `None` sends the whole book.
pub fn orderbook_payload(instrument: &Instrument, rows: Option<&[usize]>) -> Value {
    let rows: Vec<Value> = instrument
        .orderbook
        .rows
        .iter()
        .enumerate()
        .filter(|(rn, _)| rows.is_none_or(|wanted| wanted.contains(rn)))
        .map(|(rn, row)| {
            json!([
                rn,
                row.demand.num,
                row.demand.price,
                row.demand.volume,
                row.supply.num,
                row.supply.price,
                row.supply.volume,
            ])
        })
        .collect();
    Value::Array(rows)
}

pub fn clienttype_payload(instrument: &Instrument) -> Value {
    let ct = &instrument.client_type;
    json!([
        ct.legal.buy.num,
        ct.legal.buy.volume,
        ct.legal.sell.num,
        ct.legal.sell.volume,
        ct.natural.buy.num,
        ct.natural.buy.volume,
        ct.natural.sell.num,
        ct.natural.sell.volume,
    ])
}

/// Initial data sent right after subscribing to `channel`
pub fn channel_payload(channel: Channel, instrument: &Instrument) -> Map<String, Value> {
    let mut payload = Map::new();
    match channel {
        Channel::All => {
            payload.insert("thresholds".into(), thresholds_payload(instrument));
            payload.insert("trade".into(), trade_payload(instrument));
            payload.insert("orderbook".into(), orderbook_payload(instrument, None));
            payload.insert("clienttype".into(), clienttype_payload(instrument));
        }
        Channel::Trade => {
            payload.insert("trade".into(), trade_payload(instrument));
        }
        Channel::OrderBook => {
            payload.insert("orderbook".into(), orderbook_payload(instrument, None));
        }
        Channel::ClientType => {
            payload.insert("clienttype".into(), clienttype_payload(instrument));
        }
    }
    payload
}

/// Wrap a single instrument's channel data as `{isin: {channel: data}}`
pub fn envelope(isin: &str, channel: &str, data: Value) -> Value {
    let mut channels = Map::new();
    channels.insert(channel.to_string(), data);
    let mut message = Map::new();
    message.insert(isin.to_string(), Value::Object(channels));
    Value::Object(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use time::macros::datetime;

    fn instrument() -> Instrument {
        let mut instrument = Instrument::new(InstrumentIdentification::new("IRO1FOLD0001", "1"));
        instrument.order_limitations = OrderLimitations {
            max_price: 5500,
            min_price: 5000,
        };
        let candle = &mut instrument.intraday_trade_candle;
        candle.close_price = 5240;
        candle.last_price = 5230;
        candle.max_price = 5300;
        candle.min_price = 5100;
        candle.open_price = 5150;
        candle.previous_price = 5200;
        candle.trade_num = 120;
        candle.trade_value = 52_300_000;
        candle.trade_volume = 10_000;
        candle.last_trade_datetime = Some(datetime!(2024-01-20 9:05:03));
        instrument.orderbook.rows[0] = OrderBookRow {
            demand: OrderBookEntry { num: 3, volume: 500, price: 5220 },
            supply: OrderBookEntry { num: 1, volume: 200, price: 5240 },
        };
        instrument.client_type.natural.buy = ClientTypeFlow { num: 7, volume: 700 };
        instrument
    }

    #[test]
    fn test_parse_subscription() {
        let command: Command = "1.trade.IRO1FOLD0001,IRO1IKCO0001".parse().unwrap();
        assert_eq!(command.action, Action::Subscribe);
        assert_eq!(command.channel, Channel::Trade);
        assert_eq!(command.isins, vec!["IRO1FOLD0001", "IRO1IKCO0001"]);
        assert_eq!(command.to_string(), "1.trade.IRO1FOLD0001,IRO1IKCO0001");
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(
            "1.trade".parse::<Command>(),
            Err(ProtocolError::Format("1.trade".into()))
        );
        assert_eq!(
            "2.trade.IRO1FOLD0001".parse::<Command>(),
            Err(ProtocolError::UnknownAction("2".into()))
        );
        assert_eq!(
            "1.quotes.IRO1FOLD0001".parse::<Command>(),
            Err(ProtocolError::UnknownChannel("quotes".into()))
        );
        assert_eq!(
            "0.all.IRO1FOLD0001,IKCO".parse::<Command>(),
            Err(ProtocolError::InvalidIsin("IKCO".into()))
        );
        // A fourth dot makes it a format error, not an isin error
        assert!(matches!(
            "1.all.IRO1FOLD0001.x".parse::<Command>(),
            Err(ProtocolError::Format(_))
        ));
    }

    #[test]
    fn test_trade_payload_layout() {
        let payload = trade_payload(&instrument());
        assert_eq!(
            payload,
            json!([5240, 5230, "2024/01/20 09:05:03", 5300, 5100, 5150, 5200, 120, 52300000, 10000])
        );
    }

    #[test]
    fn test_trade_payload_without_trades() {
        let payload = trade_payload(&Instrument::default());
        assert_eq!(payload[2], Value::Null);
    }

    #[test]
    fn test_orderbook_specific_rows() {
        let instrument = instrument();
        let full = orderbook_payload(&instrument, None);
        assert_eq!(full.as_array().unwrap().len(), ORDERBOOK_DEPTH);
        assert_eq!(full[0], json!([0, 3, 5220, 500, 1, 5240, 200]));

        let partial = orderbook_payload(&instrument, Some(&[2, 4]));
        assert_eq!(partial, json!([[2, 0, 0, 0, 0, 0, 0], [4, 0, 0, 0, 0, 0, 0]]));
    }

    #[test]
    fn test_all_channel_contains_everything() {
        let payload = channel_payload(Channel::All, &instrument());
        assert_eq!(payload["thresholds"], json!([5500, 5000]));
        assert_eq!(payload["clienttype"], json!([0, 0, 0, 0, 7, 700, 0, 0]));
        assert!(payload.contains_key("trade"));
        assert!(payload.contains_key("orderbook"));
    }

    #[test]
    fn test_trade_datetime_roundtrip() {
        let text = format_trade_datetime(&datetime!(2024-01-20 12:29:59));
        assert_eq!(text, "2024/01/20 12:29:59");
        assert_eq!(parse_trade_datetime(&text).unwrap(), datetime!(2024-01-20 12:29:59));
    }
}
