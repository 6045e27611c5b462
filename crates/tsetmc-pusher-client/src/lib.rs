//! Websocket client for a TSETMC pusher
//!
//! Connects to the pusher, subscribes to every channel of its instruments
//! and keeps a local copy of their realtime data up to date.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use tsetmc_pusher::protocol::parse_trade_datetime;
use tsetmc_pusher::{
    Channel, ClientTypeFlow, Command, Instrument, ORDERBOOK_DEPTH, OrderBookEntry, OrderBookRow,
};

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown message channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid {channel} payload: {reason}")]
    InvalidPayload { channel: &'static str, reason: String },

    #[error("Invalid trade datetime: {0}")]
    Time(#[from] time::error::Parse),
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Subscribes to a pusher and mirrors its instruments locally
#[derive(Debug, Clone)]
pub struct TsetmcClient {
    url: String,
    instruments: Vec<Instrument>,
}

impl TsetmcClient {
    /// `url` is the pusher's websocket address, e.g. `ws://localhost:8765`
    pub fn new(url: impl Into<String>, instruments: Vec<Instrument>) -> Self {
        Self {
            url: url.into(),
            instruments,
        }
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn instrument(&self, isin: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|x| x.isin() == isin)
    }

    /// Subscription for every channel of the client's instruments
    pub fn subscribe_command(&self) -> Command {
        Command::subscribe(
            Channel::All,
            self.instruments
                .iter()
                .map(|x| x.isin().to_string())
                .collect(),
        )
    }

    /// Connect, subscribe and listen until the server closes the connection
    pub async fn operate(&mut self) -> Result<()> {
        self.operate_with(|_| {}).await
    }

    /// Like [`operate`](Self::operate), calling `on_update` after each instrument change
    pub async fn operate_with<F>(&mut self, mut on_update: F) -> Result<()>
    where
        F: FnMut(&Instrument),
    {
        info!("Client is starting its operation");
        let (mut websocket, _) = connect_async(self.url.as_str()).await?;

        info!(
            "Client is subscribing to data for {} instruments",
            self.instruments.len()
        );
        websocket
            .send(Message::Text(self.subscribe_command().to_string()))
            .await?;

        while let Some(message) = websocket.next().await {
            match message? {
                Message::Text(text) => {
                    debug!("Client received: {}", text);
                    match self.process_message(&text) {
                        Ok(updated) => {
                            for isin in updated {
                                if let Some(instrument) = self.instrument(&isin) {
                                    on_update(instrument);
                                }
                            }
                        }
                        Err(e) => error!("Failed to process message: {}", e),
                    }
                }
                Message::Close(_) => {
                    info!("Server closed the connection");
                    break;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Apply a `{isin: {channel: data}}` message, returning the updated ISINs
    ///
    /// Each instrument's channels are applied together: if any of them is
    /// invalid the instrument is left as it was.
    pub fn process_message(&mut self, message: &str) -> Result<Vec<String>> {
        let message: Value = serde_json::from_str(message)?;
        let Value::Object(entries) = message else {
            return Err(ClientError::InvalidPayload {
                channel: "message",
                reason: "expected an object".to_string(),
            });
        };

        let mut updated = Vec::new();
        for (isin, channels) in entries {
            let Some(instrument) = self.instruments.iter_mut().find(|x| x.isin() == isin) else {
                warn!("Received data for unsubscribed instrument [{}]", isin);
                continue;
            };
            let Value::Object(channels) = channels else {
                return Err(ClientError::InvalidPayload {
                    channel: "message",
                    reason: format!("channels of [{}] are not an object", isin),
                });
            };
            let mut staged = instrument.clone();
            for (channel, data) in &channels {
                match channel.as_str() {
                    "thresholds" => message_thresholds(&mut staged, data)?,
                    "trade" => message_trade(&mut staged, data)?,
                    "orderbook" => message_orderbook(&mut staged, data)?,
                    "clienttype" => message_clienttype(&mut staged, data)?,
                    other => return Err(ClientError::UnknownChannel(other.to_string())),
                }
            }
            *instrument = staged;
            updated.push(isin);
        }
        Ok(updated)
    }
}

fn values<'a>(channel: &'static str, data: &'a Value, len: usize) -> Result<&'a [Value]> {
    match data.as_array() {
        Some(items) if items.len() >= len => Ok(items.as_slice()),
        _ => Err(ClientError::InvalidPayload {
            channel,
            reason: format!("expected an array of {} items, got {}", len, data),
        }),
    }
}

fn int(channel: &'static str, value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| ClientError::InvalidPayload {
        channel,
        reason: format!("{} is not an integer", value),
    })
}

fn unsigned(channel: &'static str, value: &Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| ClientError::InvalidPayload {
        channel,
        reason: format!("{} is not a non-negative integer", value),
    })
}

fn message_thresholds(instrument: &mut Instrument, data: &Value) -> Result<()> {
    let d = values("thresholds", data, 2)?;
    instrument.order_limitations.max_price = int("thresholds", &d[0])?;
    instrument.order_limitations.min_price = int("thresholds", &d[1])?;
    Ok(())
}

fn message_trade(instrument: &mut Instrument, data: &Value) -> Result<()> {
    let d = values("trade", data, 10)?;
    let candle = &mut instrument.intraday_trade_candle;
    candle.close_price = int("trade", &d[0])?;
    candle.last_price = int("trade", &d[1])?;
    candle.last_trade_datetime = match d[2].as_str() {
        Some(text) => Some(parse_trade_datetime(text)?),
        None => None,
    };
    candle.max_price = int("trade", &d[3])?;
    candle.min_price = int("trade", &d[4])?;
    candle.open_price = int("trade", &d[5])?;
    candle.previous_price = int("trade", &d[6])?;
    candle.trade_num = unsigned("trade", &d[7])?;
    candle.trade_value = unsigned("trade", &d[8])?;
    candle.trade_volume = unsigned("trade", &d[9])?;
    Ok(())
}

fn message_orderbook(instrument: &mut Instrument, data: &Value) -> Result<()> {
    let rows = values("orderbook", data, 0)?;
    for row in rows {
        let r = values("orderbook", row, 7)?;
        let rn = unsigned("orderbook", &r[0])? as usize;
        if rn >= ORDERBOOK_DEPTH {
            return Err(ClientError::InvalidPayload {
                channel: "orderbook",
                reason: format!("row {} out of range", rn),
            });
        }
        instrument.orderbook.rows[rn] = OrderBookRow {
            demand: OrderBookEntry {
                num: unsigned("orderbook", &r[1])?,
                price: int("orderbook", &r[2])?,
                volume: unsigned("orderbook", &r[3])?,
            },
            supply: OrderBookEntry {
                num: unsigned("orderbook", &r[4])?,
                price: int("orderbook", &r[5])?,
                volume: unsigned("orderbook", &r[6])?,
            },
        };
    }
    Ok(())
}

fn message_clienttype(instrument: &mut Instrument, data: &Value) -> Result<()> {
    let d = values("clienttype", data, 8)?;
    let flow = |i: usize| -> Result<ClientTypeFlow> {
        Ok(ClientTypeFlow {
            num: unsigned("clienttype", &d[i])?,
            volume: unsigned("clienttype", &d[i + 1])?,
        })
    };
    let ct = &mut instrument.client_type;
    ct.legal.buy = flow(0)?;
    ct.legal.sell = flow(2)?;
    ct.natural.buy = flow(4)?;
    ct.natural.sell = flow(6)?;
    Ok(())
}
