//! Subscription channels for websocket clients
//!
//! Each ISIN gets an [`InstrumentChannel`] holding the clients subscribed to
//! its trade, order book and client-type data. Clients register an outbound
//! sender; pushes are delivered through it as ready-to-send JSON text.

use crate::protocol::{self, Action, Channel, Command};
use crate::repository::{MarketRealtimeData, MarketUpdate};
use crate::{PusherError, Result};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use uuid::Uuid;

/// Identifies one websocket connection
pub type ClientId = Uuid;

/// Subscribers of a single instrument
#[derive(Debug, Default, Clone)]
pub struct InstrumentChannel {
    pub isin: String,
    pub trade_subscribers: HashSet<ClientId>,
    pub orderbook_subscribers: HashSet<ClientId>,
    pub clienttype_subscribers: HashSet<ClientId>,
}

impl InstrumentChannel {
    pub fn new(isin: impl Into<String>) -> Self {
        Self {
            isin: isin.into(),
            ..Default::default()
        }
    }

    /// Apply a (un)subscription for `channel`; `All` covers every set
    pub fn apply(&mut self, client: ClientId, action: Action, channel: Channel) {
        let sets: Vec<&mut HashSet<ClientId>> = match channel {
            Channel::All => vec![
                &mut self.trade_subscribers,
                &mut self.orderbook_subscribers,
                &mut self.clienttype_subscribers,
            ],
            Channel::Trade => vec![&mut self.trade_subscribers],
            Channel::OrderBook => vec![&mut self.orderbook_subscribers],
            Channel::ClientType => vec![&mut self.clienttype_subscribers],
        };
        for set in sets {
            match action {
                Action::Subscribe => {
                    set.insert(client);
                }
                Action::Unsubscribe => {
                    set.remove(&client);
                }
            }
        }
    }

    pub fn subscribers(&self, channel: Channel) -> HashSet<ClientId> {
        match channel {
            Channel::All => self
                .trade_subscribers
                .iter()
                .chain(&self.orderbook_subscribers)
                .chain(&self.clienttype_subscribers)
                .copied()
                .collect(),
            Channel::Trade => self.trade_subscribers.clone(),
            Channel::OrderBook => self.orderbook_subscribers.clone(),
            Channel::ClientType => self.clienttype_subscribers.clone(),
        }
    }

    /// True when no client is subscribed to any of the channels
    pub fn is_empty(&self) -> bool {
        self.trade_subscribers.is_empty()
            && self.orderbook_subscribers.is_empty()
            && self.clienttype_subscribers.is_empty()
    }

    fn remove(&mut self, client: &ClientId) {
        self.trade_subscribers.remove(client);
        self.orderbook_subscribers.remove(client);
        self.clienttype_subscribers.remove(client);
    }
}

#[derive(Debug, Default)]
struct HubState {
    channels: HashMap<String, InstrumentChannel>,
    clients: HashMap<ClientId, UnboundedSender<String>>,
}

/// Routes market updates to subscribed websocket clients
///
/// Channels only exist while they have subscribers.
///
/// Lock order: the hub lock is taken before the repository lock, never the
/// other way around.
#[derive(Debug, Default)]
pub struct ChannelHub {
    state: Mutex<HubState>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the outbound sender of a newly connected client
    pub fn register(&self, client: ClientId, sender: UnboundedSender<String>) -> Result<()> {
        let mut state = self.lock()?;
        state.clients.insert(client, sender);
        Ok(())
    }

    /// Remove a client from all channels and drop its sender
    pub fn remove_client(&self, client: ClientId) -> Result<()> {
        let mut state = self.lock()?;
        state.clients.remove(&client);
        state.channels.retain(|_, channel| {
            channel.remove(&client);
            !channel.is_empty()
        });
        Ok(())
    }

    /// Drop every outbound sender so connection tasks wind down
    pub fn disconnect_all(&self) -> Result<usize> {
        let mut state = self.lock()?;
        let count = state.clients.len();
        state.clients.clear();
        state.channels.clear();
        info!("Disconnected {} clients", count);
        Ok(count)
    }

    pub fn channel_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.channels.len())
            .unwrap_or(0)
    }

    pub fn client_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.clients.len())
            .unwrap_or(0)
    }

    /// Current subscribers of `isin` on `channel`
    pub fn subscribers(&self, isin: &str, channel: Channel) -> Result<HashSet<ClientId>> {
        let state = self.lock()?;
        Ok(state
            .channels
            .get(isin)
            .map(|c| c.subscribers(channel))
            .unwrap_or_default())
    }

    /// Handle a single subscription message from a client
    ///
    /// Returns the initial data to send back, or `None` when there is
    /// nothing to send (unsubscriptions, unknown instruments).
    ///
    /// The snapshot is read while the hub lock is held, so any update
    /// published after it is pushed to the new subscriber.
    pub fn handle_message(
        &self,
        client: ClientId,
        message: &str,
        repository: &MarketRealtimeData,
    ) -> Result<Option<Value>> {
        let command: Command = message.parse()?;

        let mut state = self.lock()?;
        if command.action == Action::Unsubscribe {
            for isin in &command.isins {
                let Some(channel) = state.channels.get_mut(isin) else {
                    continue;
                };
                channel.apply(client, command.action, command.channel);
                if channel.is_empty() {
                    debug!("Dropping empty channel for [{}]", isin);
                    state.channels.remove(isin);
                }
            }
            return Ok(None);
        }

        let instruments = repository.get_instruments(&command.isins)?;
        let mut initial_data = Map::new();
        for (isin, instrument) in command.isins.iter().zip(instruments) {
            let channel = state.channels.entry(isin.clone()).or_insert_with(|| {
                info!("New channel for [{}]", isin);
                InstrumentChannel::new(isin.clone())
            });
            channel.apply(client, command.action, command.channel);

            if let Some(instrument) = instrument {
                initial_data.insert(
                    isin.clone(),
                    Value::Object(protocol::channel_payload(command.channel, &instrument)),
                );
            }
        }

        if initial_data.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::Object(initial_data)))
        }
    }

    /// Deliver an update to its subscribers, returning the number of deliveries
    ///
    /// Thresholds changes go to trade subscribers.
    pub fn push(&self, update: &MarketUpdate) -> Result<usize> {
        let (channel, name, data) = match update {
            MarketUpdate::Trade(instrument) => {
                (Channel::Trade, "trade", protocol::trade_payload(instrument))
            }
            MarketUpdate::Thresholds(instrument) => (
                Channel::Trade,
                "thresholds",
                protocol::thresholds_payload(instrument),
            ),
            MarketUpdate::OrderBook { instrument, rows } => (
                Channel::OrderBook,
                "orderbook",
                protocol::orderbook_payload(instrument, Some(rows.as_slice())),
            ),
            MarketUpdate::ClientType(instrument) => (
                Channel::ClientType,
                "clienttype",
                protocol::clienttype_payload(instrument),
            ),
        };

        let state = self.lock()?;
        let Some(instrument_channel) = state.channels.get(update.isin()) else {
            return Ok(0);
        };
        let subscribers = instrument_channel.subscribers(channel);
        if subscribers.is_empty() {
            return Ok(0);
        }

        let message = protocol::envelope(update.isin(), name, data).to_string();
        let mut delivered = 0;
        for client in subscribers {
            match state.clients.get(&client) {
                Some(sender) if sender.send(message.clone()).is_ok() => delivered += 1,
                _ => debug!("Client [{}] is gone, skipping push", client),
            }
        }
        Ok(delivered)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HubState>> {
        self.state
            .lock()
            .map_err(|_| PusherError::LockPoisoned("channels"))
    }
}
