//! Background task pushing repository updates to subscribed clients

use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use tsetmc_pusher::{ChannelHub, MarketUpdate};

/// Forwards every market update to the hub
pub struct MarketPusher {
    hub: Arc<ChannelHub>,
    updates: broadcast::Receiver<MarketUpdate>,
}

impl MarketPusher {
    pub fn new(hub: Arc<ChannelHub>, updates: broadcast::Receiver<MarketUpdate>) -> Self {
        Self { hub, updates }
    }

    /// Start the pusher loop
    pub async fn start(mut self) {
        info!("Starting market pusher");

        loop {
            match self.updates.recv().await {
                Ok(update) => match self.hub.push(&update) {
                    Ok(0) => {}
                    Ok(delivered) => {
                        debug!("Pushed update for [{}] to {} clients", update.isin(), delivered)
                    }
                    Err(e) => error!("Error pushing update for [{}]: {}", update.isin(), e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Market pusher lagged, {} updates skipped", skipped);
                }
                Err(RecvError::Closed) => {
                    info!("Update stream closed, shutting down pusher");
                    break;
                }
            }
        }
    }
}

/// Spawn the pusher in the background
pub fn spawn_market_pusher(
    hub: Arc<ChannelHub>,
    updates: broadcast::Receiver<MarketUpdate>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let pusher = MarketPusher::new(hub, updates);
        pusher.start().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::macros::{date, time};
    use tokio::sync::mpsc;
    use tsetmc_pusher::{InstrumentIdentification, MarketRealtimeData, MarketWatchTradeData};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_pusher_delivers_repository_updates() {
        let repository = Arc::new(MarketRealtimeData::new(16));
        let hub = Arc::new(ChannelHub::new());
        let client = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(client, tx).unwrap();
        hub.handle_message(client, "1.trade.IRO1FOLD0001", &repository).unwrap();

        let handle = spawn_market_pusher(hub.clone(), repository.subscribe());

        let mut row = MarketWatchTradeData::new(
            InstrumentIdentification::new("IRO1FOLD0001", "1"),
            time!(10:00),
        );
        row.intraday_trade_candle.last_price = 5230;
        repository
            .apply_new_trade_data(&[row], date!(2024 - 01 - 20))
            .unwrap();

        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let message: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(message["IRO1FOLD0001"]["trade"][1], 5230);
        assert_eq!(message["IRO1FOLD0001"]["trade"][2], "2024/01/20 10:00:00");

        // Dropping the repository closes the stream and ends the task
        drop(repository);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_pusher_keeps_delivering_after_lagging() {
        let repository = Arc::new(MarketRealtimeData::new(1));
        let hub = Arc::new(ChannelHub::new());
        let client = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(client, tx).unwrap();
        hub.handle_message(client, "1.trade.IRO1FOLD0001", &repository).unwrap();

        // Overflow the single-slot stream before the pusher starts reading
        let updates = repository.subscribe();
        for minute in 0..5u8 {
            let mut row = MarketWatchTradeData::new(
                InstrumentIdentification::new("IRO1FOLD0001", "1"),
                time::Time::from_hms(10, minute, 0).unwrap(),
            );
            row.intraday_trade_candle.last_price = 5230 + i64::from(minute);
            repository
                .apply_new_trade_data(&[row], date!(2024 - 01 - 20))
                .unwrap();
        }
        let _handle = spawn_market_pusher(hub.clone(), updates);

        // Only the newest update survived the overflow
        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let message: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(message["IRO1FOLD0001"]["trade"][1], 5234);

        // And later updates still get through
        let mut row = MarketWatchTradeData::new(
            InstrumentIdentification::new("IRO1FOLD0001", "1"),
            time!(10:30),
        );
        row.intraday_trade_candle.last_price = 5300;
        repository
            .apply_new_trade_data(&[row], date!(2024 - 01 - 20))
            .unwrap();
        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let message: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(message["IRO1FOLD0001"]["trade"][1], 5300);
    }
}
