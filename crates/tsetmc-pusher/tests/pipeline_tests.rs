//! End-to-end tests from a market-watch source to subscribed clients

use serde_json::Value;
use std::sync::Arc;
use time::macros::time;
use tokio::sync::mpsc;
use tsetmc_pusher::*;
use uuid::Uuid;

const FOLD: &str = "IRO1FOLD0001";

fn fold_row(last_trade: time::Time, last_price: i64) -> MarketWatchTradeData {
    let mut row = MarketWatchTradeData::new(
        InstrumentIdentification {
            isin: FOLD.to_string(),
            tsetmc_code: "46348559193224090".to_string(),
            ticker: "FOLD".to_string(),
            name_persian: "Foolad".to_string(),
        },
        last_trade,
    );
    row.intraday_trade_candle.last_price = last_price;
    row.order_limitations = OrderLimitations {
        max_price: 5500,
        min_price: 5000,
    };
    row
}

fn natural_buyers(num: u64) -> MarketWatchClientTypeData {
    let mut client_type = ClientType::default();
    client_type.natural.buy.num = num;
    MarketWatchClientTypeData {
        tsetmc_code: "46348559193224090".to_string(),
        client_type,
    }
}

fn drain(
    repository_updates: &mut tokio::sync::broadcast::Receiver<MarketUpdate>,
    hub: &ChannelHub,
) -> usize {
    let mut delivered = 0;
    while let Ok(update) = repository_updates.try_recv() {
        delivered += hub.push(&update).unwrap();
    }
    delivered
}

#[tokio::test]
async fn test_crawler_step_feeds_subscribers() {
    let repository = Arc::new(MarketRealtimeData::new(64));
    let hub = ChannelHub::new();
    let mut updates = repository.subscribe();

    let source = StaticSource::new(vec![fold_row(time!(9:00), 5230)], vec![natural_buyers(3)]);
    let crawler = MarketWatchCrawler::new(source, repository.clone(), MarketHours::default())
        .with_client_type_every(2);

    // First step creates the instrument and applies client type
    let applied = crawler.step().await.unwrap();
    assert_eq!(applied, 3); // trade, thresholds, client type
    drain(&mut updates, &hub);

    let client = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub.register(client, tx).unwrap();
    let initial = hub
        .handle_message(client, &format!("1.all.{}", FOLD), &repository)
        .unwrap()
        .unwrap();
    assert_eq!(initial[FOLD]["thresholds"], serde_json::json!([5500, 5000]));
    assert_eq!(initial[FOLD]["clienttype"][4], 3);

    // Second step: no client type fetch, trade moves on
    crawler
        .source()
        .set_trade_data(vec![fold_row(time!(9:01), 5240)])
        .unwrap();
    let applied = crawler.step().await.unwrap();
    assert_eq!(applied, 1);
    assert_eq!(drain(&mut updates, &hub), 1);

    let pushed: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(pushed[FOLD]["trade"][1], 5240);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unsubscribed_client_stops_receiving() {
    let repository = Arc::new(MarketRealtimeData::new(64));
    let hub = ChannelHub::new();
    let mut updates = repository.subscribe();

    let source = StaticSource::new(vec![fold_row(time!(9:00), 5230)], Vec::new());
    let crawler = MarketWatchCrawler::new(source, repository.clone(), MarketHours::default());

    let client = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub.register(client, tx).unwrap();

    // Subscribing before the instrument exists still opens the channel
    let initial = hub
        .handle_message(client, &format!("1.trade.{}", FOLD), &repository)
        .unwrap();
    assert!(initial.is_none());

    crawler.step().await.unwrap();
    // Trade and thresholds both go to trade subscribers
    assert_eq!(drain(&mut updates, &hub), 2);
    let first: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    let second: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert!(first[FOLD].get("trade").is_some());
    assert_eq!(second[FOLD]["thresholds"], serde_json::json!([5500, 5000]));

    hub.handle_message(client, &format!("0.trade.{}", FOLD), &repository).unwrap();
    crawler
        .source()
        .set_trade_data(vec![fold_row(time!(9:02), 5250)])
        .unwrap();
    crawler.step().await.unwrap();
    assert_eq!(drain(&mut updates, &hub), 0);
    assert!(rx.try_recv().is_err());
}
