//! Command line subscriber that logs realtime instrument updates

use tracing::{error, info};
use tsetmc_pusher::{Instrument, InstrumentIdentification};
use tsetmc_pusher_client::TsetmcClient;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tsetmc_pusher_client=info".to_string()),
        )
        .init();

    let url = std::env::var("PUSHER_URL").unwrap_or_else(|_| "ws://localhost:8765".to_string());
    let instruments: Vec<Instrument> = std::env::var("PUSHER_ISINS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|isin| !isin.is_empty())
        .map(|isin| Instrument::new(InstrumentIdentification::new(isin, "")))
        .collect();

    if instruments.is_empty() {
        error!("PUSHER_ISINS must list at least one ISIN");
        std::process::exit(1);
    }

    let mut client = TsetmcClient::new(url, instruments);
    let result = client
        .operate_with(|instrument| {
            let candle = &instrument.intraday_trade_candle;
            let best = instrument.orderbook.rows[0];
            info!(
                "[{}] last {} close {} volume {} | bid {}@{} ask {}@{}",
                instrument.isin(),
                candle.last_price,
                candle.close_price,
                candle.trade_volume,
                best.demand.volume,
                best.demand.price,
                best.supply.volume,
                best.supply.price,
            );
        })
        .await;

    if let Err(e) = result {
        error!("Client stopped: {}", e);
        std::process::exit(1);
    }
}
