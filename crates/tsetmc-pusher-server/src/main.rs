//! TSETMC Pusher Server
//!
//! Polls the TSETMC market watch during market hours and pushes realtime
//! trade, order book and client-type data to websocket subscribers.

use axum::{Router, extract::State, http::HeaderValue, response::Json, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tsetmc_pusher::{
    ChannelHub, MarketHours, MarketRealtimeData, MarketWatchCrawler, TsetmcSource,
    crawler::spawn_crawler,
};

mod config;
mod error;
mod pusher;
mod routes;

use config::ServerConfig;
use error::Result;

/// Main application state
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<MarketRealtimeData>,
    pub hub: Arc<ChannelHub>,
    pub config: ServerConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "tsetmc_pusher_server=debug,tsetmc_pusher=info,tower_http=debug".to_string()
        }))
        .init();

    // Load configuration
    let config = ServerConfig::from_env()?;
    let hours = config.market_hours();
    info!(
        "Starting TSETMC Pusher on {}:{} (market {}-{})",
        config.host, config.port, hours.open, hours.close
    );

    let repository = Arc::new(MarketRealtimeData::new(config.event_capacity));
    let hub = Arc::new(ChannelHub::new());

    // Start background pusher before any data arrives
    pusher::spawn_market_pusher(hub.clone(), repository.subscribe());

    // Start market watch crawler
    let source = TsetmcSource::new(config.tsetmc_base_url.as_str())?;
    let crawler = MarketWatchCrawler::new(source, repository.clone(), hours)
        .with_interval(config.crawl_interval())
        .with_client_type_every(config.client_type_every);
    spawn_crawler(crawler);

    let state = AppState {
        repository,
        hub: hub.clone(),
        config: config.clone(),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Serving has started on ws://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub, hours, config.shutdown_at_market_close))
        .await?;

    info!("Serving has ended");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        // Websocket, at the root like ws://host:port
        .route("/", get(routes::websocket::pusher_ws))
        .route("/ws", get(routes::websocket::pusher_ws))
        // Health check
        .route("/health", get(health_check))
        // API routes
        .nest("/api", api_routes())
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// API routes
fn api_routes() -> Router<AppState> {
    Router::new().nest("/instruments", routes::instruments::router())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Result<Json<Value>> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "tsetmc-pusher-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": time::OffsetDateTime::now_utc(),
        "instruments": state.repository.len(),
        "clients": state.hub.client_count(),
        "market_open": state.config.market_hours().is_open(),
    })))
}

/// Resolves at market close (when enabled) or on Ctrl-C, dropping all clients
async fn shutdown_signal(hub: Arc<ChannelHub>, hours: MarketHours, at_market_close: bool) {
    let market_close = async {
        if at_market_close {
            hours.sleep_until(hours.close).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = market_close => info!("Market closed at {}", hours.close),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutdown requested");
        }
    }

    if let Err(e) = hub.disconnect_all() {
        error!("Failed to disconnect clients: {}", e);
    }
}
