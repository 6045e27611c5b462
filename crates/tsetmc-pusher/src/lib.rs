//! # TSETMC Pusher
//!
//! Realtime market data for the Tehran Stock Exchange, kept in memory and
//! fanned out to websocket subscribers:
//! - Market-watch polling of the TSETMC feeds
//! - A shared repository of every instrument's live state
//! - Change detection emitted as typed [`MarketUpdate`] events
//! - Per-instrument subscription channels for trade, order book and client type
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tsetmc_pusher::*;
//!
//! # async fn example() -> Result<()> {
//! let repository = Arc::new(MarketRealtimeData::new(1024));
//! let hub = Arc::new(ChannelHub::new());
//!
//! let mut updates = repository.subscribe();
//! let source = StaticSource::new(Vec::new(), Vec::new());
//! let crawler = MarketWatchCrawler::new(source, repository.clone(), MarketHours::default());
//! crawler.step().await?;
//!
//! while let Ok(update) = updates.try_recv() {
//!     hub.push(&update)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod crawler;
pub mod error;
pub mod hub;
pub mod models;
pub mod protocol;
pub mod repository;
pub mod source;
pub mod timing;

pub use crawler::MarketWatchCrawler;
pub use error::{ProtocolError, PusherError, Result, SourceError};
pub use hub::{ChannelHub, ClientId};
pub use models::*;
pub use protocol::{Action, Channel, Command};
pub use repository::{MarketRealtimeData, MarketUpdate};
pub use source::{MarketWatchSource, StaticSource};
pub use timing::MarketHours;

#[cfg(feature = "tsetmc")]
pub use source::tsetmc::TsetmcSource;

/// Get the library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
