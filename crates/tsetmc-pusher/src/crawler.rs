//! Background crawler feeding the repository from a market-watch source

use crate::repository::MarketRealtimeData;
use crate::source::MarketWatchSource;
use crate::timing::MarketHours;
use crate::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

/// Polls a [`MarketWatchSource`] during market hours
pub struct MarketWatchCrawler<S> {
    source: S,
    repository: Arc<MarketRealtimeData>,
    hours: MarketHours,
    interval: Duration,
    client_type_every: u64,
    steps: AtomicU64,
}

impl<S: MarketWatchSource> MarketWatchCrawler<S> {
    pub fn new(source: S, repository: Arc<MarketRealtimeData>, hours: MarketHours) -> Self {
        Self {
            source,
            repository,
            hours,
            interval: Duration::from_secs(1),
            client_type_every: 10,
            steps: AtomicU64::new(0),
        }
    }

    /// Delay between two polls
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fetch client type on every `n`th poll
    pub fn with_client_type_every(mut self, n: u64) -> Self {
        self.client_type_every = n.max(1);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run a single poll, returning the number of updates applied
    pub async fn step(&self) -> Result<usize> {
        let step = self.steps.fetch_add(1, Ordering::Relaxed);

        let trade_data = self.source.trade_data().await?;
        let mut updates = self
            .repository
            .apply_new_trade_data(&trade_data, self.hours.today())?;

        if step % self.client_type_every == 0 {
            let client_type = self.source.client_type().await?;
            updates += self.repository.apply_new_client_type(&client_type)?;
        }

        debug!(
            "Crawl step {} applied {} updates from {} rows",
            step,
            updates,
            trade_data.len()
        );
        Ok(updates)
    }

    /// Poll until market close, waiting for the open first
    pub async fn run(&self) {
        if self.hours.now().time() < self.hours.open {
            info!("Waiting for market open at {}", self.hours.open);
            self.hours.sleep_until(self.hours.open).await;
        }

        info!("Market watch crawler started");
        loop {
            if self.hours.now().time() >= self.hours.close {
                info!("Market closed, crawler stopping");
                break;
            }
            if let Err(e) = self.step().await {
                error!("Error crawling market watch: {}", e);
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Spawn the crawler in the background
pub fn spawn_crawler<S>(crawler: MarketWatchCrawler<S>) -> tokio::task::JoinHandle<()>
where
    S: MarketWatchSource + 'static,
{
    tokio::spawn(async move {
        crawler.run().await;
    })
}
