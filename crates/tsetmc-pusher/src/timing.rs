//! Market hours in the exchange's local time

use crate::{PusherError, Result};
use std::time::Duration;
use time::macros::{format_description, offset, time};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use tracing::debug;

/// Trading session bounds in the exchange's local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketHours {
    pub open: Time,
    pub close: Time,
    pub utc_offset: UtcOffset,
}

impl MarketHours {
    pub fn new(open: Time, close: Time, utc_offset: UtcOffset) -> Self {
        Self {
            open,
            close,
            utc_offset,
        }
    }

    /// Current time at the exchange
    pub fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.utc_offset)
    }

    /// Current date at the exchange
    pub fn today(&self) -> Date {
        self.now().date()
    }

    pub fn is_open_at(&self, now: OffsetDateTime) -> bool {
        let local = now.to_offset(self.utc_offset).time();
        local >= self.open && local < self.close
    }

    pub fn is_open(&self) -> bool {
        self.is_open_at(self.now())
    }

    /// Time left from `now` until `target` on the same exchange day, zero if it passed
    pub fn duration_until(&self, target: Time, now: OffsetDateTime) -> Duration {
        let now = now.to_offset(self.utc_offset);
        let target = PrimitiveDateTime::new(now.date(), target).assume_offset(self.utc_offset);
        Duration::try_from(target - now).unwrap_or(Duration::ZERO)
    }

    /// Sleep until `target` in exchange time, returning at once if it passed
    pub async fn sleep_until(&self, target: Time) {
        let wait = self.duration_until(target, self.now());
        debug!("Sleeping {:?} until {}", wait, target);
        tokio::time::sleep(wait).await;
    }
}

impl Default for MarketHours {
    fn default() -> Self {
        Self {
            open: time!(8:30),
            close: time!(12:30),
            utc_offset: offset!(+3:30),
        }
    }
}

/// Parse a `HH:MM` time of day
pub fn parse_time(text: &str) -> Result<Time> {
    Time::parse(text.trim(), format_description!("[hour]:[minute]"))
        .map_err(|e| PusherError::Config(format!("time [{}]: {}", text, e)))
}

/// Parse a `+HH:MM` UTC offset
pub fn parse_offset(text: &str) -> Result<UtcOffset> {
    UtcOffset::parse(
        text.trim(),
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .map_err(|e| PusherError::Config(format!("offset [{}]: {}", text, e)))
}
