//! Error types for the pusher library
//!
//! `PusherError` is the root type. Protocol and feed errors have their own
//! enums so callers can match on what went wrong with a message or a feed.

use thiserror::Error;

/// Main error type for the pusher library
#[derive(Error, Debug)]
pub enum PusherError {
    /// Subscription message could not be understood
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Market data feed could not be fetched or parsed
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Time error: {0}")]
    Time(#[from] time::error::ComponentRange),

    #[error("Invalid configuration value: {0}")]
    Config(String),
}

/// Errors in a client's subscription message
///
/// Messages have the shape `<Action>.<Channel>.<Isin1>,<Isin2>,...`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Message [{0}] has unacceptable format")]
    Format(String),

    #[error("Action [{0}] is not acceptable")]
    UnknownAction(String),

    #[error("Channel [{0}] is not acceptable")]
    UnknownChannel(String),

    #[error("Isin [{0}] is not acceptable")]
    InvalidIsin(String),
}

/// Errors while fetching or parsing the TSETMC feeds
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Feed request failed: {0}")]
    Request(String),

    #[error("Feed is missing section {section}")]
    MissingSection { section: usize },

    #[error("Invalid number in field {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

#[cfg(feature = "tsetmc")]
impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Request(e.to_string())
    }
}

#[cfg(feature = "tsetmc")]
impl From<reqwest::Error> for PusherError {
    fn from(e: reqwest::Error) -> Self {
        PusherError::Source(e.into())
    }
}

/// Result type for pusher operations
pub type Result<T> = std::result::Result<T, PusherError>;
