use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures of a single market-data fetch or lookup.
#[derive(Error, Debug)]
pub enum PriceError {
    #[error("Market data request failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Market data endpoint answered with status {0}")]
    Status(StatusCode),

    #[error("Malformed market data payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid price '{value}' for {symbol}")]
    Parse { symbol: String, value: String },

    #[error("Price data not found for symbol {0}")]
    NotFound(String),

    #[error("Value of {0} holdings is out of range")]
    Overflow(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid watch list: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt holding row: {0}")]
    Corrupt(String),
}
