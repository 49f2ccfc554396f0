//! Error types for the indexer

use crate::entities::EntityFamily;
use thiserror::Error;

/// Result type for indexer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Indexer errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Entity (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Event input could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed event field (address, hash, integer parameter)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Decimal count that is not a non-negative integer
    #[error("Invalid decimal count: {0}")]
    InvalidDecimals(String),

    /// Market referenced by a pool-token event was never listed
    #[error("Market not found: {0}")]
    MarketNotFound(String),

    /// Entity that the event source guarantees to exist is missing
    #[error("{family} not found: {id}")]
    EntityNotFound {
        /// Entity family
        family: EntityFamily,
        /// Entity id
        id: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Config(format!("metrics registration failed: {}", err))
    }
}
