//! Error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Fewer than 16 bytes were available for a change record.
    #[error("truncated change record: {len} of 16 bytes")]
    TruncatedRecord { len: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache capacity below the allowed floor.
    #[error("invalid cache capacity {requested} (minimum is {minimum})")]
    InvalidCapacity { requested: usize, minimum: usize },

    #[error("invalid retention limit: {0}")]
    InvalidLimit(String),

    #[error("invalid world: {0}")]
    InvalidWorld(String),

    #[error("malformed json: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
