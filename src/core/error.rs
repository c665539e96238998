//! Library error type

use thiserror::Error;

/// Faults raised by the store, the search engine and configuration loading.
///
/// Absence and duplication are not errors here; store mutators report them
/// through [`crate::search::store::Outcome`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("embedding dimension mismatch: store holds {expected}-d vectors, got {found}-d")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("corrupt embedding blob: {len} bytes is not a whole number of f32 values")]
    CorruptEmbedding { len: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigFormat(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid path pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store lock poisoned")]
    LockPoisoned,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
