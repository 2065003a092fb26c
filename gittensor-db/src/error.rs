//! Error types for gittensor-db

use thiserror::Error;

/// Main error type for the gittensor-db library
#[derive(Error, Debug)]
pub enum Error {
    /// Storage could not be reached or the handle is no longer usable
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// Statement failed to prepare, bind or run
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// A stored row did not match the shape an entity expects
    #[error("cannot decode column `{column}`: {message}")]
    Decode { column: String, message: String },

    /// A value could not be bound to a statement parameter
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Stored and computed pull request counts of an evaluation disagree
    #[error("stored total_prs ({stored}) disagrees with {computed} loaded pull requests")]
    PrCountMismatch { stored: i64, computed: i64 },

    /// A schema script did not apply
    #[error("migration {script} failed: {source}")]
    Migration {
        script: String,
        #[source]
        source: Box<Error>,
    },

    /// Malformed GitHub API payload
    #[error("invalid GitHub payload: {0}")]
    Payload(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn decode(column: &str, message: impl ToString) -> Self {
        Error::Decode {
            column: column.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for gittensor-db
pub type Result<T> = std::result::Result<T, Error>;
