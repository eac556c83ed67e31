//! Error types for the id mapper

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while interning strings
///
/// The first four variants are recoverable and are handled inside the mapper;
/// callers only ever observe the fatal kinds (see [`Error::is_fatal`]).
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    // =========================================================================
    // Recoverable Store Conditions
    // =========================================================================
    /// Backing table does not exist
    #[error("Table not found: {table}")]
    NotFound { table: String },

    /// Store does not know the requested character set
    #[error("Character set not supported by the store: {encoding}")]
    EncodingUnsupported { encoding: String },

    /// Another writer inserted the same key first
    #[error("Duplicate key in table {table}")]
    DuplicateKey { table: String },

    /// Key cannot be represented in the column's character set
    #[error("Key cannot be encoded for table {table}")]
    EncodingRejected { table: String },

    // =========================================================================
    // Fatal Errors
    // =========================================================================
    /// Generic store failure (connectivity, corrupted schema, driver error)
    #[error("Store error: {0}")]
    Store(String),

    /// SQLite driver error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Background task failed to complete
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for errors that must abort the operation that raised them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::NotFound { .. }
                | Error::EncodingUnsupported { .. }
                | Error::DuplicateKey { .. }
                | Error::EncodingRejected { .. }
        )
    }

    pub fn not_found(table: impl Into<String>) -> Self {
        Error::NotFound {
            table: table.into(),
        }
    }
}
