use coffer_core::{AccountId, AmountError, EventId};
use thiserror::Error;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The storage layer rejected an event insert because its dedupe key
    /// already exists. Not a failure: the writer degrades this to a
    /// Skipped outcome so concurrent imports of overlapping files stay
    /// correct.
    #[error("dedupe key already exists: {0}")]
    DuplicateDedupeKey(String),
    #[error("unknown instrument code: {0}")]
    UnknownInstrument(String),
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("event not found: {0}")]
    EventNotFound(EventId),
    #[error("transaction has no legs")]
    EmptyTransaction,
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}
