use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("concurrent update detected")]
    ConcurrencyConflict,
    #[error("broker error: {0}")]
    Broker(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl LedgerError {
    /// A concurrency conflict is the only failure worth retrying at the
    /// balance stage; everything else is deterministic.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict)
    }
}
