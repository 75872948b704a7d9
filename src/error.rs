use thiserror::Error;

/// Input-tier errors: surfaced to the caller before any stage runs.
/// This is the only hard failure path of the pipeline; everything past
/// validation degrades instead of erroring.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("entry_text cannot be empty")]
    EmptyEntry,
    #[error("entry_text too long (max {0} characters)")]
    EntryTooLong(usize),
    #[error("Maximum {0} entries allowed per batch")]
    BatchTooLarge(usize),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid session token")]
    InvalidToken,
    #[error("session expired")]
    Expired,
    #[error("session lookup failed: {0}")]
    Store(#[from] rusqlite::Error),
}
