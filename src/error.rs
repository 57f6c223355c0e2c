//! Error taxonomy shared by the console sync and suggestion engines.
//!
//! Nothing here is fatal: every variant is caught where the failing call was
//! made and turned into a console line or a feedback message.

use thiserror::Error;

/// Failure of a single backend round-trip (run, fetch, clear, save, assist).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Connection refused, timeout, DNS, TLS...
    #[error("{0}")]
    Transport(String),
    /// Non-2xx HTTP status.
    #[error("Server error: {0}")]
    Status(u16),
    /// Body was not the JSON we expected.
    #[error("Malformed response: {0}")]
    Decode(String),
    /// Backend answered but reported `{"status": "error", "error": ...}`.
    #[error("{0}")]
    Rejected(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            BackendError::Status(status.as_u16())
        } else if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e.to_string())
    }
}

/// Why a suggestion transition could not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApplyFailure {
    #[error("no pending suggestion")]
    NoPendingSuggestion,
    #[error("no file is open")]
    NoDocument,
    #[error("selection is outside the document")]
    InvalidRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkbenchError {
    /// Blank input. Callers ignore it silently.
    #[error("input rejected")]
    InputRejected,
    #[error("File not found at path: {0}")]
    NotFound(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Could not apply changes: {0}")]
    Apply(#[from] ApplyFailure),
}
