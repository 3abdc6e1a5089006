//! Error types for the settlement orchestrator

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the settlement orchestrator
#[derive(Error, Debug)]
pub enum Error {
    // Caller-visible domain failures
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bank settlement failed: {0}")]
    Settlement(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Ledger errors (absorbed by the gateway, never returned from a settlement flow)
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Ledger rejected request: {0}")]
    LedgerRejected(String),

    #[error("Ledger timeout after {0}ms")]
    LedgerTimeout(u64),

    #[error("Ledger connection failed: {0}")]
    LedgerConnection(String),

    // Bank transport errors
    #[error("Bank error: {0}")]
    Bank(String),

    // Storage errors
    #[error("Persistence failed: {0}")]
    Persistence(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Ledger(_)
                | Error::LedgerTimeout(_)
                | Error::LedgerConnection(_)
                | Error::Bank(_)
        )
    }

    /// Check if this error was caused by the caller's request or wallet state
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::Precondition(_)
                | Error::Conflict(_)
                | Error::NotFound(_)
                | Error::Settlement(_)
                | Error::Unauthorized(_)
        )
    }

    /// Stable label for logs and API responses
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Precondition(_) => "precondition",
            Error::Conflict(_) => "conflict",
            Error::NotFound(_) => "not_found",
            Error::Settlement(_) => "settlement",
            Error::Unauthorized(_) => "unauthorized",
            Error::Config(_) => "config",
            Error::Ledger(_)
            | Error::LedgerRejected(_)
            | Error::LedgerTimeout(_)
            | Error::LedgerConnection(_) => "ledger",
            Error::Bank(_) => "bank",
            Error::Persistence(_) => "persistence",
            Error::Serialization(_) | Error::Deserialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Internal(_) | Error::Anyhow(_) => "internal",
        }
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Error::LedgerConnection(e.to_string())
        } else {
            Error::Ledger(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from tokio task join errors
impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Task join error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors() {
        assert!(Error::Validation("amount".into()).is_caller_error());
        assert!(Error::Settlement("bank".into()).is_caller_error());
        assert!(!Error::Persistence("disk".into()).is_caller_error());
    }

    #[test]
    fn test_retryable() {
        assert!(Error::LedgerTimeout(5000).is_retryable());
        assert!(!Error::Precondition("wallet not active".into()).is_retryable());
        assert!(!Error::LedgerRejected("HTTP 400".into()).is_retryable());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(Error::NotFound("x".into()).kind(), "not_found");
        assert_eq!(Error::LedgerConnection("refused".into()).kind(), "ledger");
        assert_eq!(Error::LedgerRejected("HTTP 422".into()).kind(), "ledger");
    }
}
