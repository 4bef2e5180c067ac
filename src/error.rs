//! Error types for zero-postgres-stdlib.

use thiserror::Error;

use crate::sql::IsolationLevel;

/// Result type for zero-postgres-stdlib operations.
pub type Result<T> = core::result::Result<T, Error>;

/// PostgreSQL error/notice field types.
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in query string (1-based)
    pub position: Option<u32>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error type for zero-postgres-stdlib.
#[derive(Debug, Error)]
pub enum Error {
    /// The physical connection is unusable; the pool must discard it and retry
    /// on a fresh one.
    #[error("driver: bad connection")]
    BadConn,

    /// Server error response
    #[error("PostgreSQL error: {0}")]
    Server(ErrorFields),

    /// Protocol error (malformed message, unexpected response, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request failed before any byte of it reached the server.
    #[error("request not sent: {0}")]
    NotSent(Box<Error>),

    /// The caller's deadline passed.
    #[error("context deadline exceeded")]
    Timeout,

    /// The caller cancelled the operation.
    #[error("context canceled")]
    Cancelled,

    /// Connection is broken and cannot be reused
    #[error("Connection is broken")]
    ConnectionBroken,

    /// Value decoding failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Decoding column `index` of the current row failed.
    #[error("scan field {index} failed: {source}")]
    ScanField {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// The requested isolation level has no native equivalent.
    #[error("unsupported isolation: {0}")]
    UnsupportedIsolation(IsolationLevel),

    /// A session borrow was attempted on a connection that is not backed by
    /// this driver.
    #[error("not a zero-postgres-stdlib connection pool")]
    NotThisDriver,

    /// A session was released that is not currently borrowed.
    #[error("can't release session that is not acquired")]
    NotAcquired,

    /// Entry point that is intentionally not implemented.
    #[error("{0} deprecated and not implemented")]
    Deprecated(&'static str),

    /// Invalid usage (e.g., wrong destination length)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Connection string or configuration could not be parsed
    #[error("Invalid config: {0}")]
    Config(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The post-connect hook rejected a new session.
    #[error("after connect hook failed: {0}")]
    Hook(Box<Error>),
}

impl Error {
    /// Returns true if this is the bad-connection signal.
    pub fn is_bad_conn(&self) -> bool {
        matches!(self, Error::BadConn)
    }

    /// Returns true if the failed request never reached the server, so sending
    /// it again on another connection cannot apply it twice.
    pub fn safe_to_retry(&self) -> bool {
        matches!(self, Error::NotSent(_))
    }

    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::ConnectionBroken | Error::BadConn | Error::NotSent(_) => true,
            Error::Server(fields) => {
                // FATAL and PANIC errors indicate connection is broken
                matches!(
                    fields.severity.as_deref(),
                    Some("FATAL") | Some("PANIC")
                )
            }
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.code.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn scan_field(index: usize, source: Error) -> Self {
        Error::ScanField {
            index,
            source: Box::new(source),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::ConnectionBroken
    }
}
