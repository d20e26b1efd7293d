//! Error taxonomy shared by every component.
//!
//! The broker, worker, and GC never let a component-level error escape their tick
//! functions uncaught: `ServiceUnavailable` is the one variant they treat as
//! retriable, sleeping the loop interval before trying again. Everything else is
//! either a caller mistake (`InvalidArgument`, `Unauthorized`, `Forbidden`,
//! `NotFound`, `Conflict`) or a bug (`Internal`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The seven-member error taxonomy. Kinds, not exception types: a frontend adapter
/// maps `kind()` to an HTTP status without this crate depending on any HTTP stack.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// The taxonomy name, independent of any Display message. Frontend adapters that
/// want an HTTP status code match on this rather than on `Error` variants directly,
/// keeping the mapping in one place outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ServiceUnavailable,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Unauthorized => ErrorKind::Unauthorized,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the broker/worker/GC loops should treat this as transient and retry
    /// on the next tick rather than surfacing it against a specific request.
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::ServiceUnavailable)
    }
}
