use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid comparison mode: {0}")]
    InvalidMode(String),

    /// A dataset read failed or timed out. The cause is logged where it
    /// happens and deliberately not carried here.
    #[error("Insights are temporarily unavailable")]
    UpstreamUnavailable,

    #[error("Invalid metric query: {0}")]
    InvalidQuery(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import error: {0}")]
    Import(String),
}

impl Error {
    /// True for errors caused by the caller's input rather than the dataset.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidRange(_) | Error::InvalidMode(_) | Error::InvalidQuery(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_is_generic() {
        let msg = Error::UpstreamUnavailable.to_string();
        assert!(!msg.to_lowercase().contains("sqlite"));
        assert!(!msg.to_lowercase().contains("database"));
    }

    #[test]
    fn test_client_errors() {
        assert!(Error::InvalidRange("x".into()).is_client_error());
        assert!(Error::InvalidMode("x".into()).is_client_error());
        assert!(!Error::UpstreamUnavailable.is_client_error());
        assert!(!Error::Database("x".into()).is_client_error());
    }
}
