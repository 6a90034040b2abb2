//! Error types for tracevault-store

use std::fmt;

use thiserror::Error;

use crate::MAX_TX_ATTEMPTS;

/// Errors surfaced by the partial-trace store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection string did not parse
    #[error("invalid postgres connection string: {0}")]
    InvalidConnectionString(#[source] sqlx::Error),

    /// Any other backend failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A retryable transaction kept hitting serialization conflicts
    #[error("transaction failed after {MAX_TX_ATTEMPTS} attempts: {0}")]
    RetriesExhausted(JoinedErrors),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Postgres reports serialization conflicts as SQLSTATE `40001`; those
    /// are the only errors the transaction runner retries.
    pub fn is_serialization_failure(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(err)) => {
                err.code().as_deref() == Some("40001")
            }
            _ => false,
        }
    }
}

/// All errors collected across transaction attempts, displayed joined.
#[derive(Debug, Default)]
pub struct JoinedErrors(pub Vec<StoreError>);

impl fmt::Display for JoinedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}
