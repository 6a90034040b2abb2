//! Error types for tracevault-pipeline

use std::fmt;

use thiserror::Error;
use tracevault_core::{CoreError, SpanKey};
use tracevault_store::StoreError;

use crate::consumer::ConsumerError;

/// Errors from ingesting a batch of log records.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The embedded trace payload could not be deserialized; fatal for the
    /// whole batch
    #[error("failed to decode trace payload: {0}")]
    Payload(#[source] CoreError),

    /// A flattened envelope carried no span
    #[error("trace envelope has no span")]
    EmptyTrace,

    /// The expiry window does not fit a timestamp
    #[error("heartbeat interval {interval:?} with expiry factor {factor} overflows the expiry window")]
    ExpiryOverflow {
        interval: std::time::Duration,
        factor: u32,
    },

    /// A row operation failed
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// Per-span failures accumulated across the batch
    #[error("batch completed with errors: {0}")]
    Batch(ErrorList),
}

/// Per-span errors joined at batch end.
#[derive(Debug, Default)]
pub struct ErrorList(pub Vec<IngestError>);

impl fmt::Display for ErrorList {
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

/// Errors from a single collector pass.
#[derive(Debug, Error)]
pub enum GcError {
    /// The pass's transaction failed as a whole
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// Per-row failures; the pass still committed and the affected rows
    /// stay for the next one
    #[error("collection pass completed with row errors: {0}")]
    Rows(RowErrorList),
}

/// A failure while finalizing one expired row.
#[derive(Debug, Error)]
#[error("{key}: {kind}")]
pub struct RowFailure {
    pub key: SpanKey,
    #[source]
    pub kind: RowError,
}

/// What went wrong with one row.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("failed to decode stored trace: {0}")]
    Decode(#[source] CoreError),

    #[error("stored trace has no span")]
    EmptyTrace,

    #[error("downstream consumer rejected trace: {0}")]
    Consumer(#[source] ConsumerError),

    #[error("failed to delete row: {0}")]
    Delete(#[source] StoreError),
}

/// Row failures joined at the end of a pass.
#[derive(Debug, Default)]
pub struct RowErrorList(pub Vec<RowFailure>);

impl fmt::Display for RowErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_list_display_joins() {
        let list = ErrorList(vec![IngestError::EmptyTrace, IngestError::EmptyTrace]);
        assert_eq!(
            list.to_string(),
            "trace envelope has no span; trace envelope has no span"
        );
    }

    #[test]
    fn test_row_failure_names_the_key() {
        let failure = RowFailure {
            key: SpanKey {
                trace_id: "aa".repeat(16),
                span_id: "bb".repeat(8),
            },
            kind: RowError::EmptyTrace,
        };
        let rendered = failure.to_string();
        assert!(rendered.contains(&"aa".repeat(16)));
        assert!(rendered.contains("no span"));
    }
}
