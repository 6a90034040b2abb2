//! Row operations for the `partial_traces` table
//!
//! Every operation is generic over [`PgExecutor`], so the same statements
//! run against the pool (autocommit) or against the connection inside a
//! transaction closure.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::error::StoreResult;

/// A span persisted mid-flight, awaiting either a stop or a timeout-driven
/// synthetic completion.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PartialTrace {
    /// 32-char lowercase hex trace id
    pub trace_id: String,
    /// 16-char lowercase hex span id
    pub span_id: String,
    /// Serialized single-span OTLP trace envelope
    pub trace: Vec<u8>,
    /// When the row was last written
    #[sqlx(rename = "timestamp")]
    pub received_at: DateTime<Utc>,
    /// When the row becomes eligible for collection
    pub expires_at: DateTime<Utc>,
}

/// An expired row as returned by the collection scan.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ExpiredTrace {
    pub trace_id: String,
    pub span_id: String,
    pub trace: Vec<u8>,
}

const PUT_SQL: &str = "\
INSERT INTO partial_traces (trace_id, span_id, trace, timestamp, expires_at)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (trace_id, span_id) DO UPDATE
SET trace = $3, timestamp = $4, expires_at = $5";

const DELETE_SQL: &str = "DELETE FROM partial_traces WHERE trace_id = $1 AND span_id = $2";

const GET_SQL: &str = "\
SELECT trace_id, span_id, trace, timestamp, expires_at FROM partial_traces
WHERE trace_id = $1 AND span_id = $2";

const LIST_EXPIRED_SQL: &str = "\
SELECT trace_id, span_id, trace FROM partial_traces
WHERE expires_at < $1
FOR UPDATE";

/// Upsert a row by `(trace_id, span_id)`; a conflict replaces the payload
/// and both timestamps.
pub async fn put<'e, E: PgExecutor<'e>>(executor: E, row: &PartialTrace) -> StoreResult<()> {
    sqlx::query(PUT_SQL)
        .bind(&row.trace_id)
        .bind(&row.span_id)
        .bind(row.trace.as_slice())
        .bind(row.received_at)
        .bind(row.expires_at)
        .execute(executor)
        .await?;
    Ok(())
}

/// Delete a row by key; succeeds when the row is absent.
pub async fn delete<'e, E: PgExecutor<'e>>(
    executor: E,
    trace_id: &str,
    span_id: &str,
) -> StoreResult<()> {
    sqlx::query(DELETE_SQL)
        .bind(trace_id)
        .bind(span_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Fetch a row by key.
pub async fn get<'e, E: PgExecutor<'e>>(
    executor: E,
    trace_id: &str,
    span_id: &str,
) -> StoreResult<Option<PartialTrace>> {
    Ok(sqlx::query_as::<_, PartialTrace>(GET_SQL)
        .bind(trace_id)
        .bind(span_id)
        .fetch_optional(executor)
        .await?)
}

/// Rows with `expires_at` strictly before `now`.
///
/// Returned rows are locked for update until the surrounding transaction
/// ends, so two concurrent collectors cannot select the same row.
pub async fn list_expired<'e, E: PgExecutor<'e>>(
    executor: E,
    now: DateTime<Utc>,
) -> StoreResult<Vec<ExpiredTrace>> {
    Ok(sqlx::query_as::<_, ExpiredTrace>(LIST_EXPIRED_SQL)
        .bind(now)
        .fetch_all(executor)
        .await?)
}
