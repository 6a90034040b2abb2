//! Tracevault Store - Postgres persistence for partial traces
//!
//! This crate owns the only shared mutable resource in the system, the
//! `partial_traces` table, and the transactional discipline around it:
//!
//! - **Store**: pool management, schema bootstrap, pool-level row access
//! - **Transactions**: closure-in-transaction with isolation options and
//!   bounded retry on serialization conflicts
//! - **Rows**: upsert/delete/scan statements generic over executor

pub mod error;
pub mod partial_trace;

pub use error::{JoinedErrors, StoreError, StoreResult};
pub use partial_trace::{ExpiredTrace, PartialTrace};
// The transaction closure's connection type, re-exported so callers do not
// need their own sqlx dependency.
pub use sqlx::PgConnection;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::Acquire;
use tracing::{debug, info};

/// Maximum attempts for a retryable transaction.
pub const MAX_TX_ATTEMPTS: usize = 5;

/// Pause between attempts after a serialization conflict.
pub const TX_RETRY_BACKOFF: Duration = Duration::from_millis(100);

const POOL_SIZE: u32 = 5;

/// Transaction isolation level, rendered into `SET TRANSACTION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Options for [`Store::transact`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
    pub deferrable: bool,
}

impl TxOptions {
    /// `Serializable, ReadWrite, NotDeferrable`, the collector tick's
    /// options.
    pub fn serializable() -> Self {
        Self {
            isolation: IsolationLevel::Serializable,
            read_only: false,
            deferrable: false,
        }
    }

    /// Serialization conflicts are only possible (and only retried) at the
    /// two snapshot-based levels.
    fn retries_on_conflict(&self) -> bool {
        matches!(
            self.isolation,
            IsolationLevel::Serializable | IsolationLevel::RepeatableRead
        )
    }

    fn set_transaction_sql(&self) -> String {
        let isolation = match self.isolation {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        let access = if self.read_only {
            "READ ONLY"
        } else {
            "READ WRITE"
        };
        let deferrable = if self.deferrable {
            "DEFERRABLE"
        } else {
            "NOT DEFERRABLE"
        };
        format!("SET TRANSACTION ISOLATION LEVEL {isolation} {access} {deferrable}")
    }
}

/// Connection pool over the `partial_traces` table.
///
/// Cheap to clone; all clones share the pool. Transactional isolation is
/// the sole concurrency discipline; there are no in-process locks.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Parse the connection string, build the pool, and verify
    /// connectivity.
    pub async fn connect(conn_str: &str) -> StoreResult<Self> {
        let options =
            PgConnectOptions::from_str(conn_str).map_err(StoreError::InvalidConnectionString)?;
        let pool = PgPoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        info!("connected to postgres");
        Ok(Self { pool })
    }

    /// Create the `partial_traces` table when it does not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS partial_traces (
                trace_id TEXT NOT NULL,
                span_id TEXT NOT NULL,
                trace BYTEA NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (trace_id, span_id)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert a row by key. See [`partial_trace::put`].
    pub async fn put(&self, row: &PartialTrace) -> StoreResult<()> {
        partial_trace::put(&self.pool, row).await
    }

    /// Delete a row by key; idempotent. See [`partial_trace::delete`].
    pub async fn delete(&self, trace_id: &str, span_id: &str) -> StoreResult<()> {
        partial_trace::delete(&self.pool, trace_id, span_id).await
    }

    /// Fetch a row by key.
    pub async fn get(&self, trace_id: &str, span_id: &str) -> StoreResult<Option<PartialTrace>> {
        partial_trace::get(&self.pool, trace_id, span_id).await
    }

    /// Rows expired as of `now`. Outside a transaction the `FOR UPDATE`
    /// locks are released immediately; collectors call this through
    /// [`Store::transact`] instead.
    pub async fn list_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<ExpiredTrace>> {
        partial_trace::list_expired(&self.pool, now).await
    }

    /// Run `f` inside a transaction.
    ///
    /// `Serializable` and `RepeatableRead` transactions retry up to
    /// [`MAX_TX_ATTEMPTS`] times on serialization failures (SQLSTATE
    /// `40001`), sleeping [`TX_RETRY_BACKOFF`] between attempts; the
    /// closure re-runs from scratch on every attempt. Other errors abort
    /// immediately. Exhausting the retries returns all attempts joined.
    pub async fn transact<T, F>(&self, opts: TxOptions, f: F) -> StoreResult<T>
    where
        T: Send,
        F: for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, StoreResult<T>> + Send + Sync,
    {
        if opts.retries_on_conflict() {
            self.transact_with_retry(opts, &f).await
        } else {
            self.transact_once(opts, &f).await
        }
    }

    async fn transact_with_retry<T, F>(&self, opts: TxOptions, f: &F) -> StoreResult<T>
    where
        T: Send,
        F: for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, StoreResult<T>> + Send + Sync,
    {
        let mut attempts = Vec::new();
        for attempt in 1..=MAX_TX_ATTEMPTS {
            match self.transact_once(opts, f).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_serialization_failure() => {
                    debug!(attempt, "serialization conflict, retrying transaction");
                    attempts.push(err);
                }
                Err(err) => return Err(err),
            }
            tokio::time::sleep(TX_RETRY_BACKOFF).await;
        }
        Err(StoreError::RetriesExhausted(JoinedErrors(attempts)))
    }

    async fn transact_once<T, F>(&self, opts: TxOptions, f: &F) -> StoreResult<T>
    where
        T: Send,
        F: for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, StoreResult<T>> + Send + Sync,
    {
        let mut tx = self.pool.begin().await?;
        let set_transaction = opts.set_transaction_sql();
        sqlx::query(&set_transaction).execute(&mut *tx).await?;
        let value = f(&mut *tx).await?;
        tx.commit().await?;
        Ok(value)
    }

    /// Re-enter a transaction on a connection that is already inside one.
    ///
    /// Backed by a savepoint: a failure rolls back only the nested scope,
    /// the outer transaction stays usable.
    pub async fn nested<'c, T, F>(conn: &'c mut PgConnection, f: F) -> StoreResult<T>
    where
        T: Send,
        F: for<'n> FnOnce(&'n mut PgConnection) -> BoxFuture<'n, StoreResult<T>> + Send,
    {
        let mut tx = conn.begin().await?;
        let value = f(&mut *tx).await?;
        tx.commit().await?;
        Ok(value)
    }

    /// Drain the pool. Safe to call more than once.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializable_options() {
        let opts = TxOptions::serializable();
        assert_eq!(opts.isolation, IsolationLevel::Serializable);
        assert!(!opts.read_only);
        assert!(!opts.deferrable);
        assert_eq!(
            opts.set_transaction_sql(),
            "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE READ WRITE NOT DEFERRABLE"
        );
    }

    #[test]
    fn test_retry_eligibility() {
        assert!(TxOptions::serializable().retries_on_conflict());
        assert!(TxOptions {
            isolation: IsolationLevel::RepeatableRead,
            ..TxOptions::default()
        }
        .retries_on_conflict());
        assert!(!TxOptions::default().retries_on_conflict());
    }

    #[test]
    fn test_read_only_deferrable_sql() {
        let opts = TxOptions {
            isolation: IsolationLevel::RepeatableRead,
            read_only: true,
            deferrable: true,
        };
        assert_eq!(
            opts.set_transaction_sql(),
            "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY DEFERRABLE"
        );
    }
}
