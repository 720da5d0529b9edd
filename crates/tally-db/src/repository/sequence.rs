//! # Sequence Repository
//!
//! Strictly increasing counters (invoice numbers, supplier ids) drawn inside
//! the caller's transaction.
//!
//! ## Draw Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  [tx] peek_next(conn, "invoice")                                        │
//! │        reads  counters(key="invoice") → value=41, version=7             │
//! │        returns PendingSequence { value: 42, expected_version: 7 }       │
//! │                                                                         │
//! │  ... caller reads and stages everything else ...                        │
//! │                                                                         │
//! │  [tx] commit(conn, &pending)                                            │
//! │        UPDATE counters SET value=42, version=8                          │
//! │         WHERE key="invoice" AND version=7                               │
//! │        0 rows → Conflict → whole transaction retried, counter re-read   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A missing counter starts at 0, so the first value drawn is 1.

use sqlx::{SqliteConnection, SqlitePool};
use tally_core::SUPPLIER_COUNTER_KEY;
use tracing::debug;

use crate::error::{DbError, DbResult, LedgerError, LedgerResult};
use crate::retry::{ensure_swapped, with_retryable_transaction, RetryPolicy};

/// A counter value read but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSequence {
    pub key: String,
    /// The value being drawn (`previous + 1`).
    pub value: i64,
    /// Version of the counter row, `None` if the row does not exist yet.
    expected_version: Option<i64>,
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Reads the counter and computes the next value without writing.
pub async fn peek_next(conn: &mut SqliteConnection, key: &str) -> DbResult<PendingSequence> {
    let row: Option<(i64, i64)> =
        sqlx::query_as("SELECT value, version FROM counters WHERE key = ?1")
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;

    let pending = match row {
        Some((value, version)) => PendingSequence {
            key: key.to_string(),
            value: value + 1,
            expected_version: Some(version),
        },
        None => PendingSequence {
            key: key.to_string(),
            value: 1,
            expected_version: None,
        },
    };

    debug!(key, next = pending.value, "Peeked sequence");
    Ok(pending)
}

/// Persists a peeked value; fails with a conflict if someone drew first.
pub async fn commit(conn: &mut SqliteConnection, pending: &PendingSequence) -> LedgerResult<()> {
    match pending.expected_version {
        Some(version) => {
            let result = sqlx::query(
                "UPDATE counters SET value = ?1, version = version + 1 \
                 WHERE key = ?2 AND version = ?3",
            )
            .bind(pending.value)
            .bind(&pending.key)
            .bind(version)
            .execute(&mut *conn)
            .await?;
            ensure_swapped(result.rows_affected(), "counters")
        }
        None => {
            sqlx::query("INSERT INTO counters (key, value, version) VALUES (?1, ?2, 0)")
                .bind(&pending.key)
                .bind(pending.value)
                .execute(&mut *conn)
                .await
                .map_err(|e| match DbError::from(e) {
                    DbError::UniqueViolation { .. } => LedgerError::conflict("counters"),
                    other => other.into(),
                })?;
            Ok(())
        }
    }
}

/// Draws the next value of `key` on the caller's transaction.
pub async fn next(conn: &mut SqliteConnection, key: &str) -> LedgerResult<i64> {
    let pending = peek_next(conn, key).await?;
    commit(conn, &pending).await?;
    Ok(pending.value)
}

/// Formats a supplier id from its sequence value.
pub fn supplier_id(value: i64) -> String {
    format!("SUP-{:06}", value)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for standalone counter access.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SequenceRepository {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        SequenceRepository { pool, retry }
    }

    /// Draws the next value in its own retryable transaction.
    pub async fn next_in_transaction(&self, key: &str) -> LedgerResult<i64> {
        let key = key.to_string();
        with_retryable_transaction(&self.pool, &self.retry, "sequence_next", move |conn| {
            let key = key.clone();
            Box::pin(async move { next(conn, &key).await })
        })
        .await
    }

    /// Draws a new supplier id.
    pub async fn next_supplier_id(&self) -> LedgerResult<String> {
        self.next_in_transaction(SUPPLIER_COUNTER_KEY)
            .await
            .map(supplier_id)
    }

    /// Returns the last value drawn (0 if none).
    pub async fn current(&self, key: &str) -> DbResult<i64> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM counters WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.unwrap_or(0))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_missing_counter_starts_at_one() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let seq = db.sequences();

        assert_eq!(seq.current("invoice").await.unwrap(), 0);
        assert_eq!(seq.next_in_transaction("invoice").await.unwrap(), 1);
        assert_eq!(seq.next_in_transaction("invoice").await.unwrap(), 2);
        assert_eq!(seq.current("invoice").await.unwrap(), 2);
        // Keys are independent
        assert_eq!(seq.next_in_transaction("supplier").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_peek_conflicts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.sequences().next_in_transaction("invoice").await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let stale = peek_next(&mut conn, "invoice").await.unwrap();
        next(&mut conn, "invoice").await.unwrap();

        let err = commit(&mut conn, &stale).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_concurrent_draws_are_distinct() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let seq = db.sequences();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = seq.clone();
                tokio::spawn(async move { seq.next_in_transaction("invoice").await.unwrap() })
            })
            .collect();

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values.sort_unstable();
        assert_eq!(values, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_supplier_ids() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert_eq!(db.sequences().next_supplier_id().await.unwrap(), "SUP-000001");
    }
}
