//! # Retryable Transactions
//!
//! Every ledger workflow runs its whole body through
//! [`with_retryable_transaction`]. On a write conflict the transaction is
//! rolled back and the body runs again from the top, so counters, stock and
//! balances are always re-read.
//!
//! ## Retry Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  attempt = 1                                                            │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  BEGIN ──► body(conn) ──► COMMIT ──────────────────────────► Ok(value)  │
//! │     ▲          │             │                                          │
//! │     │          │ Err         │ Err                                      │
//! │     │          ▼             ▼                                          │
//! │     │      ROLLBACK ◄────────┘                                          │
//! │     │          │                                                        │
//! │     │          ├── not a conflict ─────────────────────────► Err(e)     │
//! │     │          │                                                        │
//! │     │          ├── attempt == max_attempts ──► Err(StoreConflict)       │
//! │     │          │                                                        │
//! │     │          ▼                                                        │
//! │     └──── sleep(exponential backoff), attempt += 1                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Writing a Body
//! The body is called once per attempt, so it must own its inputs:
//! ```rust,ignore
//! let target = ProductRef::Barcode(barcode.to_string());
//! with_retryable_transaction(&pool, &policy, "restock", move |conn| {
//!     let target = target.clone();
//!     Box::pin(async move {
//!         let current = product::require(&mut *conn, &target).await?;
//!         product::update_stock(&mut *conn, &current, current.quantity + 12).await?;
//!         Ok(current)
//!     })
//! })
//! .await?;
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use sqlx::{SqliteConnection, SqlitePool};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{DbError, LedgerError, LedgerResult};

/// Future returned by a transaction body, borrowing the connection.
pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = LedgerResult<T>> + Send + 'c>>;

// =============================================================================
// Retry Policy
// =============================================================================

/// Visible bounds for conflict retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Sets the attempt budget.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Creates the exponential backoff schedule for one call.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Combinator
// =============================================================================

/// Runs `body` inside a transaction, retrying the whole body on conflicts.
///
/// ## Returns
/// * `Ok(T)` - the body's value, committed
/// * `Err(LedgerError::StoreConflict)` - conflicts on every attempt
/// * `Err(e)` - any other error from the body or the store, rolled back
pub async fn with_retryable_transaction<T, F>(
    pool: &SqlitePool,
    policy: &RetryPolicy,
    operation: &'static str,
    mut body: F,
) -> LedgerResult<T>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T>,
{
    let mut backoff = policy.create_backoff();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match run_once(pool, &mut body).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Transaction committed after retry");
                }
                return Ok(value);
            }
            Err(LedgerError::Db(DbError::Conflict { entity })) => {
                if attempt >= policy.max_attempts {
                    error!(operation, attempts = attempt, %entity, "Retry budget exhausted");
                    return Err(LedgerError::StoreConflict { attempts: attempt });
                }

                let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
                warn!(operation, attempt, %entity, ?delay, "Write conflict, retrying transaction");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn run_once<T, F>(pool: &SqlitePool, body: &mut F) -> LedgerResult<T>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T>,
{
    let mut tx = pool.begin().await?;

    match body(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                debug!(error = %rollback_err, "Rollback failed; connection will be discarded");
            }
            Err(err)
        }
    }
}

/// Fails with [`LedgerError::PartialWriteForbidden`] unless a bulk write
/// touched exactly the staged number of rows.
pub fn ensure_all_written(expected: u64, written: u64) -> LedgerResult<()> {
    if expected != written {
        return Err(LedgerError::PartialWriteForbidden { expected, written });
    }
    Ok(())
}

/// Fails with a conflict unless a versioned write matched its row.
pub fn ensure_swapped(rows_affected: u64, entity: &str) -> LedgerResult<()> {
    if rows_affected != 1 {
        return Err(LedgerError::conflict(entity));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    async fn counter_rows(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM counters")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_retries_until_success_and_rolls_back_failed_attempts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let calls = Arc::new(AtomicU32::new(0));

        let result = with_retryable_transaction(db.pool(), &fast_policy(5), "test", |conn| {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                sqlx::query("INSERT INTO counters (key, value, version) VALUES (?1, 1, 0)")
                    .bind(format!("attempt-{}", n))
                    .execute(&mut *conn)
                    .await?;
                if n < 3 {
                    return Err(LedgerError::conflict("counters"));
                }
                Ok(n)
            })
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        // Only the committed attempt left a row behind
        assert_eq!(counter_rows(&db).await, 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let calls = Arc::new(AtomicU32::new(0));

        let err = with_retryable_transaction(db.pool(), &fast_policy(3), "test", |_conn| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LedgerError::conflict("products"))
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, LedgerError::StoreConflict { attempts: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_domain_errors_are_not_retried() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let calls = Arc::new(AtomicU32::new(0));

        let err = with_retryable_transaction(db.pool(), &fast_policy(5), "test", |_conn| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(tally_core::CoreError::EmptyCart.into())
            })
        })
        .await
        .unwrap_err();

        assert_eq!(err.code(), "EMPTY_CART");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_guards() {
        assert!(ensure_all_written(3, 3).is_ok());
        assert!(matches!(
            ensure_all_written(3, 2),
            Err(LedgerError::PartialWriteForbidden {
                expected: 3,
                written: 2
            })
        ));
        assert!(ensure_swapped(1, "products").is_ok());
        assert!(ensure_swapped(0, "products").unwrap_err().is_retryable());
    }
}
