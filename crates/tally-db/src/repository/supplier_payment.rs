//! # Supplier Payment Repository
//!
//! Payments made against supplier bills.
//!
//! ## Balance
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  total     = bills.deal_amount                                          │
//! │  paid      = bills.base_paid + Σ supplier_transactions.amount           │
//! │  remaining = total − paid                                               │
//! │                                                                         │
//! │  Recomputed from the full log on every read. The remaining snapshot     │
//! │  stored on each record is what it was when the record was written;      │
//! │  history() recomputes remaining_after from the log as it is now.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tally_core::balance::{replay_history, Balance, HistoryEntry};
use tally_core::validation::{validate_actor, validate_payment_amount, validate_reason};
use tally_core::{
    Bill, CoreError, DeleteTrace, Money, PaymentMethod, SupplierTransaction, TraceAction,
    ValidationError,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbResult, LedgerResult};
use crate::repository::{bill, trace};
use crate::retry::{ensure_all_written, ensure_swapped, with_retryable_transaction, RetryPolicy};

/// Collection name used for supplier payment traces.
pub const SUPPLIER_TRANSACTIONS_COLLECTION: &str = "supplier_transactions";

const SELECT_TRANSACTION: &str = r#"
    SELECT id, bill_number, supplier_id, amount_cents, method, reference, paid_at,
           remaining_snapshot_cents
    FROM supplier_transactions
"#;

/// A payment to record against a bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierPaymentRequest {
    pub bill_number: String,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// Defaults to now.
    pub paid_at: Option<DateTime<Utc>>,
}

/// Fields of a logged payment that may change. `None` keeps the current value.
///
/// `reference: Some(None)` clears the reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentEdit {
    pub amount: Option<Money>,
    pub method: Option<PaymentMethod>,
    pub reference: Option<Option<String>>,
}

impl PaymentEdit {
    /// The reference after this edit. A blank replacement clears it.
    pub(crate) fn reference_after(&self, current: &Option<String>) -> Option<String> {
        match &self.reference {
            None => current.clone(),
            Some(next) => next
                .as_ref()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        }
    }
}

pub(crate) fn check_method(method: PaymentMethod) -> Result<(), ValidationError> {
    if method.is_due() {
        return Err(ValidationError::NotAllowed {
            field: "method".to_string(),
            allowed: vec![
                PaymentMethod::Cash.to_string(),
                PaymentMethod::Card.to_string(),
                PaymentMethod::MobileBanking.to_string(),
                PaymentMethod::BankTransfer.to_string(),
            ],
        });
    }
    Ok(())
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Payments of one bill in the order they were made.
pub async fn fetch_for_bill(
    conn: &mut SqliteConnection,
    bill_number: &str,
) -> DbResult<Vec<SupplierTransaction>> {
    let mut records = sqlx::query_as::<_, SupplierTransaction>(&format!(
        "{} WHERE bill_number = ?1 ORDER BY rowid ASC",
        SELECT_TRANSACTION
    ))
    .bind(bill_number)
    .fetch_all(&mut *conn)
    .await?;

    // Backdated payments sort by when they were made; ties keep insert order
    records.sort_by_key(|r| r.paid_at);
    Ok(records)
}

async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<SupplierTransaction>> {
    let record =
        sqlx::query_as::<_, SupplierTransaction>(&format!("{} WHERE id = ?1", SELECT_TRANSACTION))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(record)
}

fn balance_of(bill: &Bill, records: &[SupplierTransaction]) -> Balance {
    Balance::compute(
        bill.deal_amount(),
        bill.base_paid(),
        records.iter().map(SupplierTransaction::amount),
    )
}

/// Current balance of a bill, read on the caller's connection.
pub async fn balance(conn: &mut SqliteConnection, bill: &Bill) -> DbResult<Balance> {
    let records = fetch_for_bill(conn, &bill.bill_number).await?;
    Ok(balance_of(bill, &records))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for supplier payments.
///
/// ## Usage
/// ```rust,ignore
/// let payments = db.supplier_payments();
/// let before = payments.bill_balance("B1").await?;
/// payments.record_payment(SupplierPaymentRequest {
///     bill_number: "B1".into(),
///     amount: Money::from_cents(10_000),
///     method: PaymentMethod::Cash,
///     reference: None,
///     paid_at: None,
/// }).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SupplierPaymentRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SupplierPaymentRepository {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        SupplierPaymentRepository { pool, retry }
    }

    /// `{ total, paid, remaining }` of a bill.
    pub async fn bill_balance(&self, bill_number: &str) -> LedgerResult<Balance> {
        let mut conn = self.pool.acquire().await?;
        let bill = bill::require(&mut conn, bill_number).await?;
        Ok(balance(&mut conn, &bill).await?)
    }

    /// Appends a payment after checking `0 < amount ≤ remaining`.
    ///
    /// The check and the insert share one transaction, and the bill row is
    /// claimed so a racing payment on the same bill conflicts and re-checks.
    pub async fn record_payment(
        &self,
        request: SupplierPaymentRequest,
    ) -> LedgerResult<SupplierTransaction> {
        validate_payment_amount(request.amount.cents())?;
        check_method(request.method)?;
        let paid_at = request.paid_at.unwrap_or_else(Utc::now);

        let record =
            with_retryable_transaction(&self.pool, &self.retry, "supplier_payment", |conn| {
                let request = request.clone();
                Box::pin(async move {
                    let bill = bill::require(&mut *conn, &request.bill_number).await?;
                    let current = balance(&mut *conn, &bill).await?;
                    current.check_payment(request.amount)?;
                    bill::claim(&mut *conn, &bill).await?;

                    let record = SupplierTransaction {
                        id: Uuid::new_v4().to_string(),
                        bill_number: bill.bill_number.clone(),
                        supplier_id: bill.supplier_id.clone(),
                        amount_cents: request.amount.cents(),
                        method: request.method,
                        reference: request.reference.clone(),
                        paid_at,
                        remaining_snapshot_cents: current.after_payment(request.amount).remaining.cents(),
                    };

                    sqlx::query(
                        r#"
                        INSERT INTO supplier_transactions (
                            id, bill_number, supplier_id, amount_cents, method, reference,
                            paid_at, remaining_snapshot_cents
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                        "#,
                    )
                    .bind(&record.id)
                    .bind(&record.bill_number)
                    .bind(&record.supplier_id)
                    .bind(record.amount_cents)
                    .bind(record.method)
                    .bind(&record.reference)
                    .bind(record.paid_at)
                    .bind(record.remaining_snapshot_cents)
                    .execute(&mut *conn)
                    .await?;

                    Ok(record)
                })
            })
            .await?;

        info!(
            bill_number = %record.bill_number,
            amount = %record.amount(),
            remaining = record.remaining_snapshot_cents,
            "Supplier payment recorded"
        );
        Ok(record)
    }

    /// Changes amount, method or reference of a logged payment.
    ///
    /// A new amount is checked against the balance with the old amount
    /// released. The stored snapshot is left as it was.
    pub async fn edit_payment(&self, id: &str, changes: PaymentEdit) -> LedgerResult<SupplierTransaction> {
        if let Some(amount) = changes.amount {
            validate_payment_amount(amount.cents())?;
        }
        if let Some(method) = changes.method {
            check_method(method)?;
        }
        let id = id.to_string();

        let updated =
            with_retryable_transaction(&self.pool, &self.retry, "supplier_payment_edit", |conn| {
                let (id, changes) = (id.clone(), changes.clone());
                Box::pin(async move {
                    let prior = fetch(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| CoreError::PaymentNotFound(id.clone()))?;
                    let bill = bill::require(&mut *conn, &prior.bill_number).await?;

                    if let Some(amount) = changes.amount {
                        let current = balance(&mut *conn, &bill).await?;
                        current.check_amount_edit(prior.amount(), amount)?;
                    }
                    bill::claim(&mut *conn, &bill).await?;

                    let updated = SupplierTransaction {
                        amount_cents: changes.amount.map_or(prior.amount_cents, |a| a.cents()),
                        method: changes.method.unwrap_or(prior.method),
                        reference: changes.reference_after(&prior.reference),
                        ..prior
                    };

                    let result = sqlx::query(
                        "UPDATE supplier_transactions SET amount_cents = ?1, method = ?2, reference = ?3 \
                         WHERE id = ?4",
                    )
                    .bind(updated.amount_cents)
                    .bind(updated.method)
                    .bind(&updated.reference)
                    .bind(&updated.id)
                    .execute(&mut *conn)
                    .await?;
                    ensure_swapped(result.rows_affected(), SUPPLIER_TRANSACTIONS_COLLECTION)?;

                    Ok(updated)
                })
            })
            .await?;

        info!(id = %updated.id, amount = %updated.amount(), "Supplier payment edited");
        Ok(updated)
    }

    /// Removes every payment of a bill and resets its base paid value.
    ///
    /// All or nothing: one trace per removed record, and the delete must
    /// remove exactly the records that were traced.
    pub async fn delete_all_for_bill(
        &self,
        bill_number: &str,
        actor: &str,
        reason: &str,
    ) -> LedgerResult<Vec<DeleteTrace>> {
        let reason = validate_reason(reason, "delete bill payments")?;
        validate_actor(actor)?;
        let (bill_number, actor) = (bill_number.to_string(), actor.to_string());

        let traces =
            with_retryable_transaction(&self.pool, &self.retry, "supplier_payment_reset", |conn| {
                let (bill_number, actor, reason) =
                    (bill_number.clone(), actor.clone(), reason.clone());
                Box::pin(async move {
                    let bill = bill::require(&mut *conn, &bill_number).await?;
                    let records = fetch_for_bill(&mut *conn, &bill_number).await?;
                    debug!(bill_number = %bill_number, records = records.len(), "Resetting bill payments");

                    let mut traces = Vec::with_capacity(records.len());
                    for record in &records {
                        let trace = trace::record(
                            &mut *conn,
                            SUPPLIER_TRANSACTIONS_COLLECTION,
                            &record.id,
                            TraceAction::Delete,
                            record,
                            &actor,
                            &reason,
                        )
                        .await?;
                        traces.push(trace);
                    }

                    let result = sqlx::query("DELETE FROM supplier_transactions WHERE bill_number = ?1")
                        .bind(&bill_number)
                        .execute(&mut *conn)
                        .await?;
                    ensure_all_written(records.len() as u64, result.rows_affected())?;

                    bill::update_base_paid(&mut *conn, &bill, Money::zero()).await?;
                    Ok(traces)
                })
            })
            .await?;

        info!(bill_number = %bill_number, removed = traces.len(), "Bill payments reset");
        Ok(traces)
    }

    /// Payments of a bill, newest first, with `remaining_after` recomputed.
    pub async fn history(
        &self,
        bill_number: &str,
    ) -> LedgerResult<Vec<HistoryEntry<SupplierTransaction>>> {
        let mut conn = self.pool.acquire().await?;
        let bill = bill::require(&mut conn, bill_number).await?;
        let records = fetch_for_bill(&mut conn, bill_number).await?;

        Ok(replay_history(
            bill.deal_amount(),
            bill.base_paid(),
            records,
            SupplierTransaction::amount,
        ))
    }

    /// Most recent payment of a bill.
    pub async fn latest(&self, bill_number: &str) -> LedgerResult<Option<SupplierTransaction>> {
        Ok(self
            .history(bill_number)
            .await?
            .into_iter()
            .next()
            .map(|entry| entry.record))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Database;
    use crate::test_support::{file_db, seed_bill, test_db};
    use chrono::{Duration, TimeZone};

    fn pay(cents: i64) -> SupplierPaymentRequest {
        SupplierPaymentRequest {
            bill_number: "B1".to_string(),
            amount: Money::from_cents(cents),
            method: PaymentMethod::Cash,
            reference: None,
            paid_at: None,
        }
    }

    async fn remaining(db: &Database) -> i64 {
        db.supplier_payments()
            .bill_balance("B1")
            .await
            .unwrap()
            .remaining
            .cents()
    }

    #[tokio::test]
    async fn test_remaining_follows_appends() {
        let db = test_db().await;
        seed_bill(&db, "B1", 50_000, 10_000).await;
        let payments = db.supplier_payments();

        assert_eq!(remaining(&db).await, 40_000);

        let first = payments.record_payment(pay(15_000)).await.unwrap();
        assert_eq!(first.remaining_snapshot_cents, 25_000);
        payments.record_payment(pay(5_000)).await.unwrap();

        let balance = payments.bill_balance("B1").await.unwrap();
        assert_eq!(balance.paid.cents(), 30_000);
        assert_eq!(balance.remaining.cents(), 20_000);
    }

    #[tokio::test]
    async fn test_invalid_amounts_are_rejected() {
        let db = test_db().await;
        seed_bill(&db, "B1", 10_000, 0).await;
        let payments = db.supplier_payments();

        let err = payments.record_payment(pay(0)).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYMENT_AMOUNT");

        let err = payments.record_payment(pay(10_001)).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYMENT_AMOUNT");

        payments.record_payment(pay(10_000)).await.unwrap();
        let err = payments.record_payment(pay(1)).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYMENT_AMOUNT");

        let mut missing = pay(100);
        missing.bill_number = "B404".into();
        let err = payments.record_payment(missing).await.unwrap_err();
        assert_eq!(err.code(), "BILL_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_edit_can_clear_reference() {
        let db = test_db().await;
        seed_bill(&db, "B1", 10_000, 0).await;
        let payments = db.supplier_payments();
        let mut request = pay(4_000);
        request.reference = Some("cheque 117".into());
        let record = payments.record_payment(request).await.unwrap();

        let kept = payments
            .edit_payment(
                &record.id,
                PaymentEdit {
                    method: Some(PaymentMethod::Card),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(kept.reference.as_deref(), Some("cheque 117"));

        let cleared = payments
            .edit_payment(
                &record.id,
                PaymentEdit {
                    reference: Some(Some("   ".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.reference, None);
        assert_eq!(cleared.method, PaymentMethod::Card);
        assert_eq!(cleared.amount_cents, 4_000);
    }

    #[tokio::test]
    async fn test_edit_releases_old_amount() {
        let db = test_db().await;
        seed_bill(&db, "B1", 10_000, 0).await;
        let payments = db.supplier_payments();
        let record = payments.record_payment(pay(4_000)).await.unwrap();

        let updated = payments
            .edit_payment(
                &record.id,
                PaymentEdit {
                    amount: Some(Money::from_cents(10_000)),
                    reference: Some(Some("cheque 118".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.amount_cents, 10_000);
        assert_eq!(updated.reference.as_deref(), Some("cheque 118"));
        assert_eq!(updated.remaining_snapshot_cents, 6_000);
        assert_eq!(remaining(&db).await, 0);

        let err = payments
            .edit_payment(
                &record.id,
                PaymentEdit {
                    amount: Some(Money::from_cents(10_001)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYMENT_AMOUNT");

        let err = payments
            .edit_payment("missing", PaymentEdit::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PAYMENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_all_resets_bill() {
        let db = test_db().await;
        seed_bill(&db, "B1", 50_000, 10_000).await;
        let payments = db.supplier_payments();
        for cents in [1_000, 2_000, 3_000] {
            payments.record_payment(pay(cents)).await.unwrap();
        }

        let err = payments.delete_all_for_bill("B1", "owner", "").await.unwrap_err();
        assert_eq!(err.code(), "MISSING_REASON");
        assert_eq!(remaining(&db).await, 34_000);

        let traces = payments
            .delete_all_for_bill("B1", "owner", "bill renegotiated")
            .await
            .unwrap();
        assert_eq!(traces.len(), 3);
        assert!(traces.iter().all(|t| t.collection == SUPPLIER_TRANSACTIONS_COLLECTION));

        let balance = payments.bill_balance("B1").await.unwrap();
        assert_eq!(balance.paid.cents(), 0);
        assert_eq!(balance.remaining.cents(), 50_000);
        assert!(payments.history("B1").await.unwrap().is_empty());
        assert_eq!(db.traces().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_with_recomputed_remaining() {
        let db = test_db().await;
        seed_bill(&db, "B1", 10_000, 1_000).await;
        let payments = db.supplier_payments();
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let mut late = pay(2_000);
        late.paid_at = Some(at + Duration::days(2));
        payments.record_payment(late).await.unwrap();

        // Backdated before the first one
        let mut early = pay(3_000);
        early.paid_at = Some(at);
        let early = payments.record_payment(early).await.unwrap();
        assert_eq!(early.remaining_snapshot_cents, 4_000);

        let history = payments.history("B1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].record.amount_cents, 2_000);
        assert_eq!(history[0].remaining_after.cents(), 4_000);
        assert_eq!(history[1].record.amount_cents, 3_000);
        assert_eq!(history[1].remaining_after.cents(), 6_000);
        // The stored snapshot stays as it was written
        assert_eq!(history[1].record.remaining_snapshot_cents, 4_000);

        let latest = payments.latest("B1").await.unwrap().unwrap();
        assert_eq!(latest.amount_cents, 2_000);
    }

    #[tokio::test]
    async fn test_due_is_not_a_payment_method() {
        let db = test_db().await;
        seed_bill(&db, "B1", 10_000, 0).await;

        let mut request = pay(100);
        request.method = PaymentMethod::Due;
        let err = db.supplier_payments().record_payment(request).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_never_overpay() {
        let (_dir, db) = file_db(4).await;
        seed_bill(&db, "B1", 10_000, 0).await;

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let payments = db.supplier_payments();
                tokio::spawn(async move { payments.record_payment(pay(3_000)).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => assert_eq!(e.code(), "INVALID_PAYMENT_AMOUNT"),
            }
        }

        assert_eq!(accepted, 3);
        assert_eq!(remaining(&db).await, 1_000);
    }
}
