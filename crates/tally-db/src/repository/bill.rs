//! # Bill Repository
//!
//! Supplier bills: the single row that owns a delivery's deal amount and
//! legacy base paid value. Products point at it by `bill_number`.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tally_core::validation::{validate_bill_number, validate_price_cents};
use tally_core::{Bill, Money};
use tracing::{debug, info};

use crate::error::{DbError, DbResult, LedgerError, LedgerResult};
use crate::repository::sequence;
use crate::retry::{ensure_swapped, with_retryable_transaction, RetryPolicy};
use tally_core::SUPPLIER_COUNTER_KEY;

const SELECT_BILL: &str = r#"
    SELECT bill_number, supplier_id, deal_amount_cents, base_paid_cents,
           created_at, updated_at, version
    FROM bills
"#;

/// Input for recording a delivered bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBill {
    pub bill_number: String,
    /// Drawn from the supplier sequence when absent.
    pub supplier_id: Option<String>,
    pub deal_amount: Money,
    pub base_paid: Money,
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

pub async fn fetch(conn: &mut SqliteConnection, bill_number: &str) -> DbResult<Option<Bill>> {
    let bill = sqlx::query_as::<_, Bill>(&format!("{} WHERE bill_number = ?1", SELECT_BILL))
        .bind(bill_number)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(bill)
}

/// Sets the deal amount, conditional on the version read with `bill`.
pub async fn update_deal_amount(
    conn: &mut SqliteConnection,
    bill: &Bill,
    deal_amount: Money,
) -> LedgerResult<()> {
    debug!(
        bill_number = %bill.bill_number,
        from = bill.deal_amount_cents,
        to = deal_amount.cents(),
        "Updating deal amount"
    );

    let result = sqlx::query(
        "UPDATE bills SET deal_amount_cents = ?1, updated_at = ?2, version = version + 1 \
         WHERE bill_number = ?3 AND version = ?4",
    )
    .bind(deal_amount.cents())
    .bind(Utc::now())
    .bind(&bill.bill_number)
    .bind(bill.version)
    .execute(&mut *conn)
    .await?;

    ensure_swapped(result.rows_affected(), "bills")
}

/// Sets the base paid value, conditional on the version read with `bill`.
pub async fn update_base_paid(
    conn: &mut SqliteConnection,
    bill: &Bill,
    base_paid: Money,
) -> LedgerResult<()> {
    let result = sqlx::query(
        "UPDATE bills SET base_paid_cents = ?1, updated_at = ?2, version = version + 1 \
         WHERE bill_number = ?3 AND version = ?4",
    )
    .bind(base_paid.cents())
    .bind(Utc::now())
    .bind(&bill.bill_number)
    .bind(bill.version)
    .execute(&mut *conn)
    .await?;

    ensure_swapped(result.rows_affected(), "bills")
}

/// Bumps the version without changing data.
///
/// Payments append to the log rather than the bill; claiming the bill row
/// makes two payments racing on one bill conflict instead of both passing
/// the remaining-balance check.
pub async fn claim(conn: &mut SqliteConnection, bill: &Bill) -> LedgerResult<()> {
    let result = sqlx::query(
        "UPDATE bills SET version = version + 1 WHERE bill_number = ?1 AND version = ?2",
    )
    .bind(&bill.bill_number)
    .bind(bill.version)
    .execute(&mut *conn)
    .await?;

    ensure_swapped(result.rows_affected(), "bills")
}

/// Fetches a bill or fails with `BillNotFound`.
pub async fn require(conn: &mut SqliteConnection, bill_number: &str) -> LedgerResult<Bill> {
    fetch(conn, bill_number)
        .await?
        .ok_or_else(|| tally_core::CoreError::BillNotFound(bill_number.to_string()).into())
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl BillRepository {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        BillRepository { pool, retry }
    }

    pub async fn get(&self, bill_number: &str) -> DbResult<Option<Bill>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, bill_number).await
    }

    /// Records a delivered bill.
    ///
    /// Bill intake belongs to the purchasing workflow; this is the minimal
    /// entry point the ledger needs (and the seed binary uses).
    pub async fn create(&self, new_bill: NewBill) -> LedgerResult<Bill> {
        validate_bill_number(&new_bill.bill_number)?;
        validate_price_cents(new_bill.deal_amount.cents())?;
        validate_price_cents(new_bill.base_paid.cents())?;

        let bill = with_retryable_transaction(&self.pool, &self.retry, "bill_create", |conn| {
            let new_bill = new_bill.clone();
            Box::pin(async move {
                let supplier_id = match new_bill.supplier_id {
                    Some(id) => id,
                    None => sequence::supplier_id(
                        sequence::next(&mut *conn, SUPPLIER_COUNTER_KEY).await?,
                    ),
                };
                let now = Utc::now();
                let bill = Bill {
                    bill_number: new_bill.bill_number.trim().to_string(),
                    supplier_id,
                    deal_amount_cents: new_bill.deal_amount.cents(),
                    base_paid_cents: new_bill.base_paid.cents(),
                    created_at: now,
                    updated_at: now,
                    version: 0,
                };

                sqlx::query(
                    r#"
                    INSERT INTO bills (
                        bill_number, supplier_id, deal_amount_cents, base_paid_cents,
                        created_at, updated_at, version
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
                    "#,
                )
                .bind(&bill.bill_number)
                .bind(&bill.supplier_id)
                .bind(bill.deal_amount_cents)
                .bind(bill.base_paid_cents)
                .bind(bill.created_at)
                .bind(bill.updated_at)
                .execute(&mut *conn)
                .await
                .map_err(|e| match DbError::from(e) {
                    DbError::UniqueViolation { .. } => {
                        LedgerError::Db(DbError::duplicate("bill_number", &bill.bill_number))
                    }
                    other => other.into(),
                })?;

                Ok(bill)
            })
        })
        .await?;

        info!(
            bill_number = %bill.bill_number,
            supplier_id = %bill.supplier_id,
            deal_amount = %bill.deal_amount(),
            "Bill recorded"
        );
        Ok(bill)
    }

    /// Bills of one supplier.
    pub async fn list_for_supplier(&self, supplier_id: &str) -> DbResult<Vec<Bill>> {
        let bills = sqlx::query_as::<_, Bill>(&format!(
            "{} WHERE supplier_id = ?1 ORDER BY created_at ASC",
            SELECT_BILL
        ))
        .bind(supplier_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bills)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_create_draws_supplier_id() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let bill = db
            .bills()
            .create(NewBill {
                bill_number: "B1".into(),
                supplier_id: None,
                deal_amount: Money::from_cents(50_000),
                base_paid: Money::zero(),
            })
            .await
            .unwrap();

        assert_eq!(bill.supplier_id, "SUP-000001");
        assert_eq!(db.bills().get("B1").await.unwrap().unwrap().deal_amount_cents, 50_000);
        assert_eq!(db.bills().list_for_supplier("SUP-000001").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_bill_number_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let new_bill = NewBill {
            bill_number: "B1".into(),
            supplier_id: Some("SUP-9".into()),
            deal_amount: Money::from_cents(100),
            base_paid: Money::zero(),
        };
        db.bills().create(new_bill.clone()).await.unwrap();

        let err = db.bills().create(new_bill).await.unwrap_err();
        assert_eq!(err.code(), "DUPLICATE");
    }
}
