//! # Customer Payment Repository
//!
//! Payments customers make towards their due sales.
//!
//! ## Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  customer 017…  due sales                                               │
//! │    S1  total 1000  paid at sale 200  allocated 300  → remaining 500     │
//! │    S2  total  800  paid at sale   0  allocated   0  → remaining 800     │
//! │                                                  customer remaining 1300│
//! │                                                                         │
//! │  record_payment(allocations = [S1: 500, S2: 100])                       │
//! │    S1: 0 < 500 ≤ 500 ✓   S2: 0 < 100 ≤ 800 ✓   total 600 ≤ 1300 ✓       │
//! │    → customer_transactions (amount 600, snapshot 700)                   │
//! │    → customer_payment_allocations (S1 500, S2 100)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The caller decides the split; sales are never prioritized here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tally_core::balance::{replay_history, validate_allocations, Allocation, Balance, HistoryEntry};
use tally_core::validation::validate_payment_amount;
use tally_core::{
    CoreError, CustomerTransaction, Money, PaymentMethod, Sale, SalePayment, ValidationError,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult, LedgerResult};
use crate::repository::sale;
use crate::repository::supplier_payment::{check_method, PaymentEdit};
use crate::retry::{ensure_swapped, with_retryable_transaction, RetryPolicy};

/// A payment to record for a customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerPaymentRequest {
    pub customer_number: String,
    pub allocations: Vec<Allocation>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// Defaults to now.
    pub paid_at: Option<DateTime<Utc>>,
}

/// A due sale with its current balance.
#[derive(Debug, Clone, PartialEq)]
pub struct DueSale {
    pub sale: Sale,
    pub balance: Balance,
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: String,
    customer_number: String,
    amount_cents: i64,
    method: PaymentMethod,
    reference: Option<String>,
    paid_at: DateTime<Utc>,
    remaining_snapshot_cents: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct AllocationRow {
    transaction_id: String,
    sale_id: String,
    amount_cents: i64,
    product_ids: String,
}

impl AllocationRow {
    fn into_sale_payment(self) -> DbResult<(String, SalePayment)> {
        let product_ids: Vec<String> = serde_json::from_str(&self.product_ids)
            .map_err(|e| DbError::corrupt("customer_payment_allocations", e))?;
        Ok((
            self.transaction_id,
            SalePayment {
                sale_id: self.sale_id,
                product_ids,
                amount_cents: self.amount_cents,
            },
        ))
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Amounts allocated so far to each sale of a customer.
async fn allocated_by_sale(
    conn: &mut SqliteConnection,
    customer_number: &str,
) -> DbResult<HashMap<String, Money>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT a.sale_id, SUM(a.amount_cents)
        FROM customer_payment_allocations a
        JOIN customer_transactions t ON t.id = a.transaction_id
        WHERE t.customer_number = ?1
        GROUP BY a.sale_id
        "#,
    )
    .bind(customer_number)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(sale_id, cents)| (sale_id, Money::from_cents(cents)))
        .collect())
}

/// Every due sale of a customer with its balance, oldest first.
pub async fn due_sales(conn: &mut SqliteConnection, customer_number: &str) -> DbResult<Vec<DueSale>> {
    let sales = sale::fetch_due_for_customer(conn, customer_number).await?;
    let allocated = allocated_by_sale(conn, customer_number).await?;

    Ok(sales
        .into_iter()
        .map(|sale| {
            let paid_later = allocated.get(&sale.id).copied().unwrap_or_default();
            let balance = Balance::compute(sale.total(), sale.paid(), [paid_later]);
            DueSale { sale, balance }
        })
        .collect())
}

/// Payments of a customer in the order they were made, with their
/// allocations.
async fn fetch_for_customer(
    conn: &mut SqliteConnection,
    customer_number: &str,
) -> DbResult<Vec<CustomerTransaction>> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT id, customer_number, amount_cents, method, reference, paid_at,
               remaining_snapshot_cents
        FROM customer_transactions
        WHERE customer_number = ?1
        ORDER BY rowid ASC
        "#,
    )
    .bind(customer_number)
    .fetch_all(&mut *conn)
    .await?;

    let allocation_rows = sqlx::query_as::<_, AllocationRow>(
        r#"
        SELECT a.transaction_id, a.sale_id, a.amount_cents, a.product_ids
        FROM customer_payment_allocations a
        JOIN customer_transactions t ON t.id = a.transaction_id
        WHERE t.customer_number = ?1
        ORDER BY a.transaction_id, a.position
        "#,
    )
    .bind(customer_number)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_transaction: HashMap<String, Vec<SalePayment>> = HashMap::new();
    for row in allocation_rows {
        let (transaction_id, payment) = row.into_sale_payment()?;
        by_transaction.entry(transaction_id).or_default().push(payment);
    }

    let mut records: Vec<CustomerTransaction> = rows
        .into_iter()
        .map(|row| CustomerTransaction {
            sales_paid: by_transaction.remove(&row.id).unwrap_or_default(),
            id: row.id,
            customer_number: row.customer_number,
            amount_cents: row.amount_cents,
            method: row.method,
            reference: row.reference,
            paid_at: row.paid_at,
            remaining_snapshot_cents: row.remaining_snapshot_cents,
        })
        .collect();

    records.sort_by_key(|r| r.paid_at);
    Ok(records)
}

async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<CustomerTransaction>> {
    let customer_number: Option<String> =
        sqlx::query_scalar("SELECT customer_number FROM customer_transactions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    let Some(customer_number) = customer_number else {
        return Ok(None);
    };
    Ok(fetch_for_customer(conn, &customer_number)
        .await?
        .into_iter()
        .find(|r| r.id == id))
}

async fn insert(conn: &mut SqliteConnection, record: &CustomerTransaction) -> LedgerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO customer_transactions (
            id, customer_number, amount_cents, method, reference, paid_at,
            remaining_snapshot_cents
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&record.id)
    .bind(&record.customer_number)
    .bind(record.amount_cents)
    .bind(record.method)
    .bind(&record.reference)
    .bind(record.paid_at)
    .bind(record.remaining_snapshot_cents)
    .execute(&mut *conn)
    .await?;

    for (position, payment) in record.sales_paid.iter().enumerate() {
        let product_ids = serde_json::to_string(&payment.product_ids)
            .map_err(|e| DbError::corrupt("customer_payment_allocations", e))?;

        sqlx::query(
            r#"
            INSERT INTO customer_payment_allocations (
                transaction_id, position, sale_id, amount_cents, product_ids
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&record.id)
        .bind(position as i64)
        .bind(&payment.sale_id)
        .bind(payment.amount_cents)
        .bind(product_ids)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

fn customer_balance_of(due: &[DueSale]) -> Balance {
    Balance::combine(due.iter().map(|d| d.balance))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for customer payments.
#[derive(Debug, Clone)]
pub struct CustomerPaymentRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl CustomerPaymentRepository {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        CustomerPaymentRepository { pool, retry }
    }

    /// Balance over every due sale of a customer.
    pub async fn customer_balance(&self, customer_number: &str) -> LedgerResult<Balance> {
        let mut conn = self.pool.acquire().await?;
        let due = due_sales(&mut conn, customer_number).await?;
        Ok(customer_balance_of(&due))
    }

    /// Balance of a single sale.
    pub async fn sale_balance(&self, sale_id: &str) -> LedgerResult<Balance> {
        let mut conn = self.pool.acquire().await?;
        let sale = sale::fetch(&mut conn, sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;

        let allocated: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM customer_payment_allocations WHERE sale_id = ?1",
        )
        .bind(sale_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(Balance::compute(
            sale.total(),
            sale.paid(),
            [Money::from_cents(allocated)],
        ))
    }

    /// Due sales of a customer with their balances.
    pub async fn due_sales(&self, customer_number: &str) -> DbResult<Vec<DueSale>> {
        let mut conn = self.pool.acquire().await?;
        due_sales(&mut conn, customer_number).await
    }

    /// Records one payment split across the caller's chosen sales.
    ///
    /// ## Errors
    /// * `SaleNotFound` - an allocation names a sale that is not a due sale
    ///   of this customer
    /// * `InvalidPaymentAmount` - an allocation exceeds its sale's remaining,
    ///   or the total exceeds the customer's
    pub async fn record_payment(
        &self,
        request: CustomerPaymentRequest,
    ) -> LedgerResult<CustomerTransaction> {
        if request.customer_number.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "customer_number".to_string(),
            }
            .into());
        }
        check_method(request.method)?;
        for allocation in &request.allocations {
            validate_payment_amount(allocation.amount.cents())?;
        }
        let paid_at = request.paid_at.unwrap_or_else(Utc::now);

        let record =
            with_retryable_transaction(&self.pool, &self.retry, "customer_payment", |conn| {
                let request = request.clone();
                Box::pin(async move {
                    let customer_number = request.customer_number.trim();
                    let due = due_sales(&mut *conn, customer_number).await?;

                    let mut checked = Vec::with_capacity(request.allocations.len());
                    for allocation in &request.allocations {
                        let sale = due
                            .iter()
                            .find(|d| d.sale.id == allocation.sale_id)
                            .ok_or_else(|| CoreError::SaleNotFound(allocation.sale_id.clone()))?;
                        checked.push((allocation, &sale.balance));
                    }

                    let customer = customer_balance_of(&due);
                    let total = validate_allocations(checked, &customer)?;
                    debug!(customer_number, total = %total, "Allocations accepted");

                    let record = CustomerTransaction {
                        id: Uuid::new_v4().to_string(),
                        customer_number: customer_number.to_string(),
                        amount_cents: total.cents(),
                        method: request.method,
                        reference: request.reference.clone(),
                        paid_at,
                        remaining_snapshot_cents: customer.after_payment(total).remaining.cents(),
                        sales_paid: request
                            .allocations
                            .iter()
                            .map(|a| SalePayment {
                                sale_id: a.sale_id.clone(),
                                product_ids: a.product_ids.clone(),
                                amount_cents: a.amount.cents(),
                            })
                            .collect(),
                    };

                    insert(&mut *conn, &record).await?;
                    Ok(record)
                })
            })
            .await?;

        info!(
            customer_number = %record.customer_number,
            amount = %record.amount(),
            sales = record.sales_paid.len(),
            remaining = record.remaining_snapshot_cents,
            "Customer payment recorded"
        );
        Ok(record)
    }

    /// Changes amount, method or reference of a logged payment.
    ///
    /// The amount can only change when the payment covers exactly one sale;
    /// a split payment has no single place the difference belongs.
    pub async fn edit_payment(&self, id: &str, changes: PaymentEdit) -> LedgerResult<CustomerTransaction> {
        if let Some(amount) = changes.amount {
            validate_payment_amount(amount.cents())?;
        }
        if let Some(method) = changes.method {
            check_method(method)?;
        }
        let id = id.to_string();

        let updated =
            with_retryable_transaction(&self.pool, &self.retry, "customer_payment_edit", |conn| {
                let (id, changes) = (id.clone(), changes.clone());
                Box::pin(async move {
                    let prior = fetch(&mut *conn, &id)
                        .await?
                        .ok_or_else(|| CoreError::PaymentNotFound(id.clone()))?;

                    let mut updated = CustomerTransaction {
                        method: changes.method.unwrap_or(prior.method),
                        reference: changes.reference_after(&prior.reference),
                        ..prior.clone()
                    };

                    if let Some(amount) = changes.amount {
                        let [covered] = prior.sales_paid.as_slice() else {
                            return Err(CoreError::invalid_payment(format!(
                                "amount can only change on a payment covering one sale, this one covers {}",
                                prior.sales_paid.len()
                            ))
                            .into());
                        };

                        let due = due_sales(&mut *conn, &prior.customer_number).await?;
                        let sale = due
                            .iter()
                            .find(|d| d.sale.id == covered.sale_id)
                            .ok_or_else(|| CoreError::SaleNotFound(covered.sale_id.clone()))?;
                        sale.balance.check_amount_edit(prior.amount(), amount)?;
                        customer_balance_of(&due).check_amount_edit(prior.amount(), amount)?;

                        let result = sqlx::query(
                            "UPDATE customer_payment_allocations SET amount_cents = ?1 \
                             WHERE transaction_id = ?2 AND sale_id = ?3",
                        )
                        .bind(amount.cents())
                        .bind(&prior.id)
                        .bind(&covered.sale_id)
                        .execute(&mut *conn)
                        .await?;
                        ensure_swapped(result.rows_affected(), "customer_payment_allocations")?;

                        updated.amount_cents = amount.cents();
                        updated.sales_paid[0].amount_cents = amount.cents();
                    }

                    let result = sqlx::query(
                        "UPDATE customer_transactions SET amount_cents = ?1, method = ?2, reference = ?3 \
                         WHERE id = ?4 AND amount_cents = ?5",
                    )
                    .bind(updated.amount_cents)
                    .bind(updated.method)
                    .bind(&updated.reference)
                    .bind(&updated.id)
                    .bind(prior.amount_cents)
                    .execute(&mut *conn)
                    .await?;
                    ensure_swapped(result.rows_affected(), "customer_transactions")?;

                    Ok(updated)
                })
            })
            .await?;

        info!(id = %updated.id, amount = %updated.amount(), "Customer payment edited");
        Ok(updated)
    }

    /// Payments of a customer, newest first, with `remaining_after`
    /// recomputed over the customer's due sales.
    pub async fn history(
        &self,
        customer_number: &str,
    ) -> LedgerResult<Vec<HistoryEntry<CustomerTransaction>>> {
        let mut conn = self.pool.acquire().await?;
        let sales = sale::fetch_due_for_customer(&mut conn, customer_number).await?;
        let records = fetch_for_customer(&mut conn, customer_number).await?;

        let total: Money = sales.iter().map(Sale::total).sum();
        let paid_at_sale: Money = sales.iter().map(Sale::paid).sum();

        Ok(replay_history(total, paid_at_sale, records, CustomerTransaction::amount))
    }

    /// Most recent payment of a customer.
    pub async fn latest(&self, customer_number: &str) -> LedgerResult<Option<CustomerTransaction>> {
        Ok(self
            .history(customer_number)
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
    use crate::test_support::{seed_bill, seed_product, test_db};
    use tally_core::checkout::{CartLine, CheckoutRequest, CustomerIdentity, PricingAdjustments};
    use tally_core::ProductRef;

    const CUSTOMER: &str = "01700000000";

    /// A due sale of `quantity` × 100.00 with `paid_cents` settled up front.
    async fn due_sale(db: &Database, quantity: i64, paid_cents: i64) -> Sale {
        db.sales()
            .checkout(CheckoutRequest {
                lines: vec![CartLine {
                    product: ProductRef::Barcode("A".into()),
                    quantity,
                }],
                pricing: PricingAdjustments::default(),
                payment_method: PaymentMethod::Due,
                customer: Some(CustomerIdentity {
                    name: "Rahim".into(),
                    number: CUSTOMER.into(),
                }),
                sold_at: None,
                staff_id: "staff-1".into(),
                amount_paid: Some(Money::from_cents(paid_cents)),
            })
            .await
            .unwrap()
            .sale
    }

    async fn setup() -> (Database, Sale, Sale) {
        let db = test_db().await;
        seed_bill(&db, "B1", 100_000, 0).await;
        seed_product(&db, "B1", "A", 50, 5_000, 10_000).await;
        let s1 = due_sale(&db, 1, 2_000).await;
        let s2 = due_sale(&db, 2, 0).await;
        (db, s1, s2)
    }

    fn allocation(sale: &Sale, cents: i64) -> Allocation {
        Allocation {
            sale_id: sale.id.clone(),
            amount: Money::from_cents(cents),
            product_ids: vec![],
        }
    }

    fn request(allocations: Vec<Allocation>) -> CustomerPaymentRequest {
        CustomerPaymentRequest {
            customer_number: CUSTOMER.to_string(),
            allocations,
            method: PaymentMethod::MobileBanking,
            reference: Some("TX-1".into()),
            paid_at: None,
        }
    }

    #[tokio::test]
    async fn test_balances_over_due_sales() {
        let (db, s1, s2) = setup().await;
        let payments = db.customer_payments();

        let customer = payments.customer_balance(CUSTOMER).await.unwrap();
        assert_eq!(customer.total.cents(), 30_000);
        assert_eq!(customer.paid.cents(), 2_000);
        assert_eq!(customer.remaining.cents(), 28_000);

        assert_eq!(payments.sale_balance(&s1.id).await.unwrap().remaining.cents(), 8_000);
        assert_eq!(payments.sale_balance(&s2.id).await.unwrap().remaining.cents(), 20_000);
        assert_eq!(payments.due_sales(CUSTOMER).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_split_payment_updates_each_sale() {
        let (db, s1, s2) = setup().await;
        let payments = db.customer_payments();

        let mut alloc = allocation(&s1, 8_000);
        alloc.product_ids = vec!["p-1".into()];
        let record = payments
            .record_payment(request(vec![alloc, allocation(&s2, 5_000)]))
            .await
            .unwrap();

        assert_eq!(record.amount_cents, 13_000);
        assert_eq!(record.remaining_snapshot_cents, 15_000);
        assert_eq!(record.paid_towards(&s1.id).cents(), 8_000);

        assert!(payments.sale_balance(&s1.id).await.unwrap().is_settled());
        assert_eq!(payments.sale_balance(&s2.id).await.unwrap().remaining.cents(), 15_000);
        assert_eq!(payments.customer_balance(CUSTOMER).await.unwrap().remaining.cents(), 15_000);

        let latest = payments.latest(CUSTOMER).await.unwrap().unwrap();
        assert_eq!(latest, record);
        assert_eq!(latest.sales_paid[0].product_ids, vec!["p-1".to_string()]);
    }

    #[tokio::test]
    async fn test_allocation_checks() {
        let (db, s1, s2) = setup().await;
        let payments = db.customer_payments();

        // Over the sale's own remaining
        let err = payments
            .record_payment(request(vec![allocation(&s1, 8_001)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYMENT_AMOUNT");

        let err = payments
            .record_payment(request(vec![allocation(&s1, 100), allocation(&s1, 100)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let mut foreign = allocation(&s2, 100);
        foreign.sale_id = "not-a-due-sale".into();
        let err = payments.record_payment(request(vec![foreign])).await.unwrap_err();
        assert_eq!(err.code(), "SALE_NOT_FOUND");

        let err = payments.record_payment(request(vec![])).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        assert!(payments.history(CUSTOMER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paid_sale_cannot_be_deleted() {
        let (db, s1, _) = setup().await;
        db.customer_payments()
            .record_payment(request(vec![allocation(&s1, 1_000)]))
            .await
            .unwrap();

        let err = db.sales().delete_sale(&s1.id, "manager", "wrong customer").await.unwrap_err();
        assert_eq!(err.code(), "SALE_HAS_PAYMENTS");
    }

    #[tokio::test]
    async fn test_edit_amount_only_on_single_sale_payment() {
        let (db, s1, s2) = setup().await;
        let payments = db.customer_payments();

        let single = payments
            .record_payment(request(vec![allocation(&s1, 3_000)]))
            .await
            .unwrap();
        let split = payments
            .record_payment(request(vec![allocation(&s1, 1_000), allocation(&s2, 1_000)]))
            .await
            .unwrap();

        let edited = payments
            .edit_payment(
                &single.id,
                PaymentEdit {
                    amount: Some(Money::from_cents(7_000)),
                    method: Some(PaymentMethod::Cash),
                    reference: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.amount_cents, 7_000);
        assert_eq!(edited.method, PaymentMethod::Cash);
        assert_eq!(edited.reference.as_deref(), Some("TX-1"));
        assert!(payments.sale_balance(&s1.id).await.unwrap().is_settled());

        // s1 has 1_000 from the split payment, so 7_001 no longer fits
        let err = payments
            .edit_payment(
                &single.id,
                PaymentEdit {
                    amount: Some(Money::from_cents(7_001)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYMENT_AMOUNT");

        let err = payments
            .edit_payment(
                &split.id,
                PaymentEdit {
                    amount: Some(Money::from_cents(500)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYMENT_AMOUNT");

        // Non-amount edits are fine on split payments
        let relabeled = payments
            .edit_payment(
                &split.id,
                PaymentEdit {
                    reference: Some(Some("TX-2".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(relabeled.reference.as_deref(), Some("TX-2"));
        assert_eq!(relabeled.sales_paid.len(), 2);

        let cleared = payments
            .edit_payment(
                &split.id,
                PaymentEdit {
                    reference: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.reference, None);
    }

    #[tokio::test]
    async fn test_history_recomputes_remaining() {
        let (db, s1, s2) = setup().await;
        let payments = db.customer_payments();

        let first = payments
            .record_payment(request(vec![allocation(&s2, 10_000)]))
            .await
            .unwrap();
        payments
            .record_payment(request(vec![allocation(&s1, 4_000)]))
            .await
            .unwrap();
        payments
            .edit_payment(
                &first.id,
                PaymentEdit {
                    amount: Some(Money::from_cents(6_000)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let history = payments.history(CUSTOMER).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].record.amount_cents, 4_000);
        assert_eq!(history[0].remaining_after.cents(), 18_000);
        assert_eq!(history[1].record.amount_cents, 6_000);
        assert_eq!(history[1].remaining_after.cents(), 22_000);
        // Stored snapshot still reflects the original amount
        assert_eq!(history[1].record.remaining_snapshot_cents, 18_000);
        assert_eq!(
            payments.customer_balance(CUSTOMER).await.unwrap().remaining.cents(),
            history[0].remaining_after.cents()
        );
    }
}
