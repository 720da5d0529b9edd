//! # Sale Repository
//!
//! Checkout and sale deletion. Both are single retryable transactions.
//!
//! ## Checkout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Checkout Transaction                              │
//! │                                                                         │
//! │  1. PEEK      counters("invoice") → next_count                          │
//! │  2. RESOLVE   every cart line → Product (by id or barcode)              │
//! │  3. STAGE     merge duplicate lines, check stock, new quantity          │
//! │  4. PRICE     subtotal, VAT, discount, shipping → total                 │
//! │  5. NUMBER    invoice = YYYYMMDDhhmmss-NNNNNN                           │
//! │  6. WRITE     sale + items, versioned product updates, counter          │
//! │     COMMIT                                                              │
//! │                                                                         │
//! │  7. (after commit) customer profile upsert, failures only logged        │
//! │                                                                         │
//! │  Any error in 1-6 rolls everything back; a version conflict re-runs     │
//! │  1-6 from scratch against fresh stock and a fresh counter.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tally_core::checkout::{invoice_number, stage_decrements, CheckoutRequest, OrderTotals};
use tally_core::validation::{validate_actor, validate_reason};
use tally_core::{
    CoreError, DeleteTrace, PaymentMethod, Product, ProductRef, Sale, SaleItem, TraceAction,
    INVOICE_COUNTER_KEY,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbResult, LedgerResult};
use crate::repository::customer::CustomerRepository;
use crate::repository::{product, sequence, trace};
use crate::retry::{ensure_swapped, with_retryable_transaction, RetryPolicy};

const SELECT_SALE: &str = r#"
    SELECT id, sale_count, invoice_number, subtotal_cents, vat_cents, discount_cents,
           shipping_cents, total_cents, paid_cents, payment_method, customer_name,
           customer_number, staff_id, created_at
    FROM sales
"#;

/// Collection name used for sale delete traces.
pub const SALES_COLLECTION: &str = "sales";

/// A committed sale with its line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleReceipt {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

pub async fn fetch(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Option<Sale>> {
    let sale = sqlx::query_as::<_, Sale>(&format!("{} WHERE id = ?1", SELECT_SALE))
        .bind(sale_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(sale)
}

pub async fn fetch_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let items = sqlx::query_as::<_, SaleItem>(
        r#"
        SELECT id, sale_id, product_id, barcode, name_snapshot, unit_price_cents,
               quantity, line_total_cents
        FROM sale_items
        WHERE sale_id = ?1
        ORDER BY rowid ASC
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

/// Due sales of one customer, oldest first.
pub async fn fetch_due_for_customer(
    conn: &mut SqliteConnection,
    customer_number: &str,
) -> DbResult<Vec<Sale>> {
    let sales = sqlx::query_as::<_, Sale>(&format!(
        "{} WHERE customer_number = ?1 AND payment_method = ?2 ORDER BY created_at ASC, sale_count ASC",
        SELECT_SALE
    ))
    .bind(customer_number)
    .bind(PaymentMethod::Due)
    .fetch_all(&mut *conn)
    .await?;
    Ok(sales)
}

/// Runs steps 1-6 of a checkout on the caller's transaction.
async fn write_checkout(
    conn: &mut SqliteConnection,
    request: &CheckoutRequest,
    sold_at: DateTime<Utc>,
) -> LedgerResult<SaleReceipt> {
    let pending = sequence::peek_next(conn, INVOICE_COUNTER_KEY).await?;

    let mut resolved: Vec<(Product, i64)> = Vec::with_capacity(request.lines.len());
    for line in &request.lines {
        let found = product::require(conn, &line.product).await?;
        resolved.push((found, line.quantity));
    }

    let staged = stage_decrements(&resolved)?;
    let totals = OrderTotals::for_staged(&staged, &request.pricing)?;
    let paid = request.paid_on_commit(totals.total)?;

    let (customer_name, customer_number) = match &request.customer {
        Some(c) => (Some(c.name.trim().to_string()), Some(c.number.trim().to_string())),
        None => (None, None),
    };

    let sale = Sale {
        id: Uuid::new_v4().to_string(),
        sale_count: pending.value,
        invoice_number: invoice_number(sold_at, pending.value),
        subtotal_cents: totals.subtotal.cents(),
        vat_cents: totals.vat.cents(),
        discount_cents: totals.discount.cents(),
        shipping_cents: totals.shipping.cents(),
        total_cents: totals.total.cents(),
        paid_cents: paid.cents(),
        payment_method: request.payment_method,
        customer_name,
        customer_number,
        staff_id: request.staff_id.trim().to_string(),
        created_at: sold_at,
    };

    debug!(
        invoice_number = %sale.invoice_number,
        lines = staged.len(),
        total = %totals.total,
        "Writing sale"
    );

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, sale_count, invoice_number, subtotal_cents, vat_cents, discount_cents,
            shipping_cents, total_cents, paid_cents, payment_method, customer_name,
            customer_number, staff_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&sale.id)
    .bind(sale.sale_count)
    .bind(&sale.invoice_number)
    .bind(sale.subtotal_cents)
    .bind(sale.vat_cents)
    .bind(sale.discount_cents)
    .bind(sale.shipping_cents)
    .bind(sale.total_cents)
    .bind(sale.paid_cents)
    .bind(sale.payment_method)
    .bind(&sale.customer_name)
    .bind(&sale.customer_number)
    .bind(&sale.staff_id)
    .bind(sale.created_at)
    .execute(&mut *conn)
    .await?;

    let mut items = Vec::with_capacity(staged.len());
    for line in &staged {
        let item = SaleItem {
            id: Uuid::new_v4().to_string(),
            sale_id: sale.id.clone(),
            product_id: line.product_id.clone(),
            barcode: line.barcode.clone(),
            name_snapshot: line.name.clone(),
            unit_price_cents: line.retail_price.cents(),
            quantity: line.requested,
            line_total_cents: line.line_total().cents(),
        };

        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, barcode, name_snapshot, unit_price_cents,
                quantity, line_total_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.barcode)
        .bind(&item.name_snapshot)
        .bind(item.unit_price_cents)
        .bind(item.quantity)
        .bind(item.line_total_cents)
        .execute(&mut *conn)
        .await?;

        product::update_stock_versioned(
            conn,
            &line.product_id,
            line.new_quantity,
            line.new_total_price,
            line.expected_version,
        )
        .await?;

        items.push(item);
    }

    sequence::commit(conn, &pending).await?;

    Ok(SaleReceipt { sale, items })
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sales.
///
/// ## Usage
/// ```rust,ignore
/// let receipt = db.sales().checkout(CheckoutRequest {
///     lines: vec![CartLine { product: ProductRef::Barcode("A-100".into()), quantity: 2 }],
///     pricing: PricingAdjustments::default(),
///     payment_method: PaymentMethod::Cash,
///     customer: None,
///     sold_at: None,
///     staff_id: "staff-1".into(),
///     amount_paid: None,
/// }).await?;
/// println!("{}", receipt.sale.invoice_number);
/// ```
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        SaleRepository { pool, retry }
    }

    /// Commits a sale: stock decrements, sale record and invoice number in
    /// one transaction.
    ///
    /// ## Errors
    /// * `ProductNotFound` - a cart line does not resolve
    /// * `InsufficientStock` - a product (all its lines merged) exceeds stock
    /// * `StoreConflict` - lost the race on every attempt
    pub async fn checkout(&self, request: CheckoutRequest) -> LedgerResult<SaleReceipt> {
        request.validate()?;
        let sold_at = request.sold_at.unwrap_or_else(Utc::now);

        let receipt = with_retryable_transaction(&self.pool, &self.retry, "checkout", |conn| {
            let request = request.clone();
            Box::pin(async move { write_checkout(conn, &request, sold_at).await })
        })
        .await?;

        info!(
            invoice_number = %receipt.sale.invoice_number,
            sale_count = receipt.sale.sale_count,
            total = %receipt.sale.total(),
            payment_method = %receipt.sale.payment_method,
            "Sale committed"
        );

        if let Some(customer) = &request.customer {
            if !customer.number.trim().is_empty() {
                let profiles = CustomerRepository::new(self.pool.clone());
                if let Err(e) = profiles
                    .record_purchase(&customer.number, &customer.name, sold_at)
                    .await
                {
                    warn!(
                        customer_number = %customer.number,
                        invoice_number = %receipt.sale.invoice_number,
                        error = %e,
                        "Customer profile update failed"
                    );
                }
            }
        }

        Ok(receipt)
    }

    /// Gets a sale with its items.
    pub async fn get(&self, sale_id: &str) -> DbResult<Option<SaleReceipt>> {
        let mut conn = self.pool.acquire().await?;
        let Some(sale) = fetch(&mut conn, sale_id).await? else {
            return Ok(None);
        };
        let items = fetch_items(&mut conn, sale_id).await?;
        Ok(Some(SaleReceipt { sale, items }))
    }

    pub async fn get_by_invoice(&self, invoice_number: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!("{} WHERE invoice_number = ?1", SELECT_SALE))
            .bind(invoice_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sale)
    }

    /// Due sales of a customer, oldest first.
    pub async fn list_due_for_customer(&self, customer_number: &str) -> DbResult<Vec<Sale>> {
        let mut conn = self.pool.acquire().await?;
        fetch_due_for_customer(&mut conn, customer_number).await
    }

    /// Deletes a sale and puts its items back into stock.
    ///
    /// Refused while a customer payment is allocated to the sale. The
    /// invoice counter is left as it is.
    pub async fn delete_sale(
        &self,
        sale_id: &str,
        actor: &str,
        reason: &str,
    ) -> LedgerResult<DeleteTrace> {
        let reason = validate_reason(reason, "delete sale")?;
        validate_actor(actor)?;

        let sale_id = sale_id.to_string();
        let actor = actor.to_string();

        let trace = with_retryable_transaction(&self.pool, &self.retry, "sale_delete", |conn| {
            let (sale_id, actor, reason) = (sale_id.clone(), actor.clone(), reason.clone());
            Box::pin(async move {
                let sale = fetch(&mut *conn, &sale_id)
                    .await?
                    .ok_or_else(|| CoreError::SaleNotFound(sale_id.clone()))?;

                let payments: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM customer_payment_allocations WHERE sale_id = ?1",
                )
                .bind(&sale_id)
                .fetch_one(&mut *conn)
                .await?;
                if payments > 0 {
                    return Err(CoreError::SaleHasPayments {
                        sale_id: sale_id.clone(),
                        payments: payments as usize,
                    }
                    .into());
                }

                let items = fetch_items(&mut *conn, &sale_id).await?;
                for item in &items {
                    let current =
                        product::require(&mut *conn, &ProductRef::Id(item.product_id.clone()))
                            .await?;
                    product::update_stock(&mut *conn, &current, current.quantity + item.quantity)
                        .await?;
                }

                let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
                    .bind(&sale_id)
                    .execute(&mut *conn)
                    .await?;
                ensure_swapped(result.rows_affected(), "sales")?;

                let prior = SaleReceipt { sale, items };
                trace::record(
                    &mut *conn,
                    SALES_COLLECTION,
                    &sale_id,
                    TraceAction::Delete,
                    &prior,
                    &actor,
                    &reason,
                )
                .await
            })
        })
        .await?;

        info!(sale_id = %trace.document_id, actor = %trace.actor, "Sale deleted");
        Ok(trace)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
