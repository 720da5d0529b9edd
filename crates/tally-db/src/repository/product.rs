//! # Product Repository
//!
//! Database operations for products (bill line items).
//!
//! ## Key Operations
//! - Lookup by id or barcode ([`ProductRef`])
//! - Versioned stock writes used by checkout, adjustments and sale deletion
//!
//! ## Deal Amount Through the Bill
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products p                         bills b                             │
//! │  ┌────────┬───────┬─────┐          ┌──────┬──────────────┐              │
//! │  │ A      │ B1    │ 8   │ ───┐     │ B1   │ deal = 400   │              │
//! │  │ B      │ B1    │ 5   │ ───┴───► │      │              │              │
//! │  └────────┴───────┴─────┘          └──────┴──────────────┘              │
//! │                                                                         │
//! │  SELECT p.*, b.deal_amount_cents ... JOIN bills b USING bill_number     │
//! │  Every product of B1 reads the same deal amount; one UPDATE changes it. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tally_core::validation::{validate_barcode, validate_price_cents, validate_quantity};
use tally_core::{CoreError, Money, Product, ProductRef};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult, LedgerError, LedgerResult};
use crate::retry::ensure_swapped;

const SELECT_PRODUCT: &str = r#"
    SELECT p.id, p.barcode, p.name, p.supplier_id, p.bill_number, p.quantity,
           p.unit_price_cents, p.retail_price_cents, p.total_price_cents,
           b.deal_amount_cents, p.created_at, p.updated_at, p.version
    FROM products p
    JOIN bills b ON b.bill_number = p.bill_number
"#;

/// Input for adding a line item to an existing bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub bill_number: String,
    pub barcode: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub retail_price: Money,
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Resolves a product reference on the caller's connection.
pub async fn fetch(conn: &mut SqliteConnection, product: &ProductRef) -> DbResult<Option<Product>> {
    let (filter, value) = match product {
        ProductRef::Id(id) => ("p.id = ?1", id),
        ProductRef::Barcode(code) => ("p.barcode = ?1", code),
    };

    let product = sqlx::query_as::<_, Product>(&format!("{} WHERE {}", SELECT_PRODUCT, filter))
        .bind(value.trim())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(product)
}

/// Resolves a reference or fails with `ProductNotFound`.
pub async fn require(conn: &mut SqliteConnection, product: &ProductRef) -> LedgerResult<Product> {
    fetch(conn, product)
        .await?
        .ok_or_else(|| CoreError::ProductNotFound(product.to_string()).into())
}

/// The line item of `bill_number` with `barcode`, or `ProductNotFound`.
pub async fn require_on_bill(
    conn: &mut SqliteConnection,
    bill_number: &str,
    barcode: &str,
) -> LedgerResult<Product> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "{} WHERE p.bill_number = ?1 AND p.barcode = ?2",
        SELECT_PRODUCT
    ))
    .bind(bill_number)
    .bind(barcode)
    .fetch_optional(&mut *conn)
    .await?;

    product.ok_or_else(|| {
        CoreError::ProductNotFound(format!("barcode:{} on bill {}", barcode, bill_number)).into()
    })
}

/// Writes a new stock level (and its recomputed total price), conditional on
/// the version read with `product`.
pub async fn update_stock(
    conn: &mut SqliteConnection,
    product: &Product,
    new_quantity: i64,
) -> LedgerResult<()> {
    update_stock_versioned(
        conn,
        &product.id,
        new_quantity,
        product.stock_value_at(new_quantity),
        product.version,
    )
    .await
}

/// Lower-level form of [`update_stock`] for staged checkout writes.
pub async fn update_stock_versioned(
    conn: &mut SqliteConnection,
    product_id: &str,
    new_quantity: i64,
    total_price: Money,
    expected_version: i64,
) -> LedgerResult<()> {
    debug!(
        product_id,
        new_quantity,
        total_price = %total_price,
        expected_version,
        "Writing stock"
    );

    let result = sqlx::query(
        r#"
        UPDATE products
        SET quantity = ?1,
            total_price_cents = ?2,
            updated_at = ?3,
            version = version + 1
        WHERE id = ?4 AND version = ?5
        "#,
    )
    .bind(new_quantity)
    .bind(total_price.cents())
    .bind(Utc::now())
    .bind(product_id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    ensure_swapped(result.rows_affected(), "products")
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product reads and intake.
///
/// ## Usage
/// ```rust,ignore
/// let product = db.products().get(&ProductRef::Barcode("8901030".into())).await?;
/// let line_items = db.products().list_by_bill("B1").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Looks a product up by id or barcode.
    pub async fn get(&self, product: &ProductRef) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, product).await
    }

    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        self.get(&ProductRef::Barcode(barcode.to_string())).await
    }

    /// Every line item of a bill.
    pub async fn list_by_bill(&self, bill_number: &str) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "{} WHERE p.bill_number = ?1 ORDER BY p.created_at ASC, p.barcode ASC",
            SELECT_PRODUCT
        ))
        .bind(bill_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Adds a line item to an existing bill.
    ///
    /// The supplier is taken from the bill. Fails with `BillNotFound` if the
    /// bill does not exist.
    pub async fn insert(&self, new_product: &NewProduct) -> LedgerResult<Product> {
        validate_barcode(&new_product.barcode)?;
        validate_quantity(new_product.quantity)?;
        validate_price_cents(new_product.unit_price.cents())?;
        validate_price_cents(new_product.retail_price.cents())?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let barcode = new_product.barcode.trim();
        debug!(id = %id, barcode, bill_number = %new_product.bill_number, "Inserting product");

        let result = sqlx::query(
            r#"
            INSERT INTO products (
                id, barcode, name, supplier_id, bill_number, quantity,
                unit_price_cents, retail_price_cents, total_price_cents,
                created_at, updated_at, version
            )
            SELECT ?1, ?2, ?3, supplier_id, bill_number, ?4, ?5, ?6, ?7, ?8, ?8, 0
            FROM bills WHERE bill_number = ?9
            "#,
        )
        .bind(&id)
        .bind(barcode)
        .bind(new_product.name.trim())
        .bind(new_product.quantity)
        .bind(new_product.unit_price.cents())
        .bind(new_product.retail_price.cents())
        .bind(new_product.unit_price.multiply_quantity(new_product.quantity).cents())
        .bind(now)
        .bind(&new_product.bill_number)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => {
                LedgerError::Db(DbError::duplicate("barcode", barcode))
            }
            other => other.into(),
        })?;

        if result.rows_affected() == 0 {
            return Err(CoreError::BillNotFound(new_product.bill_number.clone()).into());
        }

        self.get(&ProductRef::Id(id.clone()))
            .await?
            .ok_or_else(|| DbError::not_found("Product", id).into())
    }

    /// Counts products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_bill, seed_product, test_db};

    #[tokio::test]
    async fn test_lookup_by_id_and_barcode() {
        let db = test_db().await;
        seed_bill(&db, "B1", 50_000, 0).await;
        let product = seed_product(&db, "B1", "A-100", 10, 5_000, 7_500).await;

        assert_eq!(product.total_price_cents, 50_000);
        assert_eq!(product.deal_amount_cents, 50_000);

        let by_barcode = db.products().get_by_barcode("A-100").await.unwrap().unwrap();
        assert_eq!(by_barcode.id, product.id);

        let by_id = db
            .products()
            .get(&ProductRef::Id(product.id.clone()))
            .await
            .unwrap();
        assert_eq!(by_id, Some(product));

        assert!(db.products().get_by_barcode("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_requires_bill() {
        let db = test_db().await;
        let err = db
            .products()
            .insert(&NewProduct {
                bill_number: "missing".into(),
                barcode: "X-1".into(),
                name: "X".into(),
                quantity: 1,
                unit_price: Money::from_cents(100),
                retail_price: Money::from_cents(150),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BILL_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let db = test_db().await;
        seed_bill(&db, "B1", 50_000, 0).await;
        let product = seed_product(&db, "B1", "A-100", 10, 5_000, 7_500).await;

        let mut conn = db.pool().acquire().await.unwrap();
        update_stock(&mut conn, &product, 9).await.unwrap();

        // Second write still carries the old version
        let err = update_stock(&mut conn, &product, 8).await.unwrap_err();
        assert!(err.is_retryable());
        drop(conn);

        let current = db.products().get_by_barcode("A-100").await.unwrap().unwrap();
        assert_eq!(current.quantity, 9);
        assert_eq!(current.total_price_cents, 45_000);
        assert_eq!(current.version, product.version + 1);
    }

    #[tokio::test]
    async fn test_list_by_bill() {
        let db = test_db().await;
        seed_bill(&db, "B1", 50_000, 0).await;
        seed_bill(&db, "B2", 10_000, 0).await;
        seed_product(&db, "B1", "A", 10, 5_000, 7_500).await;
        seed_product(&db, "B1", "B", 5, 2_000, 3_000).await;
        seed_product(&db, "B2", "C", 1, 100, 200).await;

        let items = db.products().list_by_bill("B1").await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|p| p.deal_amount_cents == 50_000));
    }
}
