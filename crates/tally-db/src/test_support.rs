//! Fixtures shared by the repository tests.

use std::time::Duration;

use tally_core::{Bill, Money, Product};

use crate::pool::{Database, DbConfig};
use crate::repository::bill::NewBill;
use crate::repository::product::NewProduct;
use crate::retry::RetryPolicy;

/// Fresh in-memory ledger with migrations applied.
pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

/// File-backed ledger with several connections, for real write races.
///
/// The returned directory must outlive the database.
pub async fn file_db(max_connections: u32) -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new(dir.path().join("ledger.db"))
        .max_connections(max_connections)
        .retry_policy(RetryPolicy {
            max_attempts: 50,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
        });
    let db = Database::new(config).await.unwrap();
    (dir, db)
}

pub async fn seed_bill(db: &Database, bill_number: &str, deal_cents: i64, base_paid_cents: i64) -> Bill {
    db.bills()
        .create(NewBill {
            bill_number: bill_number.to_string(),
            supplier_id: Some("SUP-TEST".to_string()),
            deal_amount: Money::from_cents(deal_cents),
            base_paid: Money::from_cents(base_paid_cents),
        })
        .await
        .unwrap()
}

pub async fn seed_product(
    db: &Database,
    bill_number: &str,
    barcode: &str,
    quantity: i64,
    unit_cents: i64,
    retail_cents: i64,
) -> Product {
    db.products()
        .insert(&NewProduct {
            bill_number: bill_number.to_string(),
            barcode: barcode.to_string(),
            name: format!("Item {}", barcode),
            quantity,
            unit_price: Money::from_cents(unit_cents),
            retail_price: Money::from_cents(retail_cents),
        })
        .await
        .unwrap()
}

/// Current stock of a barcode.
pub async fn stock_of(db: &Database, barcode: &str) -> i64 {
    db.products()
        .get_by_barcode(barcode)
        .await
        .unwrap()
        .unwrap()
        .quantity
}

/// Current deal amount of a bill, in cents.
pub async fn deal_of(db: &Database, bill_number: &str) -> i64 {
    db.bills()
        .get(bill_number)
        .await
        .unwrap()
        .unwrap()
        .deal_amount_cents
}
