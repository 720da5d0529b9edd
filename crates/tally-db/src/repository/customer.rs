//! # Customer Repository
//!
//! Customer profiles keyed by phone/customer number. The profile is written
//! after a sale commits and is never part of a ledger transaction.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tally_core::Customer;
use tracing::debug;

use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn get(&self, customer_number: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_number, name, purchase_count, first_purchase_at, last_purchase_at
            FROM customers
            WHERE customer_number = ?1
            "#,
        )
        .bind(customer_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Creates the profile or counts one more purchase on it.
    ///
    /// The latest non-empty name wins; `last_purchase_at` only moves forward
    /// so a backdated sale does not rewind it.
    pub async fn record_purchase(
        &self,
        customer_number: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(customer_number, "Recording customer purchase");

        sqlx::query(
            r#"
            INSERT INTO customers (
                customer_number, name, purchase_count, first_purchase_at, last_purchase_at
            ) VALUES (?1, ?2, 1, ?3, ?3)
            ON CONFLICT(customer_number) DO UPDATE SET
                name = CASE WHEN excluded.name = '' THEN customers.name ELSE excluded.name END,
                purchase_count = customers.purchase_count + 1,
                first_purchase_at = MIN(customers.first_purchase_at, excluded.first_purchase_at),
                last_purchase_at = MAX(customers.last_purchase_at, excluded.last_purchase_at)
            "#,
        )
        .bind(customer_number.trim())
        .bind(name.trim())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_record_purchase_upserts() {
        let db = test_db().await;
        let customers = db.customers();
        let first = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 2, 3, 10, 0, 0).unwrap();

        customers.record_purchase("01700000000", "Rahim", second).await.unwrap();
        customers.record_purchase("01700000000", "", first).await.unwrap();

        let customer = customers.get("01700000000").await.unwrap().unwrap();
        assert_eq!(customer.name, "Rahim");
        assert_eq!(customer.purchase_count, 2);
        assert_eq!(customer.first_purchase_at, first);
        assert_eq!(customer.last_purchase_at, second);
    }
}
