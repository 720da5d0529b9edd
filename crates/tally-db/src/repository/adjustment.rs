//! # Supplier Adjustment Repository
//!
//! Returns and bill reductions against a supplier bill.
//!
//! ## Effects
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  return_replacement   record only (goods swapped 1:1)                   │
//! │                                                                         │
//! │  bill_reduction       products(bill, barcode).quantity  -= q            │
//! │                       bills(bill).deal_amount           -= unit × q     │
//! │                                                         (floor 0)       │
//! │                       record.applied_reduction = amount taken off       │
//! │                                                                         │
//! │  create / edit / delete are all one transition between two states:     │
//! │    none ──► RR(q) | BR(q)      create                                   │
//! │    RR|BR(q) ──► RR|BR(q')      edit   (reason + edit trace)             │
//! │    RR|BR(q) ──► none           delete (reason + delete trace)           │
//! │  and all of them run through tally_core::adjustment::plan_transition.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tally_core::adjustment::{plan_transition, AdjustmentPlan, AdjustmentState, StockPosition};
use tally_core::validation::{
    validate_actor, validate_barcode, validate_bill_number, validate_quantity, validate_reason,
};
use tally_core::{
    AdjustmentType, Bill, CoreError, DeleteTrace, Money, Product, SupplierAdjustment, TraceAction,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbResult, LedgerResult};
use crate::repository::{bill, product, trace};
use crate::retry::{ensure_swapped, with_retryable_transaction, RetryPolicy};

const SELECT_ADJUSTMENT: &str = r#"
    SELECT id, supplier_id, bill_number, barcode, quantity, unit_price_cents,
           total_price_cents, applied_reduction_cents, adjustment_type, note,
           created_at, updated_at
    FROM supplier_adjustments
"#;

/// Collection name used for adjustment traces.
pub const ADJUSTMENTS_COLLECTION: &str = "supplier_adjustments";

/// Input for a new adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAdjustment {
    pub bill_number: String,
    pub barcode: String,
    pub quantity: i64,
    pub adjustment_type: AdjustmentType,
    pub note: Option<String>,
}

/// Replacement values for an existing adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentEdit {
    pub quantity: i64,
    pub adjustment_type: AdjustmentType,
    pub note: Option<String>,
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<SupplierAdjustment>> {
    let adjustment =
        sqlx::query_as::<_, SupplierAdjustment>(&format!("{} WHERE id = ?1", SELECT_ADJUSTMENT))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(adjustment)
}

async fn require(conn: &mut SqliteConnection, id: &str) -> LedgerResult<SupplierAdjustment> {
    fetch(conn, id)
        .await?
        .ok_or_else(|| CoreError::AdjustmentNotFound(id.to_string()).into())
}

/// Plans a transition against the current product and bill, then writes it.
async fn apply_transition(
    conn: &mut SqliteConnection,
    bill: &Bill,
    product: &Product,
    unit_price: Money,
    applied: Money,
    from: AdjustmentState,
    to: AdjustmentState,
) -> LedgerResult<AdjustmentPlan> {
    let position = StockPosition {
        barcode: product.barcode.clone(),
        quantity: product.quantity,
        deal_amount: bill.deal_amount(),
    };
    let plan = plan_transition(from, to, unit_price, applied, &position)?;

    debug!(
        bill_number = %bill.bill_number,
        barcode = %product.barcode,
        ?from,
        ?to,
        diff = plan.diff,
        applied = %plan.applied_reduction,
        "Planned adjustment transition"
    );

    if plan.touches_stock() {
        product::update_stock(conn, product, plan.new_quantity).await?;
        bill::update_deal_amount(conn, bill, plan.new_deal_amount).await?;
    }

    Ok(plan)
}

/// Loads the bill and the adjusted line item.
async fn load_line(
    conn: &mut SqliteConnection,
    bill_number: &str,
    barcode: &str,
) -> LedgerResult<(Bill, Product)> {
    let bill = bill::require(conn, bill_number).await?;
    let product = product::require_on_bill(conn, bill_number, barcode).await?;
    Ok((bill, product))
}

fn clean_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for supplier adjustments.
///
/// ## Usage
/// ```rust,ignore
/// let adj = db.adjustments().create(NewAdjustment {
///     bill_number: "B1".into(),
///     barcode: "A-100".into(),
///     quantity: 2,
///     adjustment_type: AdjustmentType::BillReduction,
///     note: None,
/// }).await?;
/// db.adjustments().delete(&adj.id, "manager", "entered twice").await?;
/// ```
#[derive(Debug, Clone)]
pub struct AdjustmentRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl AdjustmentRepository {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        AdjustmentRepository { pool, retry }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<SupplierAdjustment>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Adjustments recorded against a bill, oldest first.
    pub async fn list_for_bill(&self, bill_number: &str) -> DbResult<Vec<SupplierAdjustment>> {
        let adjustments = sqlx::query_as::<_, SupplierAdjustment>(&format!(
            "{} WHERE bill_number = ?1 ORDER BY created_at ASC, rowid ASC",
            SELECT_ADJUSTMENT
        ))
        .bind(bill_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(adjustments)
    }

    /// Records an adjustment and applies its stock and deal amount effect.
    pub async fn create(&self, new_adjustment: NewAdjustment) -> LedgerResult<SupplierAdjustment> {
        validate_bill_number(&new_adjustment.bill_number)?;
        validate_barcode(&new_adjustment.barcode)?;
        validate_quantity(new_adjustment.quantity)?;

        let adjustment =
            with_retryable_transaction(&self.pool, &self.retry, "adjustment_create", |conn| {
                let input = new_adjustment.clone();
                Box::pin(async move {
                    let (bill, product) =
                        load_line(&mut *conn, &input.bill_number, input.barcode.trim()).await?;
                    let unit_price = product.unit_price();

                    let plan = apply_transition(
                        &mut *conn,
                        &bill,
                        &product,
                        unit_price,
                        Money::zero(),
                        AdjustmentState::None,
                        AdjustmentState::of(input.adjustment_type, input.quantity),
                    )
                    .await?;

                    let now = Utc::now();
                    let adjustment = SupplierAdjustment {
                        id: Uuid::new_v4().to_string(),
                        supplier_id: bill.supplier_id.clone(),
                        bill_number: bill.bill_number.clone(),
                        barcode: product.barcode.clone(),
                        quantity: input.quantity,
                        unit_price_cents: unit_price.cents(),
                        total_price_cents: unit_price.multiply_quantity(input.quantity).cents(),
                        applied_reduction_cents: plan.applied_reduction.cents(),
                        adjustment_type: input.adjustment_type,
                        note: clean_note(input.note),
                        created_at: now,
                        updated_at: now,
                    };

                    sqlx::query(
                        r#"
                        INSERT INTO supplier_adjustments (
                            id, supplier_id, bill_number, barcode, quantity, unit_price_cents,
                            total_price_cents, applied_reduction_cents, adjustment_type, note,
                            created_at, updated_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                        "#,
                    )
                    .bind(&adjustment.id)
                    .bind(&adjustment.supplier_id)
                    .bind(&adjustment.bill_number)
                    .bind(&adjustment.barcode)
                    .bind(adjustment.quantity)
                    .bind(adjustment.unit_price_cents)
                    .bind(adjustment.total_price_cents)
                    .bind(adjustment.applied_reduction_cents)
                    .bind(adjustment.adjustment_type)
                    .bind(&adjustment.note)
                    .bind(adjustment.created_at)
                    .bind(adjustment.updated_at)
                    .execute(&mut *conn)
                    .await?;

                    Ok(adjustment)
                })
            })
            .await?;

        info!(
            id = %adjustment.id,
            bill_number = %adjustment.bill_number,
            barcode = %adjustment.barcode,
            quantity = adjustment.quantity,
            adjustment_type = ?adjustment.adjustment_type,
            "Adjustment recorded"
        );
        Ok(adjustment)
    }

    /// Changes quantity, type or note of an adjustment.
    ///
    /// Only the difference between the old and new state touches stock.
    /// Writes an `edit` trace carrying the document as it was.
    pub async fn edit(
        &self,
        id: &str,
        changes: AdjustmentEdit,
        actor: &str,
        reason: &str,
    ) -> LedgerResult<SupplierAdjustment> {
        let reason = validate_reason(reason, "edit adjustment")?;
        validate_actor(actor)?;
        validate_quantity(changes.quantity)?;

        let id = id.to_string();
        let actor = actor.to_string();

        let updated = with_retryable_transaction(&self.pool, &self.retry, "adjustment_edit", |conn| {
            let (id, actor, reason) = (id.clone(), actor.clone(), reason.clone());
            let changes = changes.clone();
            Box::pin(async move {
                let prior = require(&mut *conn, &id).await?;
                let (bill, product) = load_line(&mut *conn, &prior.bill_number, &prior.barcode).await?;

                let plan = apply_transition(
                    &mut *conn,
                    &bill,
                    &product,
                    prior.unit_price(),
                    prior.applied_reduction(),
                    AdjustmentState::of(prior.adjustment_type, prior.quantity),
                    AdjustmentState::of(changes.adjustment_type, changes.quantity),
                )
                .await?;

                let updated = SupplierAdjustment {
                    quantity: changes.quantity,
                    total_price_cents: prior.unit_price().multiply_quantity(changes.quantity).cents(),
                    applied_reduction_cents: plan.applied_reduction.cents(),
                    adjustment_type: changes.adjustment_type,
                    note: clean_note(changes.note),
                    updated_at: Utc::now(),
                    ..prior.clone()
                };

                // Matching on the prior state catches a concurrent edit of the same record
                let result = sqlx::query(
                    r#"
                    UPDATE supplier_adjustments
                    SET quantity = ?1, total_price_cents = ?2, adjustment_type = ?3,
                        note = ?4, updated_at = ?5
                    WHERE id = ?6 AND quantity = ?7 AND adjustment_type = ?8
                    "#,
                )
                .bind(updated.quantity)
                .bind(updated.total_price_cents)
                .bind(updated.adjustment_type)
                .bind(&updated.note)
                .bind(updated.updated_at)
                .bind(&updated.id)
                .bind(prior.quantity)
                .bind(prior.adjustment_type)
                .execute(&mut *conn)
                .await?;
                ensure_swapped(result.rows_affected(), ADJUSTMENTS_COLLECTION)?;

                trace::record(
                    &mut *conn,
                    ADJUSTMENTS_COLLECTION,
                    &prior.id,
                    TraceAction::Edit,
                    &prior,
                    &actor,
                    &reason,
                )
                .await?;

                Ok(updated)
            })
        })
        .await?;

        info!(
            id = %updated.id,
            quantity = updated.quantity,
            adjustment_type = ?updated.adjustment_type,
            "Adjustment edited"
        );
        Ok(updated)
    }

    /// Removes an adjustment and reverses its effect.
    pub async fn delete(&self, id: &str, actor: &str, reason: &str) -> LedgerResult<DeleteTrace> {
        let reason = validate_reason(reason, "delete adjustment")?;
        validate_actor(actor)?;

        let id = id.to_string();
        let actor = actor.to_string();

        let trace = with_retryable_transaction(&self.pool, &self.retry, "adjustment_delete", |conn| {
            let (id, actor, reason) = (id.clone(), actor.clone(), reason.clone());
            Box::pin(async move {
                let prior = require(&mut *conn, &id).await?;
                let (bill, product) = load_line(&mut *conn, &prior.bill_number, &prior.barcode).await?;

                apply_transition(
                    &mut *conn,
                    &bill,
                    &product,
                    prior.unit_price(),
                    prior.applied_reduction(),
                    AdjustmentState::of(prior.adjustment_type, prior.quantity),
                    AdjustmentState::None,
                )
                .await?;

                let result = sqlx::query(
                    "DELETE FROM supplier_adjustments \
                     WHERE id = ?1 AND quantity = ?2 AND adjustment_type = ?3",
                )
                .bind(&prior.id)
                .bind(prior.quantity)
                .bind(prior.adjustment_type)
                .execute(&mut *conn)
                .await?;
                ensure_swapped(result.rows_affected(), ADJUSTMENTS_COLLECTION)?;

                trace::record(
                    &mut *conn,
                    ADJUSTMENTS_COLLECTION,
                    &prior.id,
                    TraceAction::Delete,
                    &prior,
                    &actor,
                    &reason,
                )
                .await
            })
        })
        .await?;

        info!(id = %trace.document_id, actor = %trace.actor, "Adjustment deleted");
        Ok(trace)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Database;
    use crate::test_support::{deal_of, seed_bill, seed_product, stock_of, test_db};

    /// Bill B1: deal 500.00, product A (10 @ 50.00) and product B (5 @ 20.00).
    async fn bill_b1() -> Database {
        let db = test_db().await;
        seed_bill(&db, "B1", 50_000, 0).await;
        seed_product(&db, "B1", "A", 10, 5_000, 7_500).await;
        seed_product(&db, "B1", "B", 5, 2_000, 3_000).await;
        db
    }

    fn reduction(barcode: &str, quantity: i64) -> NewAdjustment {
        NewAdjustment {
            bill_number: "B1".to_string(),
            barcode: barcode.to_string(),
            quantity,
            adjustment_type: AdjustmentType::BillReduction,
            note: None,
        }
    }

    async fn state(db: &Database) -> (i64, i64, i64) {
        (stock_of(db, "A").await, stock_of(db, "B").await, deal_of(db, "B1").await)
    }

    #[tokio::test]
    async fn test_bill_reduction_moves_stock_and_shared_deal_amount() {
        let db = bill_b1().await;
        let adj = db.adjustments().create(reduction("A", 2)).await.unwrap();

        assert_eq!(adj.total_price_cents, 10_000);
        assert_eq!(adj.supplier_id, "SUP-TEST");
        assert_eq!(stock_of(&db, "A").await, 8);
        assert_eq!(stock_of(&db, "B").await, 5);

        let products = db.products().list_by_bill("B1").await.unwrap();
        assert!(products.iter().all(|p| p.deal_amount_cents == 40_000));
        let a = db.products().get_by_barcode("A").await.unwrap().unwrap();
        assert_eq!(a.total_price_cents, 40_000);
    }

    #[tokio::test]
    async fn test_return_replacement_is_record_only() {
        let db = bill_b1().await;
        let mut input = reduction("A", 3);
        input.adjustment_type = AdjustmentType::ReturnReplacement;
        db.adjustments().create(input).await.unwrap();

        assert_eq!(state(&db).await, (10, 5, 50_000));
        assert_eq!(db.adjustments().list_for_bill("B1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_then_delete_restores_state() {
        let db = bill_b1().await;
        let before = state(&db).await;

        let adj = db.adjustments().create(reduction("B", 4)).await.unwrap();
        assert_ne!(state(&db).await, before);

        let trace = db
            .adjustments()
            .delete(&adj.id, "manager", "entered twice")
            .await
            .unwrap();
        assert_eq!(state(&db).await, before);
        assert_eq!(trace.action, TraceAction::Delete);
        assert_eq!(trace.snapshot_json().unwrap()["quantity"], 4);

        let traces = db
            .traces()
            .list_for_document(ADJUSTMENTS_COLLECTION, &adj.id)
            .await
            .unwrap();
        assert_eq!(traces.len(), 1);
        assert!(db.adjustments().get(&adj.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edit_matches_delete_and_recreate() {
        let cases = [
            (2, AdjustmentType::BillReduction, 5, AdjustmentType::BillReduction),
            (5, AdjustmentType::BillReduction, 1, AdjustmentType::BillReduction),
            (3, AdjustmentType::BillReduction, 3, AdjustmentType::ReturnReplacement),
            (3, AdjustmentType::ReturnReplacement, 4, AdjustmentType::BillReduction),
        ];

        for (q1, t1, q2, t2) in cases {
            let edited = bill_b1().await;
            let mut first = reduction("A", q1);
            first.adjustment_type = t1;
            let adj = edited.adjustments().create(first.clone()).await.unwrap();
            edited
                .adjustments()
                .edit(
                    &adj.id,
                    AdjustmentEdit {
                        quantity: q2,
                        adjustment_type: t2,
                        note: Some("recount".into()),
                    },
                    "manager",
                    "recount",
                )
                .await
                .unwrap();

            let recreated = bill_b1().await;
            let adj = recreated.adjustments().create(first).await.unwrap();
            recreated
                .adjustments()
                .delete(&adj.id, "manager", "recount")
                .await
                .unwrap();
            let mut second = reduction("A", q2);
            second.adjustment_type = t2;
            recreated.adjustments().create(second).await.unwrap();

            assert_eq!(state(&edited).await, state(&recreated).await, "{q1} {t1:?} -> {q2} {t2:?}");
        }
    }

    #[tokio::test]
    async fn test_edit_writes_trace_with_prior_document() {
        let db = bill_b1().await;
        let adj = db.adjustments().create(reduction("A", 2)).await.unwrap();

        let updated = db
            .adjustments()
            .edit(
                &adj.id,
                AdjustmentEdit {
                    quantity: 4,
                    adjustment_type: AdjustmentType::BillReduction,
                    note: Some("  damaged  ".into()),
                },
                "manager",
                "second box damaged",
            )
            .await
            .unwrap();

        assert_eq!(updated.quantity, 4);
        assert_eq!(updated.note.as_deref(), Some("damaged"));
        assert_eq!(state(&db).await, (6, 5, 30_000));

        let traces = db
            .traces()
            .list_for_document(ADJUSTMENTS_COLLECTION, &adj.id)
            .await
            .unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].action, TraceAction::Edit);
        assert_eq!(traces[0].snapshot_json().unwrap()["quantity"], 2);
    }

    #[tokio::test]
    async fn test_edit_beyond_stock_is_rejected_without_changes() {
        let db = bill_b1().await;
        let adj = db.adjustments().create(reduction("A", 2)).await.unwrap();
        let before = state(&db).await;

        let err = db
            .adjustments()
            .edit(
                &adj.id,
                AdjustmentEdit {
                    quantity: 11,
                    adjustment_type: AdjustmentType::BillReduction,
                    note: None,
                },
                "manager",
                "typo",
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_ADJUSTMENT_QUANTITY");
        assert_eq!(state(&db).await, before);
        assert_eq!(db.traces().count().await.unwrap(), 0);
        assert_eq!(db.adjustments().get(&adj.id).await.unwrap().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_reason_required_before_any_mutation() {
        let db = bill_b1().await;
        let adj = db.adjustments().create(reduction("A", 2)).await.unwrap();
        let before = state(&db).await;

        let err = db.adjustments().delete(&adj.id, "manager", "").await.unwrap_err();
        assert_eq!(err.code(), "MISSING_REASON");

        let err = db
            .adjustments()
            .edit(
                &adj.id,
                AdjustmentEdit {
                    quantity: 1,
                    adjustment_type: AdjustmentType::BillReduction,
                    note: None,
                },
                "manager",
                "   ",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_REASON");

        assert_eq!(state(&db).await, before);
        assert_eq!(db.traces().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deal_amount_floors_at_zero() {
        let db = test_db().await;
        seed_bill(&db, "B9", 3_000, 0).await;
        seed_product(&db, "B9", "Z", 10, 1_000, 1_500).await;

        db.adjustments()
            .create(NewAdjustment {
                bill_number: "B9".into(),
                barcode: "Z".into(),
                quantity: 5,
                adjustment_type: AdjustmentType::BillReduction,
                note: None,
            })
            .await
            .unwrap();

        assert_eq!(deal_of(&db, "B9").await, 0);
        assert_eq!(stock_of(&db, "Z").await, 5);
    }

    #[tokio::test]
    async fn test_delete_at_floor_restores_original_deal() {
        let db = test_db().await;
        seed_bill(&db, "B9", 3_000, 0).await;
        seed_product(&db, "B9", "Z", 10, 1_000, 1_500).await;
        let before = (stock_of(&db, "Z").await, deal_of(&db, "B9").await);

        let adj = db
            .adjustments()
            .create(NewAdjustment {
                bill_number: "B9".into(),
                barcode: "Z".into(),
                quantity: 5,
                adjustment_type: AdjustmentType::BillReduction,
                note: None,
            })
            .await
            .unwrap();
        assert_eq!(adj.total_price_cents, 5_000);
        assert_eq!(adj.applied_reduction_cents, 3_000);

        db.adjustments()
            .delete(&adj.id, "manager", "wrong bill")
            .await
            .unwrap();
        assert_eq!((stock_of(&db, "Z").await, deal_of(&db, "B9").await), before);
        assert_eq!(before, (10, 3_000));
    }

    #[tokio::test]
    async fn test_edit_at_floor_matches_delete_and_recreate() {
        async fn floored_bill() -> Database {
            let db = test_db().await;
            seed_bill(&db, "B9", 3_000, 0).await;
            seed_product(&db, "B9", "Z", 10, 1_000, 1_500).await;
            db
        }
        fn reduce(quantity: i64) -> NewAdjustment {
            NewAdjustment {
                bill_number: "B9".into(),
                barcode: "Z".into(),
                quantity,
                adjustment_type: AdjustmentType::BillReduction,
                note: None,
            }
        }
        async fn line(db: &Database) -> (i64, i64) {
            (stock_of(db, "Z").await, deal_of(db, "B9").await)
        }

        for q2 in [1, 2, 6] {
            let edited = floored_bill().await;
            let adj = edited.adjustments().create(reduce(5)).await.unwrap();
            let updated = edited
                .adjustments()
                .edit(
                    &adj.id,
                    AdjustmentEdit {
                        quantity: q2,
                        adjustment_type: AdjustmentType::BillReduction,
                        note: None,
                    },
                    "manager",
                    "recount",
                )
                .await
                .unwrap();

            let recreated = floored_bill().await;
            let adj = recreated.adjustments().create(reduce(5)).await.unwrap();
            recreated
                .adjustments()
                .delete(&adj.id, "manager", "recount")
                .await
                .unwrap();
            let again = recreated.adjustments().create(reduce(q2)).await.unwrap();

            assert_eq!(line(&edited).await, line(&recreated).await, "q2 = {q2}");
            assert_eq!(updated.applied_reduction_cents, again.applied_reduction_cents);
        }
    }

    #[tokio::test]
    async fn test_missing_references_are_distinct() {
        let db = bill_b1().await;

        let mut input = reduction("A", 1);
        input.bill_number = "B404".into();
        let err = db.adjustments().create(input).await.unwrap_err();
        assert_eq!(err.code(), "BILL_NOT_FOUND");

        let err = db.adjustments().create(reduction("Q", 1)).await.unwrap_err();
        assert_eq!(err.code(), "PRODUCT_NOT_FOUND");

        let err = db
            .adjustments()
            .delete("no-such-id", "manager", "cleanup")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ADJUSTMENT_NOT_FOUND");
    }
}
