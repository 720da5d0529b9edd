//! # Adjustment Module
//!
//! Plans the stock and bill effects of supplier-return adjustments.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            create                          create                      │
//! │   ┌──────────────────────┐  ┌────────┐  ┌──────────────────────┐        │
//! │   │ ReturnReplacement(q) │◄─│  None  │─►│   BillReduction(q)   │        │
//! │   │  audit only          │─►│        │◄─│  stock −q            │        │
//! │   └──────────────────────┘  └────────┘  │  deal  −unit×q       │        │
//! │            delete              delete   └──────────────────────┘        │
//! │                                                                         │
//! │   Stock moves by one number:                                            │
//! │     diff = stock_qty(to) − stock_qty(from)                              │
//! │     product.quantity  −= diff                                           │
//! │                                                                         │
//! │   The deal amount is rebuilt from what the record actually took off:    │
//! │     base              = deal_amount + applied(from)                     │
//! │     bill.deal_amount  = max(0, base − unit_price × stock_qty(to))       │
//! │     applied(to)       = base − bill.deal_amount                         │
//! │                                                                         │
//! │   create = None → X, delete = X → None, edit = X → Y                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Because create, edit and delete share one formula, editing `q1 → q2`
//! lands on the same stock and deal amount as deleting and recreating with
//! `q2`, and create followed by delete restores both exactly.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::AdjustmentType;

// =============================================================================
// Adjustment State
// =============================================================================

/// Where a single adjustment record stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentState {
    /// No record (before create, after delete).
    None,
    ReturnReplacement(i64),
    BillReduction(i64),
}

impl AdjustmentState {
    pub fn of(adjustment_type: AdjustmentType, quantity: i64) -> Self {
        match adjustment_type {
            AdjustmentType::ReturnReplacement => AdjustmentState::ReturnReplacement(quantity),
            AdjustmentType::BillReduction => AdjustmentState::BillReduction(quantity),
        }
    }

    /// Units this state holds out of stock.
    #[inline]
    pub fn stock_quantity(&self) -> i64 {
        match self {
            AdjustmentState::BillReduction(q) => *q,
            AdjustmentState::None | AdjustmentState::ReturnReplacement(_) => 0,
        }
    }

    /// Stock units that move when going from `self` to `to`.
    #[inline]
    pub fn diff_to(&self, to: &AdjustmentState) -> i64 {
        to.stock_quantity() - self.stock_quantity()
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Current state of the product line and its bill, read inside the
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockPosition {
    pub barcode: String,
    pub quantity: i64,
    pub deal_amount: Money,
}

/// The writes a transition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustmentPlan {
    /// Units removed from stock (negative restores).
    pub diff: i64,
    pub new_quantity: i64,
    pub new_deal_amount: Money,
    /// Amount the record holds off the deal after the transition. Less than
    /// `unit_price × quantity` when the deal amount hit zero.
    pub applied_reduction: Money,
}

impl AdjustmentPlan {
    /// A plan with no product or bill writes.
    pub fn untouched(position: &StockPosition, applied: Money) -> Self {
        AdjustmentPlan {
            diff: 0,
            new_quantity: position.quantity,
            new_deal_amount: position.deal_amount,
            applied_reduction: applied,
        }
    }

    #[inline]
    pub fn touches_stock(&self) -> bool {
        self.diff != 0
    }
}

/// Plans a transition between two adjustment states.
///
/// ## Rules
/// - `diff > 0` takes units out of stock and fails with
///   [`CoreError::InvalidAdjustmentQuantity`] if fewer than `diff` remain
/// - `diff < 0` restores units (never rejected)
/// - `applied` is what `from` currently holds off the deal amount. It is
///   given back in full before the reduction of `to` is taken, and the deal
///   amount never goes below zero
///
/// Creating a bill reduction is the transition from `None`, so a reduction
/// larger than the remaining stock is rejected rather than clamping the
/// stock to zero.
///
/// ## Example
/// ```rust
/// use tally_core::adjustment::{plan_transition, AdjustmentState, StockPosition};
/// use tally_core::Money;
///
/// let position = StockPosition {
///     barcode: "A".into(),
///     quantity: 10,
///     deal_amount: Money::from_cents(50_000),
/// };
/// let plan = plan_transition(
///     AdjustmentState::None,
///     AdjustmentState::BillReduction(2),
///     Money::from_cents(5_000),
///     Money::zero(),
///     &position,
/// )
/// .unwrap();
/// assert_eq!(plan.new_quantity, 8);
/// assert_eq!(plan.new_deal_amount.cents(), 40_000);
/// assert_eq!(plan.applied_reduction.cents(), 10_000);
/// ```
pub fn plan_transition(
    from: AdjustmentState,
    to: AdjustmentState,
    unit_price: Money,
    applied: Money,
    position: &StockPosition,
) -> CoreResult<AdjustmentPlan> {
    let diff = from.diff_to(&to);
    if diff == 0 {
        return Ok(AdjustmentPlan::untouched(position, applied));
    }

    if diff > position.quantity {
        return Err(CoreError::InvalidAdjustmentQuantity {
            barcode: position.barcode.clone(),
            required: diff,
            available: position.quantity,
        });
    }

    let base = position.deal_amount + applied;
    let new_deal_amount =
        (base - unit_price.multiply_quantity(to.stock_quantity())).clamp_non_negative();

    Ok(AdjustmentPlan {
        diff,
        new_quantity: position.quantity - diff,
        new_deal_amount,
        applied_reduction: base - new_deal_amount,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: Money = Money::from_cents(5_000);

    fn position(quantity: i64, deal: i64) -> StockPosition {
        StockPosition {
            barcode: "A".to_string(),
            quantity,
            deal_amount: Money::from_cents(deal),
        }
    }

    /// Position after the plan, plus what the record now holds off the deal.
    fn apply(pos: &StockPosition, plan: &AdjustmentPlan) -> (StockPosition, Money) {
        let next = StockPosition {
            barcode: pos.barcode.clone(),
            quantity: plan.new_quantity,
            deal_amount: plan.new_deal_amount,
        };
        (next, plan.applied_reduction)
    }

    fn step(
        pos: &StockPosition,
        from: AdjustmentState,
        to: AdjustmentState,
        applied: Money,
    ) -> (StockPosition, Money) {
        apply(pos, &plan_transition(from, to, UNIT, applied, pos).unwrap())
    }

    #[test]
    fn test_return_replacement_has_no_effect() {
        let pos = position(10, 50_000);
        let plan = plan_transition(
            AdjustmentState::None,
            AdjustmentState::ReturnReplacement(3),
            UNIT,
            Money::zero(),
            &pos,
        )
        .unwrap();
        assert!(!plan.touches_stock());
        assert_eq!(plan.new_quantity, 10);
        assert_eq!(plan.new_deal_amount.cents(), 50_000);
        assert!(plan.applied_reduction.is_zero());
    }

    #[test]
    fn test_create_then_delete_restores_exactly() {
        let start = position(10, 50_000);
        let (after_create, applied) = step(
            &start,
            AdjustmentState::None,
            AdjustmentState::BillReduction(2),
            Money::zero(),
        );
        assert_eq!(after_create.quantity, 8);
        assert_eq!(after_create.deal_amount.cents(), 40_000);
        assert_eq!(applied.cents(), 10_000);

        let (after_delete, applied) = step(
            &after_create,
            AdjustmentState::BillReduction(2),
            AdjustmentState::None,
            applied,
        );
        assert_eq!(after_delete, start);
        assert!(applied.is_zero());
    }

    #[test]
    fn test_create_then_delete_restores_floored_deal() {
        // 5 × 10.00 against a deal of 30.00: only 30.00 comes off
        let start = position(10, 3_000);
        let unit = Money::from_cents(1_000);
        let created = plan_transition(
            AdjustmentState::None,
            AdjustmentState::BillReduction(5),
            unit,
            Money::zero(),
            &start,
        )
        .unwrap();
        assert!(created.new_deal_amount.is_zero());
        assert_eq!(created.applied_reduction.cents(), 3_000);

        let (after_create, applied) = apply(&start, &created);
        let deleted = plan_transition(
            AdjustmentState::BillReduction(5),
            AdjustmentState::None,
            unit,
            applied,
            &after_create,
        )
        .unwrap();
        assert_eq!(apply(&after_create, &deleted).0, start);
    }

    #[test]
    fn test_edit_matches_delete_then_recreate() {
        // The second start floors the deal amount on create
        for deal in [50_000, 12_000] {
            let start = position(10, deal);
            let (created, applied) = step(
                &start,
                AdjustmentState::None,
                AdjustmentState::BillReduction(3),
                Money::zero(),
            );

            for q2 in [1, 2, 3, 5, 9] {
                let edited = step(
                    &created,
                    AdjustmentState::BillReduction(3),
                    AdjustmentState::BillReduction(q2),
                    applied,
                );

                let (deleted, _) = step(
                    &created,
                    AdjustmentState::BillReduction(3),
                    AdjustmentState::None,
                    applied,
                );
                let recreated = step(
                    &deleted,
                    AdjustmentState::None,
                    AdjustmentState::BillReduction(q2),
                    Money::zero(),
                );

                assert_eq!(edited, recreated, "deal = {}, q2 = {}", deal, q2);
            }
        }
    }

    #[test]
    fn test_edit_beyond_stock_is_rejected() {
        // 8 left after a reduction of 2; going to 11 needs 9 more
        let pos = position(8, 40_000);
        let err = plan_transition(
            AdjustmentState::BillReduction(2),
            AdjustmentState::BillReduction(11),
            UNIT,
            Money::from_cents(10_000),
            &pos,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidAdjustmentQuantity {
                required: 9,
                available: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_create_beyond_stock_is_rejected() {
        let pos = position(3, 40_000);
        let err = plan_transition(
            AdjustmentState::None,
            AdjustmentState::BillReduction(4),
            UNIT,
            Money::zero(),
            &pos,
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_ADJUSTMENT_QUANTITY");
    }

    #[test]
    fn test_negative_diff_restores() {
        let pos = position(0, 0);
        let plan = plan_transition(
            AdjustmentState::BillReduction(4),
            AdjustmentState::BillReduction(1),
            UNIT,
            Money::from_cents(20_000),
            &pos,
        )
        .unwrap();
        assert_eq!(plan.diff, -3);
        assert_eq!(plan.new_quantity, 3);
        assert_eq!(plan.new_deal_amount.cents(), 15_000);
        assert_eq!(plan.applied_reduction.cents(), 5_000);
    }

    #[test]
    fn test_deal_amount_floors_at_zero() {
        let pos = position(10, 3_000);
        let plan = plan_transition(
            AdjustmentState::None,
            AdjustmentState::BillReduction(1),
            UNIT,
            Money::zero(),
            &pos,
        )
        .unwrap();
        assert!(plan.new_deal_amount.is_zero());
        assert_eq!(plan.applied_reduction.cents(), 3_000);
    }

    #[test]
    fn test_type_switch_moves_full_quantity() {
        let pos = position(10, 50_000);
        let plan = plan_transition(
            AdjustmentState::ReturnReplacement(3),
            AdjustmentState::BillReduction(3),
            UNIT,
            Money::zero(),
            &pos,
        )
        .unwrap();
        assert_eq!(plan.diff, 3);
        assert_eq!(plan.applied_reduction.cents(), 15_000);

        let plan = plan_transition(
            AdjustmentState::BillReduction(3),
            AdjustmentState::ReturnReplacement(3),
            UNIT,
            Money::from_cents(15_000),
            &pos,
        )
        .unwrap();
        assert_eq!(plan.diff, -3);
        assert_eq!(plan.new_deal_amount.cents(), 65_000);
        assert!(plan.applied_reduction.is_zero());
    }
}
