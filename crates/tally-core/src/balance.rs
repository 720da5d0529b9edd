//! # Balance Module
//!
//! Paid/remaining computation for supplier bills and customer dues, and the
//! checks a new or edited payment must pass.
//!
//! ## Balance Formula
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   paid      = base_paid + Σ log[i].amount                               │
//! │   remaining = total − paid                                              │
//! │                                                                         │
//! │   total      Bill.deal_amount        │  Σ due Sale.total                │
//! │   base_paid  Bill.base_paid          │  Σ due Sale.paid                 │
//! │   log        supplier_transactions   │  customer_transactions           │
//! │                                                                         │
//! │   Recomputed from the full log on every read. Never cached.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshots vs. Live Balance
//! Each payment record stores the remaining balance at the moment it was
//! written. Editing an earlier payment does not rewrite those snapshots;
//! [`replay_history`] recomputes the running balance on read instead.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Balance
// =============================================================================

/// Paid and remaining amounts for a bill, a sale or a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Balance {
    pub total: Money,
    pub paid: Money,
    pub remaining: Money,
}

impl Balance {
    /// Computes a balance from the base amount plus every logged payment.
    pub fn compute<I>(total: Money, base_paid: Money, payments: I) -> Self
    where
        I: IntoIterator<Item = Money>,
    {
        let paid = base_paid + payments.into_iter().sum::<Money>();
        Balance {
            total,
            paid,
            remaining: total - paid,
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.remaining.is_positive()
    }

    /// Balance after a further payment of `amount`.
    pub fn after_payment(&self, amount: Money) -> Self {
        Balance {
            total: self.total,
            paid: self.paid + amount,
            remaining: self.remaining - amount,
        }
    }

    /// Sum of several balances (customer balance over its due sales).
    pub fn combine<I>(balances: I) -> Self
    where
        I: IntoIterator<Item = Balance>,
    {
        balances.into_iter().fold(Balance::default(), |acc, b| Balance {
            total: acc.total + b.total,
            paid: acc.paid + b.paid,
            remaining: acc.remaining + b.remaining,
        })
    }

    /// Checks `0 < amount ≤ remaining`.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::balance::Balance;
    /// use tally_core::Money;
    ///
    /// let balance = Balance::compute(Money::from_cents(1_000), Money::zero(), std::iter::empty());
    /// assert!(balance.check_payment(Money::from_cents(1_000)).is_ok());
    /// assert!(balance.check_payment(Money::from_cents(1_001)).is_err());
    /// assert!(balance.check_payment(Money::zero()).is_err());
    /// ```
    pub fn check_payment(&self, amount: Money) -> CoreResult<()> {
        if !amount.is_positive() {
            return Err(CoreError::invalid_payment("amount must be greater than zero"));
        }
        if amount > self.remaining {
            return Err(CoreError::invalid_payment(format!(
                "amount {} exceeds remaining {}",
                amount, self.remaining
            )));
        }
        Ok(())
    }

    /// Checks replacing a logged payment of `old` with `new`.
    ///
    /// The old amount is released first, so a payment can be raised up to
    /// `remaining + old`.
    pub fn check_amount_edit(&self, old: Money, new: Money) -> CoreResult<()> {
        let released = Balance {
            total: self.total,
            paid: self.paid - old,
            remaining: self.remaining + old,
        };
        released.check_payment(new)
    }
}

// =============================================================================
// Customer Allocation
// =============================================================================

/// Portion of a customer payment the caller applies to one due sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub sale_id: String,
    pub amount: Money,
    /// Line items this portion covers (informational).
    #[serde(default)]
    pub product_ids: Vec<String>,
}

/// Validates a customer payment split across sales and returns its total.
///
/// Each allocation is checked against its own sale's remaining balance, the
/// sum against the customer's. Sales are never prioritized; the caller's
/// split is taken as given.
pub fn validate_allocations<'a, I>(allocations: I, customer: &Balance) -> CoreResult<Money>
where
    I: IntoIterator<Item = (&'a Allocation, &'a Balance)>,
{
    let mut seen = HashSet::new();
    let mut total = Money::zero();

    for (allocation, sale) in allocations {
        if !seen.insert(allocation.sale_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "sale_id".to_string(),
                value: allocation.sale_id.clone(),
            }
            .into());
        }
        sale.check_payment(allocation.amount).map_err(|e| match e {
            CoreError::InvalidPaymentAmount { reason } => CoreError::invalid_payment(format!(
                "sale {}: {}",
                allocation.sale_id, reason
            )),
            other => other,
        })?;
        total += allocation.amount;
    }

    if seen.is_empty() {
        return Err(ValidationError::Required {
            field: "allocations".to_string(),
        }
        .into());
    }

    customer.check_payment(total)?;
    Ok(total)
}

// =============================================================================
// History Replay
// =============================================================================

/// A payment record with its remaining balance recomputed from the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry<T> {
    pub record: T,
    /// Remaining after this payment, given the log as it is now.
    pub remaining_after: Money,
}

/// Replays a payment log and returns it newest first.
///
/// `chronological` must be ordered oldest first; ties keep their input
/// order.
pub fn replay_history<T, F>(
    total: Money,
    base_paid: Money,
    chronological: Vec<T>,
    amount_of: F,
) -> Vec<HistoryEntry<T>>
where
    F: Fn(&T) -> Money,
{
    let mut remaining = total - base_paid;
    let mut entries: Vec<HistoryEntry<T>> = chronological
        .into_iter()
        .map(|record| {
            remaining -= amount_of(&record);
            HistoryEntry {
                record,
                remaining_after: remaining,
            }
        })
        .collect();
    entries.reverse();
    entries
}

// =============================================================================
// Unit Tests
// =============================================================================
