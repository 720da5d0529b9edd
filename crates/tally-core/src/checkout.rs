//! # Checkout Module
//!
//! The pure half of a sale checkout: request validation, stock staging,
//! order totals and invoice numbering. The store half (reads, writes and
//! retries) lives in `tally_db::repository::sale`.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CheckoutRequest                                                        │
//! │       │ validate()                                                      │
//! │       ▼                                                                 │
//! │  [tx] peek invoice counter ──► next_count                               │
//! │  [tx] resolve each line ──► (Product, qty)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  stage_decrements()  ── duplicates merged, stock checked ──► Staged[]   │
//! │  OrderTotals::compute(subtotal, pricing)                                │
//! │  invoice_number(sold_at, next_count)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  [tx] write sale + items, apply staged stock, commit counter            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{PaymentMethod, Product, ProductRef, Rate};
use crate::validation::{validate_cart_size, validate_quantity, validate_rate_bps};

// =============================================================================
// Request Types
// =============================================================================

/// How the discount of a sale is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Percentage of the subtotal.
    Percentage(Rate),
    /// Fixed amount off the order.
    Fixed(Money),
}

impl Default for Discount {
    fn default() -> Self {
        Discount::Fixed(Money::zero())
    }
}

/// VAT, discount and shipping applied on top of the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PricingAdjustments {
    pub vat: Rate,
    pub discount: Discount,
    pub shipping: Money,
}

impl PricingAdjustments {
    pub fn validate(&self) -> CoreResult<()> {
        validate_rate_bps("vat", self.vat.bps())?;
        match self.discount {
            Discount::Percentage(rate) => validate_rate_bps("discount", rate.bps())?,
            Discount::Fixed(amount) if amount.is_negative() => {
                return Err(ValidationError::OutOfRange {
                    field: "discount".to_string(),
                    min: 0,
                    max: i64::MAX,
                }
                .into())
            }
            Discount::Fixed(_) => {}
        }
        if self.shipping.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "shipping".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }
        Ok(())
    }
}

/// One line of the cart as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: ProductRef,
    pub quantity: i64,
}

/// Customer named on a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerIdentity {
    pub name: String,
    pub number: String,
}

/// Everything needed to commit one sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub pricing: PricingAdjustments,
    pub payment_method: PaymentMethod,
    pub customer: Option<CustomerIdentity>,
    /// Backdated sale time; defaults to now.
    pub sold_at: Option<DateTime<Utc>>,
    pub staff_id: String,
    /// Amount settled up front on a due sale.
    pub amount_paid: Option<Money>,
}

impl CheckoutRequest {
    /// Checks everything that does not need the store.
    pub fn validate(&self) -> CoreResult<()> {
        validate_cart_size(self.lines.len())?;
        for line in &self.lines {
            validate_quantity(line.quantity)?;
        }
        self.pricing.validate()?;

        if self.staff_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "staff_id".to_string(),
            }
            .into());
        }

        if self.payment_method.is_due() {
            let has_number = self
                .customer
                .as_ref()
                .is_some_and(|c| !c.number.trim().is_empty());
            if !has_number {
                return Err(ValidationError::Required {
                    field: "customer number".to_string(),
                }
                .into());
            }
            if self.amount_paid.is_some_and(|paid| paid.is_negative()) {
                return Err(CoreError::invalid_payment("amount paid cannot be negative"));
            }
        } else if self.amount_paid.is_some() {
            return Err(ValidationError::NotAllowed {
                field: "amount_paid".to_string(),
                allowed: vec!["due sales only".to_string()],
            }
            .into());
        }

        Ok(())
    }

    /// Amount recorded as paid on the sale once its total is known.
    pub fn paid_on_commit(&self, total: Money) -> CoreResult<Money> {
        if !self.payment_method.is_due() {
            return Ok(total);
        }
        let paid = self.amount_paid.unwrap_or_default();
        if paid > total {
            return Err(CoreError::invalid_payment(format!(
                "amount paid {} exceeds sale total {}",
                paid, total
            )));
        }
        Ok(paid)
    }
}

// =============================================================================
// Stock Staging
// =============================================================================

/// A product update computed during checkout but not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDecrement {
    pub product_id: String,
    pub barcode: String,
    pub name: String,
    pub retail_price: Money,
    /// Units sold on this sale (all lines for the product merged).
    pub requested: i64,
    pub new_quantity: i64,
    pub new_total_price: Money,
    /// Version read with the product; the write is conditional on it.
    pub expected_version: i64,
}

impl StagedDecrement {
    #[inline]
    pub fn line_total(&self) -> Money {
        self.retail_price.multiply_quantity(self.requested)
    }
}

/// Stages the stock decrement for one product.
///
/// ## Example
/// ```rust,ignore
/// // product.quantity == 10
/// let staged = stage_decrement(&product, 6)?;
/// assert_eq!(staged.new_quantity, 4);
/// stage_decrement(&product, 11); // Err(InsufficientStock)
/// ```
pub fn stage_decrement(product: &Product, requested: i64) -> CoreResult<StagedDecrement> {
    if requested > product.quantity {
        return Err(CoreError::InsufficientStock {
            barcode: product.barcode.clone(),
            available: product.quantity,
            requested,
        });
    }

    let new_quantity = product.quantity - requested;
    Ok(StagedDecrement {
        product_id: product.id.clone(),
        barcode: product.barcode.clone(),
        name: product.name.clone(),
        retail_price: product.retail_price(),
        requested,
        new_quantity,
        new_total_price: product.stock_value_at(new_quantity),
        expected_version: product.version,
    })
}

/// Stages every resolved cart line.
///
/// Lines resolving to the same product are merged first (in order of first
/// appearance), so two lines of 6 against a stock of 10 fail as one request
/// of 12 instead of passing individually.
pub fn stage_decrements(resolved: &[(Product, i64)]) -> CoreResult<Vec<StagedDecrement>> {
    let mut merged: Vec<(&Product, i64)> = Vec::with_capacity(resolved.len());
    for (product, qty) in resolved {
        match merged.iter_mut().find(|(p, _)| p.id == product.id) {
            Some((_, total)) => *total += qty,
            None => merged.push((product, *qty)),
        }
    }

    merged
        .into_iter()
        .map(|(product, qty)| stage_decrement(product, qty))
        .collect()
}

// =============================================================================
// Order Totals
// =============================================================================

/// Monetary breakdown of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub vat: Money,
    pub discount: Money,
    pub shipping: Money,
    pub total: Money,
}

impl OrderTotals {
    /// `total = subtotal + vat + shipping − discount`.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::checkout::{Discount, OrderTotals, PricingAdjustments};
    /// use tally_core::{Money, Rate};
    ///
    /// let pricing = PricingAdjustments {
    ///     vat: Rate::from_bps(500),
    ///     discount: Discount::Percentage(Rate::from_bps(1000)),
    ///     shipping: Money::from_cents(6_000),
    /// };
    /// let totals = OrderTotals::compute(Money::from_cents(100_000), &pricing).unwrap();
    /// assert_eq!(totals.vat.cents(), 5_000);
    /// assert_eq!(totals.discount.cents(), 10_000);
    /// assert_eq!(totals.total.cents(), 101_000);
    /// ```
    pub fn compute(subtotal: Money, pricing: &PricingAdjustments) -> CoreResult<Self> {
        let vat = subtotal.percentage(pricing.vat);
        let discount = match pricing.discount {
            Discount::Percentage(rate) => subtotal.percentage(rate),
            Discount::Fixed(amount) => amount,
        };
        let gross = subtotal
            .checked_add(vat)
            .and_then(|amount| amount.checked_add(pricing.shipping))
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "shipping".to_string(),
                min: 0,
                max: i64::MAX - subtotal.cents().saturating_add(vat.cents()),
            })?;
        let total = gross - discount;

        if total.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "discount".to_string(),
                min: 0,
                max: gross.cents(),
            }
            .into());
        }

        Ok(OrderTotals {
            subtotal,
            vat,
            discount,
            shipping: pricing.shipping,
            total,
        })
    }

    /// Totals for a set of staged lines.
    pub fn for_staged(staged: &[StagedDecrement], pricing: &PricingAdjustments) -> CoreResult<Self> {
        let subtotal: Money = staged.iter().map(StagedDecrement::line_total).sum();
        Self::compute(subtotal, pricing)
    }
}

// =============================================================================
// Invoice Numbers
// =============================================================================

/// Derives the invoice number from the sale time and its sequence value.
///
/// Format: `YYYYMMDDhhmmss-NNNNNN`. Unique as long as the sequence is.
///
/// ## Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use tally_core::checkout::invoice_number;
///
/// let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
/// assert_eq!(invoice_number(at, 42), "20240309140507-000042");
/// ```
pub fn invoice_number(sold_at: DateTime<Utc>, count: i64) -> String {
    format!("{}-{:06}", sold_at.format("%Y%m%d%H%M%S"), count)
}

// =============================================================================
// Unit Tests
// =============================================================================
