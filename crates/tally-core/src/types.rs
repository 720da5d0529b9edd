//! # Domain Types
//!
//! Core domain types used throughout the Tally ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐  1   N ┌─────────────────┐                         │
//! │  │      Bill       │◄───────│    Product      │                         │
//! │  │  ─────────────  │        │  ─────────────  │                         │
//! │  │  bill_number    │        │  id / barcode   │                         │
//! │  │  deal_amount    │        │  quantity       │                         │
//! │  │  base_paid      │        │  unit_price     │                         │
//! │  └────────┬────────┘        └────────┬────────┘                         │
//! │           │ 1                        │ sold by                          │
//! │           │ N                        ▼                                  │
//! │  ┌────────┴────────┐        ┌─────────────────┐   ┌─────────────────┐   │
//! │  │ SupplierAdjust- │        │      Sale       │◄──│ CustomerTrans-  │   │
//! │  │ ment / Supplier │        │  invoice_number │   │ action          │   │
//! │  │ Transaction     │        │  total, items   │   │ sales_paid[]    │   │
//! │  └─────────────────┘        └─────────────────┘   └─────────────────┘   │
//! │                                                                         │
//! │  DeleteTrace: append-only audit of every destructive change             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## One Bill, One Deal Amount
//! The deal amount lives on the [`Bill`] only. Every [`Product`] of a bill
//! reads it through the `bill_number` reference, so all line items of a bill
//! always agree on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Rate
// =============================================================================

/// A percentage represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 750 bps = 7.5% VAT, 1000 bps = 10% discount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a percentage (for convenience at the boundary).
    pub fn from_percentage(pct: f64) -> Self {
        Rate((pct * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

// =============================================================================
// Bill
// =============================================================================

/// One supplier delivery: the aggregate that owns the deal amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Bill {
    pub bill_number: String,
    pub supplier_id: String,
    /// Agreed outstanding total for the whole bill.
    pub deal_amount_cents: i64,
    /// Legacy paid value seeded at intake; payments add on top of it.
    pub base_paid_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
}

impl Bill {
    #[inline]
    pub fn deal_amount(&self) -> Money {
        Money::from_cents(self.deal_amount_cents)
    }

    #[inline]
    pub fn base_paid(&self) -> Money {
        Money::from_cents(self.base_paid_cents)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A stocked line item of a supplier bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Internal document id (UUID v4).
    pub id: String,

    /// Scanned barcode - business identifier.
    pub barcode: String,

    pub name: String,

    pub supplier_id: String,

    pub bill_number: String,

    /// Current stock, never negative.
    pub quantity: i64,

    /// Purchase price per unit.
    pub unit_price_cents: i64,

    /// Selling price per unit.
    pub retail_price_cents: i64,

    /// quantity × unit_price, recomputed on every stock change.
    pub total_price_cents: i64,

    /// The owning bill's deal amount (read through the bill).
    pub deal_amount_cents: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
}

impl Product {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn retail_price(&self) -> Money {
        Money::from_cents(self.retail_price_cents)
    }

    #[inline]
    pub fn deal_amount(&self) -> Money {
        Money::from_cents(self.deal_amount_cents)
    }

    /// Stock value at a given quantity (quantity × unit_price).
    #[inline]
    pub fn stock_value_at(&self, quantity: i64) -> Money {
        self.unit_price().multiply_quantity(quantity)
    }
}

/// How a caller refers to a product: by document id or by scanned barcode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProductRef {
    Id(String),
    Barcode(String),
}

impl std::fmt::Display for ProductRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductRef::Id(id) => write!(f, "id:{}", id),
            ProductRef::Barcode(code) => write!(f, "barcode:{}", code),
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileBanking,
    BankTransfer,
    /// Deferred payment: the sale becomes a customer receivable.
    Due,
}

impl PaymentMethod {
    /// Returns true if the sale is tracked as a customer due.
    #[inline]
    pub fn is_due(&self) -> bool {
        matches!(self, PaymentMethod::Due)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::MobileBanking => "mobile_banking",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Due => "due",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Supplier Adjustment
// =============================================================================

/// Kind of supplier return.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    /// Goods swapped by the supplier. Audit record only.
    ReturnReplacement,
    /// Goods sent back for credit: lowers stock and the bill's deal amount.
    BillReduction,
}

impl AdjustmentType {
    /// Returns true if this adjustment type mutates stock and the bill.
    #[inline]
    pub fn affects_stock(&self) -> bool {
        matches!(self, AdjustmentType::BillReduction)
    }
}

/// A supplier-return record against a bill line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SupplierAdjustment {
    pub id: String,
    pub supplier_id: String,
    pub bill_number: String,
    pub barcode: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// quantity × unit_price at the time of the last write.
    pub total_price_cents: i64,
    /// Amount this record took off the bill's deal amount. Below
    /// `total_price_cents` when the deal amount bottomed out at zero.
    pub applied_reduction_cents: i64,
    pub adjustment_type: AdjustmentType,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl SupplierAdjustment {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn applied_reduction(&self) -> Money {
        Money::from_cents(self.applied_reduction_cents)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Value drawn from the invoice sequence.
    pub sale_count: i64,
    pub invoice_number: String,
    pub subtotal_cents: i64,
    pub vat_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    /// Amount settled at checkout. Equals total unless the sale is a due.
    pub paid_cents: i64,
    pub payment_method: PaymentMethod,
    pub customer_name: Option<String>,
    pub customer_number: Option<String>,
    pub staff_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn paid(&self) -> Money {
        Money::from_cents(self.paid_cents)
    }
}

/// A line of a sale. Product data is frozen at the time of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub barcode: String,
    pub name_snapshot: String,
    /// Retail price per unit at the time of sale.
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
}

impl SaleItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

/// Customer profile refreshed after each checkout that names a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub customer_number: String,
    pub name: String,
    pub purchase_count: i64,
    #[ts(as = "String")]
    pub first_purchase_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub last_purchase_at: DateTime<Utc>,
}

// =============================================================================
// Payment Log
// =============================================================================

/// An append-only payment against a supplier bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SupplierTransaction {
    pub id: String,
    pub bill_number: String,
    pub supplier_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub paid_at: DateTime<Utc>,
    /// Remaining balance as computed when the payment was recorded.
    pub remaining_snapshot_cents: i64,
}

impl SupplierTransaction {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// Portion of a customer payment applied to one sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalePayment {
    pub sale_id: String,
    /// Line items the customer says this portion covers (informational).
    pub product_ids: Vec<String>,
    pub amount_cents: i64,
}

/// An append-only payment against one or more due sales of a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerTransaction {
    pub id: String,
    pub customer_number: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub paid_at: DateTime<Utc>,
    pub remaining_snapshot_cents: i64,
    pub sales_paid: Vec<SalePayment>,
}

impl CustomerTransaction {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Amount of this payment applied to a given sale.
    pub fn paid_towards(&self, sale_id: &str) -> Money {
        self.sales_paid
            .iter()
            .filter(|p| p.sale_id == sale_id)
            .map(|p| Money::from_cents(p.amount_cents))
            .sum()
    }
}

// =============================================================================
// Delete Trace
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TraceAction {
    Delete,
    Edit,
}

/// Append-only record of a destructive change: who, why, and the full
/// document as it was before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DeleteTrace {
    pub id: String,
    /// Source collection, e.g. "supplier_adjustments".
    pub collection: String,
    pub document_id: String,
    pub action: TraceAction,
    /// Prior document state as JSON.
    pub snapshot: String,
    pub actor: String,
    pub reason: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl DeleteTrace {
    /// Parses the stored snapshot back into JSON.
    pub fn snapshot_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.snapshot)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_from_bps() {
        let rate = Rate::from_bps(750);
        assert_eq!(rate.bps(), 750);
        assert!((rate.percentage() - 7.5).abs() < 0.001);
        assert_eq!(Rate::from_percentage(7.5), rate);
    }

    #[test]
    fn test_adjustment_type_side_effects() {
        assert!(AdjustmentType::BillReduction.affects_stock());
        assert!(!AdjustmentType::ReturnReplacement.affects_stock());
    }

    #[test]
    fn test_payment_method_serde() {
        let json = serde_json::to_string(&PaymentMethod::MobileBanking).unwrap();
        assert_eq!(json, "\"mobile_banking\"");
        assert!(PaymentMethod::Due.is_due());
        assert!(!PaymentMethod::Cash.is_due());
    }

    #[test]
    fn test_paid_towards_sums_matching_allocations() {
        let txn = CustomerTransaction {
            id: "t1".into(),
            customer_number: "017".into(),
            amount_cents: 700,
            method: PaymentMethod::Cash,
            reference: None,
            paid_at: Utc::now(),
            remaining_snapshot_cents: 0,
            sales_paid: vec![
                SalePayment {
                    sale_id: "a".into(),
                    product_ids: vec![],
                    amount_cents: 500,
                },
                SalePayment {
                    sale_id: "b".into(),
                    product_ids: vec![],
                    amount_cents: 200,
                },
            ],
        };
        assert_eq!(txn.paid_towards("a").cents(), 500);
        assert_eq!(txn.paid_towards("c").cents(), 0);
    }

    #[test]
    fn test_product_ref_display() {
        assert_eq!(ProductRef::Barcode("890".into()).to_string(), "barcode:890");
    }
}
