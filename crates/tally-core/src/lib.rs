//! # tally-core: Pure Ledger Logic for Tally POS
//!
//! This crate holds the rules that keep stock levels, bill totals, paid
//! amounts and payment history consistent. It contains no I/O; every
//! function takes the state it needs and returns what should be written.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             Callers (UI, CLI, seed binary)                      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 tally-db (Ledger Store)                         │   │
//! │  │   retryable transactions, repositories, migrations              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ calls                                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌────────────┐ ┌──────────────┐    │   │
//! │  │   │ checkout │ │adjustment│ │  balance   │ │  validation  │    │   │
//! │  │   │ totals   │ │ planner  │ │ paid/remain│ │  rules       │    │   │
//! │  │   │ invoice# │ │ diff/undo│ │ allocation │ │              │    │   │
//! │  │   └──────────┘ └──────────┘ └────────────┘ └──────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Bill, Product, Sale, payments, traces)
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Input validation
//! - [`checkout`] - Stock staging, order totals, invoice numbers
//! - [`adjustment`] - Supplier-return effect planning
//! - [`balance`] - Paid/remaining computation and payment checks
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::balance::Balance;
//! use tally_core::money::Money;
//!
//! // Bill of 500.00, 100.00 seeded as paid, one 150.00 payment on the log
//! let balance = Balance::compute(
//!     Money::from_cents(50_000),
//!     Money::from_cents(10_000),
//!     [Money::from_cents(15_000)],
//! );
//! assert_eq!(balance.remaining.cents(), 25_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adjustment;
pub mod balance;
pub mod checkout;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Counter key for sale invoice numbers.
pub const INVOICE_COUNTER_KEY: &str = "invoice";

/// Counter key for supplier ids.
pub const SUPPLIER_COUNTER_KEY: &str = "supplier";

/// Maximum lines allowed in a single checkout.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity on a single cart line or adjustment.
///
/// ## Business Reason
/// Catches typos like 10000 instead of 10 before they reach stock.
pub const MAX_ITEM_QUANTITY: i64 = 10_000;
