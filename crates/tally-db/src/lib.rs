//! # tally-db: Ledger Store for Tally POS
//!
//! This crate owns the SQLite ledger and every workflow that mutates it:
//! checkout, supplier adjustments, supplier and customer payments, and the
//! delete traces they leave behind.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  Caller (POS screen, back office, seed binary)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │   │   │
//! │  │   │               │    │ SaleRepo      │    │              │   │   │
//! │  │   │ SqlitePool    │◄───│ AdjustmentRepo│    │ 001_ledger_  │   │   │
//! │  │   │ RetryPolicy   │    │ PaymentRepos  │    │   schema.sql │   │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘   │   │
//! │  │                                │                               │   │
//! │  │                    with_retryable_transaction (retry.rs)        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `ledger.toml` + environment configuration
//! - [`pool`] - Connection pool creation and repository access
//! - [`retry`] - Retryable transaction combinator
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Store and workflow error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, LedgerConfig};
//!
//! let config = LedgerConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let receipt = db.sales().checkout(request).await?;
//! let balance = db.supplier_payments().bill_balance("B1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod retry;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::LedgerConfig;
pub use error::{DbError, DbResult, LedgerError, LedgerResult};
pub use pool::{Database, DbConfig};
pub use retry::{with_retryable_transaction, RetryPolicy};

// Repository re-exports for convenience
pub use repository::adjustment::{AdjustmentEdit, AdjustmentRepository, NewAdjustment};
pub use repository::bill::{BillRepository, NewBill};
pub use repository::customer::CustomerRepository;
pub use repository::customer_payment::{CustomerPaymentRepository, CustomerPaymentRequest, DueSale};
pub use repository::product::{NewProduct, ProductRepository};
pub use repository::sale::{SaleReceipt, SaleRepository};
pub use repository::sequence::SequenceRepository;
pub use repository::supplier_payment::{
    PaymentEdit, SupplierPaymentRepository, SupplierPaymentRequest,
};
pub use repository::trace::TraceRepository;
