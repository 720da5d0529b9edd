//! # Repository Module
//!
//! Ledger repositories for Tally POS.
//!
//! ## Two Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  db.sales().checkout(request)              ◄── Repository method        │
//! │       │                                        owns the transaction     │
//! │       ▼                                                                 │
//! │  with_retryable_transaction(pool, policy, |conn| ...)                   │
//! │       │                                                                 │
//! │       ├── sequence::peek_next(conn, "invoice")  ◄── free functions on   │
//! │       ├── product::require(conn, &line.product)     the caller's        │
//! │       ├── product::update_stock_versioned(...)      connection; they    │
//! │       └── sequence::commit(conn, &pending)          compose freely      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`BillRepository`](bill::BillRepository) - Supplier bills
//! - [`ProductRepository`](product::ProductRepository) - Product lookup and intake
//! - [`SaleRepository`](sale::SaleRepository) - Checkout and sale deletion
//! - [`AdjustmentRepository`](adjustment::AdjustmentRepository) - Returns and bill reductions
//! - [`SupplierPaymentRepository`](supplier_payment::SupplierPaymentRepository) - Bill payments
//! - [`CustomerPaymentRepository`](customer_payment::CustomerPaymentRepository) - Due collections
//! - [`CustomerRepository`](customer::CustomerRepository) - Customer profiles
//! - [`SequenceRepository`](sequence::SequenceRepository) - Counters
//! - [`TraceRepository`](trace::TraceRepository) - Delete traces

pub mod adjustment;
pub mod bill;
pub mod customer;
pub mod customer_payment;
pub mod product;
pub mod sale;
pub mod sequence;
pub mod supplier_payment;
pub mod trace;
