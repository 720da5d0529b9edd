//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Ledger rule violations (stock, payments, ...)  │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  ├── DbError          - Store failures (incl. optimistic conflicts)    │
//! │  └── LedgerError      - What every workflow returns                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant maps to a stable reason code via [`CoreError::code`], so a
//! caller can tell "fix your input" apart from "try again".

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product reference did not resolve.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Requested more units than are in stock.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (qty: 6)
    ///      │
    ///      ▼
    /// Stock check: available=4
    ///      │
    ///      ▼
    /// InsufficientStock { barcode: "8901", available: 4, requested: 6 }
    ///      │
    ///      ▼
    /// Caller shows: "Only 4 left of 8901", nothing was written
    /// ```
    #[error("Insufficient stock for {barcode}: available {available}, requested {requested}")]
    InsufficientStock {
        barcode: String,
        available: i64,
        requested: i64,
    },

    /// A bill_reduction edit would take back more units than are in stock.
    #[error(
        "Invalid adjustment quantity for {barcode}: needs {required} more in stock, only {available} available"
    )]
    InvalidAdjustmentQuantity {
        barcode: String,
        required: i64,
        available: i64,
    },

    /// Payment amount is zero/negative or exceeds what is still owed.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// A destructive operation was attempted without a justification.
    #[error("A reason is required to {action}")]
    MissingReason { action: String },

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Bill not found: {0}")]
    BillNotFound(String),

    #[error("Adjustment not found: {0}")]
    AdjustmentNotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Sale cannot be removed while customer payments reference it.
    #[error("Sale {sale_id} has {payments} payment allocation(s) and cannot be deleted")]
    SaleHasPayments { sale_id: String, payments: usize },

    /// Checkout was called with no cart lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Stable, machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            CoreError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CoreError::InvalidAdjustmentQuantity { .. } => "INVALID_ADJUSTMENT_QUANTITY",
            CoreError::InvalidPaymentAmount { .. } => "INVALID_PAYMENT_AMOUNT",
            CoreError::MissingReason { .. } => "MISSING_REASON",
            CoreError::SaleNotFound(_) => "SALE_NOT_FOUND",
            CoreError::BillNotFound(_) => "BILL_NOT_FOUND",
            CoreError::AdjustmentNotFound(_) => "ADJUSTMENT_NOT_FOUND",
            CoreError::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            CoreError::SaleHasPayments { .. } => "SALE_HAS_PAYMENTS",
            CoreError::EmptyCart => "EMPTY_CART",
            CoreError::Validation(_) => "VALIDATION_ERROR",
        }
    }

    /// Shorthand for [`CoreError::InvalidPaymentAmount`].
    pub fn invalid_payment(reason: impl Into<String>) -> Self {
        CoreError::InvalidPaymentAmount {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before any store access.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, malformed amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., same sale selected twice in one payment).
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            barcode: "8901030".to_string(),
            available: 4,
            requested: 6,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for 8901030: available 4, requested 6"
        );

        let err = CoreError::MissingReason {
            action: "delete adjustment".to_string(),
        };
        assert_eq!(err.to_string(), "A reason is required to delete adjustment");
    }

    #[test]
    fn test_codes_distinguish_taxonomy() {
        assert_eq!(CoreError::EmptyCart.code(), "EMPTY_CART");
        assert_eq!(
            CoreError::invalid_payment("exceeds remaining").code(),
            "INVALID_PAYMENT_AMOUNT"
        );
        assert_eq!(
            CoreError::ProductNotFound("x".into()).code(),
            "PRODUCT_NOT_FOUND"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "barcode".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.code(), "VALIDATION_ERROR");
    }
}
