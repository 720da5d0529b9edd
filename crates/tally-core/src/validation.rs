//! # Validation Module
//!
//! Input validation for every ledger workflow.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (UI / CLI, not part of this workspace)                │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any store access)                        │
//! │  ├── Quantities, amounts, rates                                        │
//! │  └── Mandatory reasons for destructive changes                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Ledger rules inside the transaction (tally-db)               │
//! │  ├── Stock available, remaining balance                                │
//! │  └── CHECK (quantity >= 0), UNIQUE, FOREIGN KEY                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_barcode, validate_quantity};
//!
//! validate_barcode("8901030865278").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::{CoreError, ValidationError};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a scanned barcode.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - Letters, digits and hyphens only
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_barcode;
///
/// assert!(validate_barcode("8901030865278").is_ok());
/// assert!(validate_barcode("").is_err());
/// assert!(validate_barcode("89 01").is_err());
/// ```
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();

    if barcode.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if barcode.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: 64,
        });
    }

    if !barcode.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must contain only letters, digits, and hyphens".to_string(),
        });
    }

    Ok(())
}

/// Validates a bill number.
pub fn validate_bill_number(bill_number: &str) -> ValidationResult<()> {
    let bill_number = bill_number.trim();

    if bill_number.is_empty() {
        return Err(ValidationError::Required {
            field: "bill_number".to_string(),
        });
    }

    if bill_number.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "bill_number".to_string(),
            max: 64,
        });
    }

    Ok(())
}

/// Validates the justification for a destructive change and returns it trimmed.
///
/// ## Rules
/// - Must not be empty or whitespace only
/// - At most 500 characters
///
/// A missing reason is a ledger rule violation ([`CoreError::MissingReason`]),
/// not a plain format problem, so the caller can show the right prompt.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_reason;
///
/// assert_eq!(validate_reason(" damaged box ", "delete adjustment").unwrap(), "damaged box");
/// assert!(validate_reason("   ", "delete adjustment").is_err());
/// ```
pub fn validate_reason(reason: &str, action: &str) -> Result<String, CoreError> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(CoreError::MissingReason {
            action: action.to_string(),
        });
    }

    if reason.len() > 500 {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: 500,
        }
        .into());
    }

    Ok(reason.to_string())
}

/// Validates the actor recorded on a delete trace.
pub fn validate_actor(actor: &str) -> ValidationResult<()> {
    if actor.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "actor".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity value.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
///
/// ## User Workflow
/// ```text
/// Cart line / adjustment quantity: 5
///      │
///      ▼
/// validate_quantity(5) ← THIS FUNCTION
///      │
///      ├── qty <= 0?      → MustBePositive
///      ├── qty > 10000?   → OutOfRange
///      └── OK → stock check inside the transaction
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a payment amount in cents.
///
/// Only the sign is checked here; the upper bound (remaining balance) is a
/// ledger rule checked in [`crate::balance`].
pub fn validate_payment_amount(cents: i64) -> Result<(), CoreError> {
    if cents <= 0 {
        return Err(CoreError::invalid_payment("amount must be greater than zero"));
    }

    Ok(())
}

/// Validates a VAT or discount rate in basis points (0% to 100%).
pub fn validate_rate_bps(field: &str, bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines in a checkout.
pub fn validate_cart_size(lines: usize) -> Result<(), CoreError> {
    if lines == 0 {
        return Err(CoreError::EmptyCart);
    }

    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        }
        .into());
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("8901030865278").is_ok());
        assert!(validate_barcode("SKU-22").is_ok());

        assert!(validate_barcode("").is_err());
        assert!(validate_barcode("   ").is_err());
        assert!(validate_barcode("has space").is_err());
        assert!(validate_barcode(&"9".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert_eq!(validate_reason("  wrong count ", "edit").unwrap(), "wrong count");

        let err = validate_reason("", "delete sale").unwrap_err();
        assert_eq!(err.code(), "MISSING_REASON");

        let err = validate_reason(&"x".repeat(501), "delete sale").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_payment_amount() {
        assert!(validate_payment_amount(1).is_ok());
        assert_eq!(
            validate_payment_amount(0).unwrap_err().code(),
            "INVALID_PAYMENT_AMOUNT"
        );
        assert!(validate_payment_amount(-500).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(matches!(validate_cart_size(0), Err(CoreError::EmptyCart)));
        assert!(validate_cart_size(1).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS + 1).is_err());
    }

    #[test]
    fn test_validate_rate_bps() {
        assert!(validate_rate_bps("vat", 0).is_ok());
        assert!(validate_rate_bps("vat", 10000).is_ok());
        assert!(validate_rate_bps("discount", 10001).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
