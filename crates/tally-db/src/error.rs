//! # Database Error Types
//!
//! Error types for store operations and the ledger workflows built on them.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Categorized; SQLITE_BUSY* and failed version  │
//! │       │                   checks become DbError::Conflict               │
//! │       ▼                                                                 │
//! │  LedgerError ← What every workflow returns                             │
//! │       │        Core(CoreError)  rule violation, ask for new input      │
//! │       │        StoreConflict    retry budget spent, try again later    │
//! │       ▼                                                                 │
//! │  Caller reads .code() and .is_retryable()                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tally_core::CoreError;
use thiserror::Error;

// =============================================================================
// DbError
// =============================================================================

/// SQLite result codes (primary and extended) that mean "another writer got
/// there first".
const CONFLICT_CODES: &[&str] = &["5", "6", "261", "262", "517", "773"];

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a duplicate barcode
    /// - Duplicate invoice number
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Product referencing a bill that does not exist
    /// - Sale item referencing a missing sale
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (e.g. a negative quantity reached the row).
    #[error("Check constraint violation: {message}")]
    CheckViolation { message: String },

    /// Optimistic concurrency conflict.
    ///
    /// ## When This Occurs
    /// - A versioned UPDATE matched zero rows (someone else wrote first)
    /// - SQLite reported BUSY/LOCKED while upgrading to a write transaction
    ///
    /// Always safe to retry the whole transaction body.
    #[error("Write conflict on {entity}")]
    Conflict { entity: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored data could not be decoded (e.g. malformed JSON column).
    #[error("Corrupt {entity} record: {message}")]
    Corrupt { entity: String, message: String },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a Conflict error.
    pub fn conflict(entity: impl Into<String>) -> Self {
        DbError::Conflict {
            entity: entity.into(),
        }
    }

    /// Creates a Corrupt error.
    pub fn corrupt(entity: impl Into<String>, message: impl ToString) -> Self {
        DbError::Corrupt {
            entity: entity.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if the error is an optimistic concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict { .. })
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound          → DbError::NotFound
/// sqlx::Error::Database (BUSY/LOCK) → DbError::Conflict
/// sqlx::Error::Database (other)     → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut         → DbError::PoolExhausted
/// Other                             → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let busy = db_err
                    .code()
                    .is_some_and(|code| CONFLICT_CODES.contains(&&*code));

                if busy || msg.contains("database is locked") || msg.contains("table is locked") {
                    DbError::Conflict {
                        entity: "database".to_string(),
                    }
                } else if msg.contains("UNIQUE constraint failed") {
                    // "UNIQUE constraint failed: <table>.<column>"
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// ConfigError
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    #[error("Failed to save config: {0}")]
    SaveFailed(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// LedgerError
// =============================================================================

/// The error every ledger workflow returns.
///
/// ## Taxonomy
/// | Variant                 | Caller action              |
/// |-------------------------|----------------------------|
/// | `Core(..)`              | Fix input / show reason    |
/// | `StoreConflict`         | Retry later                |
/// | `PartialWriteForbidden` | Nothing was written; retry |
/// | `Db(..)`                | Infrastructure failure     |
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A ledger rule rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Conflicts kept aborting the transaction until the retry budget ran out.
    #[error("Store conflict persisted after {attempts} attempt(s)")]
    StoreConflict { attempts: u32 },

    /// A bulk write touched a different number of rows than were staged.
    /// The transaction is rolled back.
    #[error("Partial write forbidden: expected {expected} row(s), wrote {written}")]
    PartialWriteForbidden { expected: u64, written: u64 },
}

impl LedgerError {
    /// Stable, machine-readable reason code.
    ///
    /// ## Example
    /// ```rust
    /// use tally_db::LedgerError;
    ///
    /// let err = LedgerError::StoreConflict { attempts: 5 };
    /// assert_eq!(err.code(), "STORE_CONFLICT");
    /// assert!(err.is_retryable());
    /// ```
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Core(err) => err.code(),
            LedgerError::Db(DbError::Conflict { .. }) | LedgerError::StoreConflict { .. } => {
                "STORE_CONFLICT"
            }
            LedgerError::Db(DbError::NotFound { .. }) => "NOT_FOUND",
            LedgerError::Db(DbError::UniqueViolation { .. }) => "DUPLICATE",
            LedgerError::Db(_) => "DATABASE_ERROR",
            LedgerError::PartialWriteForbidden { .. } => "PARTIAL_WRITE_FORBIDDEN",
        }
    }

    /// True only for store conflicts; everything else needs new input or a
    /// human.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::StoreConflict { .. } | LedgerError::Db(DbError::Conflict { .. })
        )
    }

    /// Shorthand used inside transaction bodies.
    pub(crate) fn conflict(entity: impl Into<String>) -> Self {
        LedgerError::Db(DbError::conflict(entity))
    }

    /// Returns the domain error, if any.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            LedgerError::Core(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Db(err.into())
    }
}

impl From<tally_core::ValidationError> for LedgerError {
    fn from(err: tally_core::ValidationError) -> Self {
        LedgerError::Core(err.into())
    }
}

/// Result type for ledger workflows.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let err: LedgerError = CoreError::EmptyCart.into();
        assert_eq!(err.code(), "EMPTY_CART");
        assert!(!err.is_retryable());

        let err = LedgerError::conflict("products");
        assert_eq!(err.code(), "STORE_CONFLICT");
        assert!(err.is_retryable());

        let err = LedgerError::PartialWriteForbidden {
            expected: 3,
            written: 2,
        };
        assert_eq!(err.code(), "PARTIAL_WRITE_FORBIDDEN");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_validation_converts_through_core() {
        let err: LedgerError = tally_core::ValidationError::Required {
            field: "barcode".into(),
        }
        .into();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.as_core().is_some());
    }
}
