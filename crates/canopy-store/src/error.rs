//! Error types for Canopy storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Requested key.
        id: String,
    },

    /// A debit would take the balance below zero.
    #[error("insufficient points: balance={balance}, required={required}")]
    InsufficientPoints {
        /// Current balance.
        balance: i64,
        /// Points the debit needs.
        required: i64,
    },

    /// The change does not fit in the balance counters.
    #[error("balance overflow: balance={balance}, delta={delta}")]
    BalanceOverflow {
        /// Current balance.
        balance: i64,
        /// Requested change.
        delta: i64,
    },

    /// The accrual event was already applied.
    #[error("duplicate event: {event_id}")]
    DuplicateEvent {
        /// The event ID that was duplicated.
        event_id: String,
    },
}
