//! Column families used by the `RocksDB` backend.

/// Column family names.
pub mod cf {
    /// Loyalty accounts, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger rows, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: ledger rows by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Applied accrual event ids (idempotency), value is the transaction id.
    pub const ACCRUAL_EVENTS: &str = "accrual_events";

    /// Admin console users, keyed by admin id.
    pub const ADMIN_USERS: &str = "admin_users";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::ACCRUAL_EVENTS,
        cf::ADMIN_USERS,
    ]
}
