//! Storage layer for Canopy.
//!
//! This crate persists loyalty accounts, the points ledger, applied accrual
//! event ids and admin console users behind the [`Store`] trait.
//!
//! Two backends are provided:
//!
//! - [`MemoryStore`]: process-local maps, the default and what the tests use
//! - `RocksStore` (feature `rocksdb-backend`): `RocksDB` with column families
//!   for accounts, transactions, a per-user transaction index, accrual events
//!   and admin users; values are CBOR-encoded
//!
//! # Example
//!
//! ```
//! use canopy_core::{LoyaltyTransaction, TenantScope, UserId};
//! use canopy_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//! let tx = LoyaltyTransaction::accrual(
//!     user_id,
//!     120,
//!     TenantScope::default(),
//!     "Order points".into(),
//!     serde_json::Value::Null,
//! );
//!
//! let applied = store.apply_transaction(&tx, Some("order-1")).unwrap();
//! assert_eq!(applied.balance_after, 120);
//! assert_eq!(store.get_account(&user_id).unwrap().unwrap().points, 120);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use canopy_core::{
    AdminUser, AdminUserId, LoyaltyAccount, LoyaltyTransaction, TransactionId, TransactionKind,
    UserId,
};

/// The storage trait defining all persistence operations.
pub trait Store: Send + Sync {
    // =========================================================================
    // Accounts
    // =========================================================================

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<LoyaltyAccount>>;

    // =========================================================================
    // Ledger
    // =========================================================================

    /// Get a ledger row by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<LoyaltyTransaction>>;

    /// List a user's ledger rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LoyaltyTransaction>>;

    /// Whether an accrual event id has already been applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn has_event(&self, event_id: &str) -> Result<bool>;

    /// Apply a ledger row to its account atomically.
    ///
    /// Creates the account if it does not exist, updates the balance, writes
    /// the row (with `balance_after` filled in) and, when `event_id` is given,
    /// records it so the same event cannot be applied twice.
    ///
    /// Returns the row as stored.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicateEvent` if `event_id` was already applied.
    /// - `StoreError::InsufficientPoints` if a debit exceeds the balance.
    fn apply_transaction(
        &self,
        transaction: &LoyaltyTransaction,
        event_id: Option<&str>,
    ) -> Result<LoyaltyTransaction>;

    // =========================================================================
    // Admin users
    // =========================================================================

    /// Insert or replace an admin user.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn put_admin_user(&self, user: &AdminUser) -> Result<()>;

    /// Replace an admin user that still exists.
    ///
    /// Checked and written under the same lock as deletes, so a revoked user
    /// is never written back.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user was deleted.
    fn update_admin_user(&self, user: &AdminUser) -> Result<()>;

    /// Get an admin user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn get_admin_user(&self, admin_id: &AdminUserId) -> Result<Option<AdminUser>>;

    /// Find an admin user by (normalized) email.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn find_admin_user_by_email(&self, email: &str) -> Result<Option<AdminUser>> {
        Ok(self
            .list_admin_users()?
            .into_iter()
            .find(|u| u.email == email))
    }

    /// List all admin users, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn list_admin_users(&self) -> Result<Vec<AdminUser>>;

    /// Delete an admin user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    fn delete_admin_user(&self, admin_id: &AdminUserId) -> Result<()>;
}

/// Apply `transaction` to `account` in place and return the row to persist.
///
/// Shared by the backends so both enforce the same balance rules.
pub(crate) fn settle(
    account: &mut LoyaltyAccount,
    transaction: &LoyaltyTransaction,
) -> Result<LoyaltyTransaction> {
    let delta = transaction.points;

    if delta < 0 {
        // i64::MIN has no positive counterpart and no balance covers it.
        let required = delta.checked_neg();
        if !required.is_some_and(|r| account.can_afford(r)) {
            return Err(StoreError::InsufficientPoints {
                balance: account.points,
                required: delta.saturating_neg(),
            });
        }
    }

    let applied = match (transaction.kind, delta >= 0) {
        (TransactionKind::Redemption, _) => account.debit(delta.saturating_neg()),
        (_, true) => account.credit(delta),
        (_, false) => account.correct(delta),
    };
    applied.map_err(|e| StoreError::BalanceOverflow {
        balance: e.balance,
        delta: e.delta,
    })?;

    let mut stored = transaction.clone();
    stored.balance_after = account.points;
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::TenantScope;

    #[test]
    fn settle_rejects_overdraw_without_touching_account() {
        let user_id = UserId::generate();
        let mut account = LoyaltyAccount::new(user_id);
        account.credit(100).unwrap();
        let before = account.clone();

        let tx = LoyaltyTransaction::redemption(user_id, 150, TenantScope::default(), "r", "R");
        let err = settle(&mut account, &tx).unwrap_err();

        assert!(matches!(
            err,
            StoreError::InsufficientPoints {
                balance: 100,
                required: 150
            }
        ));
        assert_eq!(account, before);
    }

    #[test]
    fn negative_adjustment_does_not_count_as_redeemed() {
        let user_id = UserId::generate();
        let mut account = LoyaltyAccount::new(user_id);
        account.credit(100).unwrap();

        let tx = LoyaltyTransaction::adjustment(user_id, -30, "fix".into(), "admin");
        let stored = settle(&mut account, &tx).unwrap();

        assert_eq!(stored.balance_after, 70);
        assert_eq!(account.lifetime_redeemed, 0);
    }

    #[test]
    fn settle_refuses_minimum_i64_debit() {
        let user_id = UserId::generate();
        let mut account = LoyaltyAccount::new(user_id);
        account.credit(100).unwrap();
        let before = account.clone();

        let tx = LoyaltyTransaction::adjustment(user_id, i64::MIN, "wipe".into(), "admin");
        let err = settle(&mut account, &tx).unwrap_err();

        assert!(matches!(
            err,
            StoreError::InsufficientPoints {
                balance: 100,
                required: i64::MAX
            }
        ));
        assert_eq!(account, before);
    }

    #[test]
    fn settle_refuses_credit_past_maximum() {
        let user_id = UserId::generate();
        let mut account = LoyaltyAccount::new(user_id);
        account.credit(i64::MAX).unwrap();
        let before = account.clone();

        let tx = LoyaltyTransaction::adjustment(user_id, 1, "bonus".into(), "admin");
        let err = settle(&mut account, &tx).unwrap_err();

        assert!(matches!(err, StoreError::BalanceOverflow { delta: 1, .. }));
        assert_eq!(account, before);
    }
}
