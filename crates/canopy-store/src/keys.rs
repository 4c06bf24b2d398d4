//! Key encoding for the `RocksDB` backend.

use canopy_core::{AdminUserId, TransactionId, UserId};

use crate::error::{Result, StoreError};

/// Account key: the 16 user id bytes.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Ledger row key: the 16 ULID bytes.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// User index key: `user_id (16 bytes) || transaction_id (16 bytes)`.
///
/// ULIDs are time-ordered, so a prefix scan yields a user's rows oldest first.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Prefix covering every index key of one user.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Recover the transaction id from a user index key.
///
/// # Errors
///
/// Returns `StoreError::Database` if the key is not 32 bytes long.
pub fn transaction_id_from_user_key(key: &[u8]) -> Result<TransactionId> {
    let tail: [u8; 16] = key
        .get(16..32)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| StoreError::Database(format!("malformed index key ({} bytes)", key.len())))?;
    Ok(TransactionId::from_bytes(tail))
}

/// Accrual event key.
#[must_use]
pub fn accrual_event_key(event_id: &str) -> Vec<u8> {
    event_id.as_bytes().to_vec()
}

/// Admin user key.
#[must_use]
pub fn admin_user_key(admin_id: &AdminUserId) -> Vec<u8> {
    admin_id.as_bytes().to_vec()
}
