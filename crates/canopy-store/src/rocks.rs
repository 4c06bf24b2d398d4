//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use canopy_core::{
    AdminUser, AdminUserId, LoyaltyAccount, LoyaltyTransaction, TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{settle, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    // Serializes read-modify-write sequences; plain reads skip it.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_value<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let value = Self::serialize(value)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Accounts
    // =========================================================================

    fn get_account(&self, user_id: &UserId) -> Result<Option<LoyaltyAccount>> {
        self.get_value(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<LoyaltyTransaction>> {
        self.get_value(cf::TRANSACTIONS, &keys::transaction_key(transaction_id))
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LoyaltyTransaction>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        // ULIDs sort by time, so the prefix scan is oldest first.
        let mut ids = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            ids.push(keys::transaction_id_from_user_key(&key)?);
        }

        let mut transactions = Vec::new();
        for id in ids.iter().rev().skip(offset).take(limit) {
            if let Some(tx) = self.get_transaction(id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    fn has_event(&self, event_id: &str) -> Result<bool> {
        let cf = self.cf(cf::ACCRUAL_EVENTS)?;
        Ok(self
            .db
            .get_cf(&cf, keys::accrual_event_key(event_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some())
    }

    fn apply_transaction(
        &self,
        transaction: &LoyaltyTransaction,
        event_id: Option<&str>,
    ) -> Result<LoyaltyTransaction> {
        let _guard = self.lock()?;

        if let Some(event_id) = event_id {
            if self.has_event(event_id)? {
                return Err(StoreError::DuplicateEvent {
                    event_id: event_id.to_string(),
                });
            }
        }

        let mut account = self
            .get_account(&transaction.user_id)?
            .unwrap_or_else(|| LoyaltyAccount::new(transaction.user_id));
        let stored = settle(&mut account, transaction)?;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.user_id),
            Self::serialize(&account)?,
        );
        batch.put_cf(&cf_tx, keys::transaction_key(&stored.id), Self::serialize(&stored)?);
        batch.put_cf(
            &cf_tx_by_user,
            keys::user_transaction_key(&stored.user_id, &stored.id),
            [],
        );
        if let Some(event_id) = event_id {
            let cf_events = self.cf(cf::ACCRUAL_EVENTS)?;
            batch.put_cf(
                &cf_events,
                keys::accrual_event_key(event_id),
                stored.id.to_bytes(),
            );
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(stored)
    }

    // =========================================================================
    // Admin users
    // =========================================================================

    fn put_admin_user(&self, user: &AdminUser) -> Result<()> {
        self.put_value(cf::ADMIN_USERS, &keys::admin_user_key(&user.id), user)
    }

    fn update_admin_user(&self, user: &AdminUser) -> Result<()> {
        let _guard = self.lock()?;
        if self.get_admin_user(&user.id)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "admin user",
                id: user.id.to_string(),
            });
        }
        self.put_value(cf::ADMIN_USERS, &keys::admin_user_key(&user.id), user)
    }

    fn get_admin_user(&self, admin_id: &AdminUserId) -> Result<Option<AdminUser>> {
        self.get_value(cf::ADMIN_USERS, &keys::admin_user_key(admin_id))
    }

    fn list_admin_users(&self) -> Result<Vec<AdminUser>> {
        let cf = self.cf(cf::ADMIN_USERS)?;
        let mut users = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            users.push(Self::deserialize::<AdminUser>(&value)?);
        }
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    fn delete_admin_user(&self, admin_id: &AdminUserId) -> Result<()> {
        let _guard = self.lock()?;
        if self.get_admin_user(admin_id)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "admin user",
                id: admin_id.to_string(),
            });
        }

        let cf = self.cf(cf::ADMIN_USERS)?;
        self.db
            .delete_cf(&cf, keys::admin_user_key(admin_id))
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{AdminRole, TenantScope};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn accrual(user_id: UserId, points: i64, description: &str) -> LoyaltyTransaction {
        LoyaltyTransaction::accrual(
            user_id,
            points,
            TenantScope::organization("org-1"),
            description.into(),
            serde_json::json!({ "orderId": "o-1" }),
        )
    }

    #[test]
    fn apply_and_list_newest_first() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        store
            .apply_transaction(&accrual(user_id, 100, "first"), Some("evt-1"))
            .unwrap();
        // Distinct ULID timestamps keep the index order deterministic.
        std::thread::sleep(std::time::Duration::from_millis(2));
        store
            .apply_transaction(&accrual(user_id, 40, "second"), Some("evt-2"))
            .unwrap();

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.points, 140);
        assert_eq!(account.lifetime_earned, 140);

        let rows = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description, "second");
        assert_eq!(rows[0].balance_after, 140);
        assert_eq!(rows[1].description, "first");
        assert_eq!(rows[1].scope, TenantScope::organization("org-1"));

        let page2 = store.list_transactions_by_user(&user_id, 1, 1).unwrap();
        assert_eq!(page2[0].description, "first");
    }

    #[test]
    fn duplicate_event_is_rejected() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        store
            .apply_transaction(&accrual(user_id, 10, "a"), Some("evt-x"))
            .unwrap();
        let result = store.apply_transaction(&accrual(user_id, 10, "b"), Some("evt-x"));

        assert!(matches!(result, Err(StoreError::DuplicateEvent { .. })));
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().points, 10);
    }

    #[test]
    fn insufficient_points() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store
            .apply_transaction(&accrual(user_id, 5, "a"), None)
            .unwrap();

        let redeem =
            LoyaltyTransaction::redemption(user_id, 100, TenantScope::default(), "r1", "Mug");
        let result = store.apply_transaction(&redeem, None);

        assert!(matches!(
            result,
            Err(StoreError::InsufficientPoints {
                balance: 5,
                required: 100
            })
        ));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let user_id = UserId::generate();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store
                .apply_transaction(&accrual(user_id, 25, "a"), Some("evt-r"))
                .unwrap();
            store
                .put_admin_user(&AdminUser::bootstrap_owner("owner@shop.example"))
                .unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().points, 25);
        assert!(store.has_event("evt-r").unwrap());
        let admins = store.list_admin_users().unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].role, AdminRole::Owner);
    }

    #[test]
    fn delete_missing_admin_is_not_found() {
        let (store, _dir) = create_test_store();
        assert!(matches!(
            store.delete_admin_user(&AdminUserId::generate()),
            Err(StoreError::NotFound { .. })
        ));
    }
}
