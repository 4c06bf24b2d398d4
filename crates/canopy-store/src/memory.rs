//! In-memory storage implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use canopy_core::{
    AdminUser, AdminUserId, LoyaltyAccount, LoyaltyTransaction, TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::{settle, Store};

#[derive(Default)]
struct State {
    accounts: HashMap<UserId, LoyaltyAccount>,
    transactions: HashMap<TransactionId, LoyaltyTransaction>,
    // Insertion (and therefore time) ordered.
    by_user: HashMap<UserId, Vec<TransactionId>>,
    events: HashSet<String>,
    admins: HashMap<AdminUserId, AdminUser>,
}

/// Process-local store. Contents are lost on restart.
///
/// A single mutex serializes every operation, which makes the compound
/// [`Store::apply_transaction`] atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

impl Store for MemoryStore {
    fn get_account(&self, user_id: &UserId) -> Result<Option<LoyaltyAccount>> {
        Ok(self.lock()?.accounts.get(user_id).cloned())
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<LoyaltyTransaction>> {
        Ok(self.lock()?.transactions.get(transaction_id).cloned())
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LoyaltyTransaction>> {
        let state = self.lock()?;
        let Some(ids) = state.by_user.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|id| state.transactions.get(id).cloned())
            .collect())
    }

    fn has_event(&self, event_id: &str) -> Result<bool> {
        Ok(self.lock()?.events.contains(event_id))
    }

    fn apply_transaction(
        &self,
        transaction: &LoyaltyTransaction,
        event_id: Option<&str>,
    ) -> Result<LoyaltyTransaction> {
        let mut state = self.lock()?;

        if let Some(event_id) = event_id {
            if state.events.contains(event_id) {
                return Err(StoreError::DuplicateEvent {
                    event_id: event_id.to_string(),
                });
            }
        }

        let mut account = state
            .accounts
            .get(&transaction.user_id)
            .cloned()
            .unwrap_or_else(|| LoyaltyAccount::new(transaction.user_id));
        let stored = settle(&mut account, transaction)?;

        state.accounts.insert(account.user_id, account);
        state.transactions.insert(stored.id, stored.clone());
        state
            .by_user
            .entry(stored.user_id)
            .or_default()
            .push(stored.id);
        if let Some(event_id) = event_id {
            state.events.insert(event_id.to_string());
        }

        Ok(stored)
    }

    fn put_admin_user(&self, user: &AdminUser) -> Result<()> {
        self.lock()?.admins.insert(user.id, user.clone());
        Ok(())
    }

    fn update_admin_user(&self, user: &AdminUser) -> Result<()> {
        let mut state = self.lock()?;
        let Some(slot) = state.admins.get_mut(&user.id) else {
            return Err(StoreError::NotFound {
                entity: "admin user",
                id: user.id.to_string(),
            });
        };
        *slot = user.clone();
        Ok(())
    }

    fn get_admin_user(&self, admin_id: &AdminUserId) -> Result<Option<AdminUser>> {
        Ok(self.lock()?.admins.get(admin_id).cloned())
    }

    fn list_admin_users(&self) -> Result<Vec<AdminUser>> {
        let mut users: Vec<AdminUser> = self.lock()?.admins.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    fn delete_admin_user(&self, admin_id: &AdminUserId) -> Result<()> {
        self.lock()?
            .admins
            .remove(admin_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                entity: "admin user",
                id: admin_id.to_string(),
            })
    }
}
