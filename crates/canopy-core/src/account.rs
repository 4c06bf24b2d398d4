//! Loyalty accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A shopper's point balance.
///
/// Accounts are created lazily the first time a user earns points or asks for
/// their status; `points` never drops below zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyAccount {
    /// The owning shopper.
    pub user_id: UserId,

    /// Spendable balance.
    pub points: i64,

    /// Total points ever credited (accruals and positive adjustments).
    pub lifetime_earned: i64,

    /// Total points ever spent on rewards.
    pub lifetime_redeemed: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the balance last changed.
    pub updated_at: DateTime<Utc>,
}

impl LoyaltyAccount {
    /// Create an empty account.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            points: 0,
            lifetime_earned: 0,
            lifetime_redeemed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the balance covers a debit of `points`.
    #[must_use]
    pub fn can_afford(&self, points: i64) -> bool {
        self.points >= points
    }

    /// Credit earned points.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceOverflow`] if the balance or lifetime total would not
    /// fit in an `i64`; the account is left unchanged.
    pub fn credit(&mut self, points: i64) -> Result<(), BalanceOverflow> {
        let overflow = || BalanceOverflow {
            balance: self.points,
            delta: points,
        };
        let balance = self.points.checked_add(points).ok_or_else(overflow)?;
        let earned = self.lifetime_earned.checked_add(points).ok_or_else(overflow)?;
        self.points = balance;
        self.lifetime_earned = earned;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Debit redeemed points. Callers check [`Self::can_afford`] first.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceOverflow`] if the arithmetic would overflow; the
    /// account is left unchanged.
    pub fn debit(&mut self, points: i64) -> Result<(), BalanceOverflow> {
        let overflow = || BalanceOverflow {
            balance: self.points,
            delta: points.saturating_neg(),
        };
        let balance = self.points.checked_sub(points).ok_or_else(overflow)?;
        let redeemed = self.lifetime_redeemed.checked_add(points).ok_or_else(overflow)?;
        self.points = balance;
        self.lifetime_redeemed = redeemed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Apply a signed correction without touching the lifetime totals.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceOverflow`] if the balance would not fit in an `i64`.
    pub fn correct(&mut self, delta: i64) -> Result<(), BalanceOverflow> {
        self.points = self.points.checked_add(delta).ok_or(BalanceOverflow {
            balance: self.points,
            delta,
        })?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A balance change that does not fit in the point counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("balance overflow: balance={balance}, delta={delta}")]
pub struct BalanceOverflow {
    /// Balance before the change.
    pub balance: i64,
    /// Requested change.
    pub delta: i64,
}
