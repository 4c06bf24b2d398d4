//! The append-only points ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TenantScope, TransactionId, UserId};

/// One balance change, written once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyTransaction {
    /// Time-ordered id.
    pub id: TransactionId,

    /// Whose balance changed.
    pub user_id: UserId,

    /// Signed change: positive for credits, negative for debits.
    pub points: i64,

    /// Why the balance changed.
    pub kind: TransactionKind,

    /// Balance immediately after this row was applied.
    pub balance_after: i64,

    /// Tenant scope the change was made in.
    pub scope: TenantScope,

    /// Human-readable summary.
    pub description: String,

    /// Structured context (rule contributions, reward id, admin id, ...).
    pub metadata: serde_json::Value,

    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl LoyaltyTransaction {
    fn build(
        user_id: UserId,
        points: i64,
        kind: TransactionKind,
        scope: TenantScope,
        description: String,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            points,
            kind,
            // Filled in by the store once the new balance is known.
            balance_after: 0,
            scope,
            description,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Points earned from an order or quiz.
    #[must_use]
    pub fn accrual(
        user_id: UserId,
        points: i64,
        scope: TenantScope,
        description: String,
        metadata: serde_json::Value,
    ) -> Self {
        Self::build(
            user_id,
            points.abs(),
            TransactionKind::Accrual,
            scope,
            description,
            metadata,
        )
    }

    /// Points spent on a reward. Always stored negative.
    #[must_use]
    pub fn redemption(
        user_id: UserId,
        cost_points: i64,
        scope: TenantScope,
        reward_id: &str,
        reward_name: &str,
    ) -> Self {
        Self::build(
            user_id,
            -cost_points.abs(),
            TransactionKind::Redemption,
            scope,
            format!("Redeemed {reward_name}"),
            serde_json::json!({ "rewardId": reward_id }),
        )
    }

    /// Manual correction by an admin; may be either sign.
    #[must_use]
    pub fn adjustment(user_id: UserId, points: i64, reason: String, admin_id: &str) -> Self {
        Self::build(
            user_id,
            points,
            TransactionKind::Adjustment,
            TenantScope::default(),
            reason,
            serde_json::json!({ "adminId": admin_id }),
        )
    }
}

/// Ledger row kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Rule-based earning.
    Accrual,

    /// Reward redemption.
    Redemption,

    /// Admin correction.
    Adjustment,
}

impl TransactionKind {
    /// Lowercase label used in API responses.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accrual => "accrual",
            Self::Redemption => "redemption",
            Self::Adjustment => "adjustment",
        }
    }
}
