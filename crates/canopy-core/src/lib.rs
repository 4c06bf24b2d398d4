//! Core types and pure logic for Canopy.
//!
//! This crate provides the domain model shared by storage and the HTTP
//! service:
//!
//! - **Identifiers**: `UserId`, `AdminUserId`, `TransactionId`
//! - **Loyalty**: `LoyaltyAccount`, `LoyaltyConfig` (tiers, rules, rewards),
//!   `LoyaltyTransaction`, and the accrual/redemption engine
//! - **Personalization**: condition/action rules that rank content candidates
//! - **Compliance**: legal-document coverage scoring and snapshots
//! - **Admin**: console users and roles
//!
//! Points are whole numbers (`i64`). Accruals are computed in `f64` and
//! floored once, after the tier multiplier is applied.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod admin;
pub mod compliance;
pub mod engine;
pub mod error;
pub mod ids;
pub mod personalization;
pub mod program;
pub mod scope;
pub mod transaction;

pub use account::{BalanceOverflow, LoyaltyAccount};
pub use admin::{normalize_email, AdminRole, AdminStatus, AdminUser};
pub use compliance::{
    build_snapshots, entity_snapshot, store_coverage, Brand, ComplianceInputs,
    ComplianceSnapshot, LegalDocument, Organization, Requirements, RetailStore, SnapshotScope,
    StoreCoverage,
};
pub use engine::{
    authorize_redemption, calculate_accrual, next_tier, resolve_tier, rule_contribution,
    Accrual, LoyaltyEvent, RuleContribution,
};
pub use error::{LoyaltyError, Result};
pub use ids::{AdminUserId, IdError, TransactionId, UserId};
pub use personalization::{
    evaluate_personalization, Candidate, Condition, ConditionOp, PersonalizationRule,
    RuleAction, ScoredCandidate, Target,
};
pub use program::{LoyaltyConfig, LoyaltyReward, LoyaltyRule, LoyaltyTier, RuleKind};
pub use scope::TenantScope;
pub use transaction::{LoyaltyTransaction, TransactionKind};
