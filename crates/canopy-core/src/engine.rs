//! Points calculation: tier resolution, accrual and redemption checks.
//!
//! Everything here is pure; persistence and caching live in the service.

use serde::{Deserialize, Serialize};

use crate::error::{LoyaltyError, Result};
use crate::program::{LoyaltyConfig, LoyaltyReward, LoyaltyRule, LoyaltyTier, RuleKind};

/// A shopper action that may earn points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoyaltyEvent {
    /// A completed order.
    Order {
        /// Order total in cents.
        #[serde(rename = "orderTotalCents")]
        order_total_cents: i64,
        /// One entry per purchased unit.
        #[serde(rename = "productIds", default)]
        product_ids: Vec<String>,
    },

    /// A completed quiz.
    Quiz {
        /// The quiz document id.
        #[serde(rename = "quizId")]
        quiz_id: String,
    },
}

impl LoyaltyEvent {
    /// Short label for ledger descriptions.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Order {
                order_total_cents, ..
            } => format!("Order points (${}.{:02})", order_total_cents / 100, order_total_cents % 100),
            Self::Quiz { quiz_id } => format!("Quiz completion {quiz_id}"),
        }
    }
}

/// One rule's share of an accrual, before the tier multiplier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleContribution {
    /// Rule document id.
    pub rule_id: String,
    /// Rule display name.
    pub rule_name: String,
    /// Raw (unmultiplied, unrounded) points.
    pub raw_points: f64,
}

/// Result of evaluating a program against one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accrual {
    /// Per-rule breakdown.
    pub contributions: Vec<RuleContribution>,
    /// Sum of raw contributions.
    pub raw_total: f64,
    /// Multiplier of the tier held when the event happened.
    pub multiplier: f64,
    /// Tier held when the event happened.
    pub tier_id: Option<String>,
    /// `floor(raw_total * multiplier)`, never negative.
    pub points: i64,
}

/// Highest tier whose threshold the balance meets.
#[must_use]
pub fn resolve_tier(tiers: &[LoyaltyTier], points: i64) -> Option<&LoyaltyTier> {
    tiers
        .iter()
        .filter(|t| t.min_points <= points)
        .fold(None, |best: Option<&LoyaltyTier>, t| match best {
            Some(b) if b.min_points >= t.min_points => Some(b),
            _ => Some(t),
        })
}

/// Lowest tier the balance has not reached yet.
#[must_use]
pub fn next_tier(tiers: &[LoyaltyTier], points: i64) -> Option<&LoyaltyTier> {
    tiers
        .iter()
        .filter(|t| t.min_points > points)
        .min_by_key(|t| t.min_points)
}

/// Raw points a rule yields for an event, or `None` when it does not apply.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rule_contribution(rule: &LoyaltyRule, event: &LoyaltyEvent) -> Option<f64> {
    if !rule.active {
        return None;
    }

    match (&rule.kind, event) {
        (
            RuleKind::Dollar { points_per_dollar },
            LoyaltyEvent::Order {
                order_total_cents, ..
            },
        ) => Some(*order_total_cents as f64 / 100.0 * points_per_dollar),
        (
            RuleKind::Product {
                product_ids: eligible,
                points,
            },
            LoyaltyEvent::Order { product_ids, .. },
        ) => {
            let units = product_ids.iter().filter(|p| eligible.contains(p)).count();
            (units > 0).then(|| units as f64 * *points as f64)
        }
        (
            RuleKind::Order {
                points,
                min_order_total_cents,
            },
            LoyaltyEvent::Order {
                order_total_cents, ..
            },
        ) => min_order_total_cents
            .map_or(true, |min| *order_total_cents >= min)
            .then_some(*points as f64),
        (RuleKind::Quiz { quiz_id, points }, LoyaltyEvent::Quiz { quiz_id: completed }) => quiz_id
            .as_ref()
            .map_or(true, |q| q == completed)
            .then_some(*points as f64),
        _ => None,
    }
}

/// Evaluate every matching rule and apply the multiplier of the tier the
/// current balance resolves to.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn calculate_accrual(config: &LoyaltyConfig, balance: i64, event: &LoyaltyEvent) -> Accrual {
    let contributions: Vec<RuleContribution> = config
        .rules
        .iter()
        .filter_map(|rule| {
            rule_contribution(rule, event).map(|raw_points| RuleContribution {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                raw_points,
            })
        })
        .collect();

    let raw_total: f64 = contributions.iter().map(|c| c.raw_points).sum();
    let tier = resolve_tier(&config.tiers, balance);
    let multiplier = tier.map_or(1.0, |t| t.multiplier);
    let points = (raw_total * multiplier).floor().max(0.0) as i64;

    Accrual {
        contributions,
        raw_total,
        multiplier,
        tier_id: tier.map(|t| t.id.clone()),
        points,
    }
}

/// Check whether a reward may be redeemed from a balance.
///
/// Checks run in order: reward exists, terms version, tier gate, balance.
///
/// # Errors
///
/// Returns the first [`LoyaltyError`] the request trips.
pub fn authorize_redemption<'a>(
    config: &'a LoyaltyConfig,
    balance: i64,
    reward_id: &str,
    accepted_terms_version: Option<&str>,
) -> Result<&'a LoyaltyReward> {
    let reward = config
        .active_reward(reward_id)
        .ok_or_else(|| LoyaltyError::RewardNotFound {
            reward_id: reward_id.to_string(),
        })?;

    if let Some(expected) = &config.terms_version {
        if accepted_terms_version != Some(expected.as_str()) {
            return Err(LoyaltyError::LegalVersionMismatch {
                expected: expected.clone(),
                provided: accepted_terms_version.map(String::from),
            });
        }
    }

    if let Some(required_id) = &reward.min_tier_id {
        let current = resolve_tier(&config.tiers, balance);
        let eligible = match (config.tier(required_id), current) {
            (Some(required), Some(current)) => current.min_points >= required.min_points,
            _ => false,
        };
        if !eligible {
            return Err(LoyaltyError::TierNotEligible {
                required_tier: required_id.clone(),
                current_tier: current.map(|t| t.id.clone()),
            });
        }
    }

    if balance < reward.cost_points {
        return Err(LoyaltyError::InsufficientPoints {
            balance,
            required: reward.cost_points,
        });
    }

    Ok(reward)
}
