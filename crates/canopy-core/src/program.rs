//! Loyalty program configuration: tiers, earning rules and rewards.
//!
//! These are authored in the CMS per tenant scope and deserialized straight
//! from the CMS JSON (camelCase field names).

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_multiplier() -> f64 {
    1.0
}

/// Everything the engine needs to evaluate one tenant scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyConfig {
    /// Tiers in any order; resolution sorts by `min_points`.
    #[serde(default)]
    pub tiers: Vec<LoyaltyTier>,

    /// Earning rules.
    #[serde(default)]
    pub rules: Vec<LoyaltyRule>,

    /// Redeemable rewards.
    #[serde(default)]
    pub rewards: Vec<LoyaltyReward>,

    /// Program terms version a redeemer must have accepted, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_version: Option<String>,
}

impl LoyaltyConfig {
    /// Look up an active reward by id.
    #[must_use]
    pub fn active_reward(&self, reward_id: &str) -> Option<&LoyaltyReward> {
        self.rewards
            .iter()
            .find(|r| r.active && r.id == reward_id)
    }

    /// Look up a tier by id.
    #[must_use]
    pub fn tier(&self, tier_id: &str) -> Option<&LoyaltyTier> {
        self.tiers.iter().find(|t| t.id == tier_id)
    }
}

/// A loyalty level unlocked by accumulated points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyTier {
    /// CMS document id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Balance needed to hold this tier.
    pub min_points: i64,

    /// Multiplier applied to raw rule contributions.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Free-form perk descriptions shown to shoppers.
    #[serde(default)]
    pub perks: Vec<String>,
}

/// A configuration-driven formula turning an event into raw points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyRule {
    /// CMS document id.
    pub id: String,

    /// Display name, recorded in ledger metadata.
    #[serde(default)]
    pub name: String,

    /// Inactive rules are ignored.
    #[serde(default = "default_true")]
    pub active: bool,

    /// The formula.
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// Earning formula variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// Points per whole-or-fractional dollar of order total.
    Dollar {
        /// Points granted per dollar spent.
        #[serde(rename = "pointsPerDollar")]
        points_per_dollar: f64,
    },

    /// Points for each purchased unit of a listed product.
    Product {
        /// Qualifying product ids.
        #[serde(rename = "productIds")]
        product_ids: Vec<String>,
        /// Points per qualifying unit.
        points: i64,
    },

    /// Flat points per order.
    Order {
        /// Points per qualifying order.
        points: i64,
        /// Order total (cents) below which the rule does not apply.
        #[serde(
            rename = "minOrderTotalCents",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        min_order_total_cents: Option<i64>,
    },

    /// Flat points for completing a quiz.
    Quiz {
        /// Restrict to one quiz; `None` matches any quiz.
        #[serde(rename = "quizId", default, skip_serializing_if = "Option::is_none")]
        quiz_id: Option<String>,
        /// Points per completion.
        points: i64,
    },
}

/// An item redeemable for a fixed point cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyReward {
    /// CMS document id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Points debited on redemption.
    pub cost_points: i64,

    /// Tier the shopper must hold (or exceed) to redeem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_tier_id: Option<String>,

    /// Inactive rewards cannot be redeemed.
    #[serde(default = "default_true")]
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cms_rule_documents() {
        let json = r#"[
            {"id":"r1","name":"Dollar","type":"dollar","pointsPerDollar":1.5},
            {"id":"r2","type":"product","productIds":["p1","p2"],"points":20,"active":false},
            {"id":"r3","type":"order","points":10,"minOrderTotalCents":2500},
            {"id":"r4","type":"quiz","points":50}
        ]"#;
        let rules: Vec<LoyaltyRule> = serde_json::from_str(json).unwrap();

        assert_eq!(
            rules[0].kind,
            RuleKind::Dollar {
                points_per_dollar: 1.5
            }
        );
        assert!(rules[0].active);
        assert!(!rules[1].active);
        assert_eq!(
            rules[2].kind,
            RuleKind::Order {
                points: 10,
                min_order_total_cents: Some(2500)
            }
        );
        assert_eq!(
            rules[3].kind,
            RuleKind::Quiz {
                quiz_id: None,
                points: 50
            }
        );
    }

    #[test]
    fn tier_multiplier_defaults_to_one() {
        let tier: LoyaltyTier =
            serde_json::from_str(r#"{"id":"t","name":"Bronze","minPoints":0}"#).unwrap();
        assert!((tier.multiplier - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn inactive_rewards_are_not_found() {
        let config = LoyaltyConfig {
            rewards: vec![
                LoyaltyReward {
                    id: "a".into(),
                    name: "Pre-roll".into(),
                    cost_points: 100,
                    min_tier_id: None,
                    active: false,
                },
                LoyaltyReward {
                    id: "b".into(),
                    name: "Grinder".into(),
                    cost_points: 400,
                    min_tier_id: None,
                    active: true,
                },
            ],
            ..LoyaltyConfig::default()
        };

        assert!(config.active_reward("a").is_none());
        assert_eq!(config.active_reward("b").map(|r| r.cost_points), Some(400));
    }
}
