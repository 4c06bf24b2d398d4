//! Personalization rule evaluation.
//!
//! A rule boosts the score of the content candidates it targets when all of
//! its conditions hold against the caller's context. Scoring is a linear scan
//! over rules per candidate; rule sets are tens of entries, not millions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

/// A condition/action rule authored in the CMS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizationRule {
    /// CMS document id.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Inactive rules never match.
    #[serde(default = "default_true")]
    pub active: bool,

    /// All must hold; an empty list always holds.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// What a match does.
    pub action: RuleAction,
}

/// A predicate over one context field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dot-separated path into the context object, e.g. `user.segment`.
    pub field: String,

    /// Comparison operator.
    pub op: ConditionOp,

    /// Operand; ignored by `exists`.
    #[serde(default)]
    pub value: Value,
}

/// Supported comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    /// Field equals value.
    Equals,
    /// Field is present and differs from value.
    NotEquals,
    /// Field equals one element of the value array.
    In,
    /// Field (array or string) contains the value.
    Contains,
    /// Numeric greater-than.
    Gt,
    /// Numeric greater-or-equal.
    Gte,
    /// Numeric less-than.
    Lt,
    /// Numeric less-or-equal.
    Lte,
    /// Field is present and not null.
    Exists,
}

/// The boost a matching rule applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    /// Added to every targeted candidate's score.
    pub priority_boost: f64,

    /// Which candidates are boosted.
    #[serde(default)]
    pub target: Target,
}

/// Candidate filter; empty lists mean "any".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Candidate ids.
    #[serde(default)]
    pub content_ids: Vec<String>,
    /// Candidate content types (`article`, `deal`, ...).
    #[serde(default)]
    pub content_types: Vec<String>,
    /// Tags; a candidate needs at least one.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Target {
    fn accepts(&self, candidate: &Candidate) -> bool {
        (self.content_ids.is_empty() || self.content_ids.contains(&candidate.id))
            && (self.content_types.is_empty()
                || self.content_types.contains(&candidate.content_type))
            && (self.tags.is_empty() || candidate.tags.iter().any(|t| self.tags.contains(t)))
    }
}

/// A piece of content that can be ranked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Content id.
    pub id: String,
    /// Content type.
    #[serde(default)]
    pub content_type: String,
    /// Content tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A candidate with its accumulated score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    /// Content id.
    pub id: String,
    /// Sum of boosts of matching rules.
    pub score: f64,
    /// Ids of the rules that contributed.
    pub matched_rules: Vec<String>,
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(context, |node, key| node.get(key))
        .filter(|v| !v.is_null())
}

fn compare_numbers(field: &Value, value: &Value, accept: fn(f64, f64) -> bool) -> bool {
    match (field.as_f64(), value.as_f64()) {
        (Some(a), Some(b)) => accept(a, b),
        _ => false,
    }
}

/// JSON equality where `30` and `30.0` are the same number.
#[allow(clippy::float_cmp)]
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

impl Condition {
    /// Evaluate against a JSON context.
    #[must_use]
    pub fn matches(&self, context: &Value) -> bool {
        let Some(field) = lookup(context, &self.field) else {
            return false;
        };

        match self.op {
            ConditionOp::Exists => true,
            ConditionOp::Equals => values_equal(field, &self.value),
            ConditionOp::NotEquals => !values_equal(field, &self.value),
            ConditionOp::In => self
                .value
                .as_array()
                .is_some_and(|options| options.iter().any(|o| values_equal(o, field))),
            ConditionOp::Contains => match field {
                Value::Array(items) => items.iter().any(|i| values_equal(i, &self.value)),
                Value::String(s) => self.value.as_str().is_some_and(|needle| s.contains(needle)),
                _ => false,
            },
            ConditionOp::Gt => compare_numbers(field, &self.value, |a, b| a > b),
            ConditionOp::Gte => compare_numbers(field, &self.value, |a, b| a >= b),
            ConditionOp::Lt => compare_numbers(field, &self.value, |a, b| a < b),
            ConditionOp::Lte => compare_numbers(field, &self.value, |a, b| a <= b),
        }
    }
}

impl PersonalizationRule {
    /// Whether the rule is active and all its conditions hold.
    #[must_use]
    pub fn applies_to(&self, context: &Value) -> bool {
        self.active && self.conditions.iter().all(|c| c.matches(context))
    }
}

/// Score and rank candidates.
///
/// The output is sorted by score, highest first; equal scores keep their input
/// order, so identical inputs always produce the identical ranking.
#[must_use]
pub fn evaluate_personalization(
    rules: &[PersonalizationRule],
    context: &Value,
    candidates: &[Candidate],
) -> Vec<ScoredCandidate> {
    let applicable: Vec<&PersonalizationRule> =
        rules.iter().filter(|r| r.applies_to(context)).collect();

    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|candidate| {
            let mut score = 0.0;
            let mut matched_rules = Vec::new();
            for rule in applicable.iter().filter(|r| r.action.target.accepts(candidate)) {
                score += rule.action.priority_boost;
                matched_rules.push(rule.id.clone());
            }
            ScoredCandidate {
                id: candidate.id.clone(),
                score,
                matched_rules,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}
