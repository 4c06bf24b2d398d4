//! Loyalty domain errors.

/// Result type for loyalty engine operations.
pub type Result<T> = std::result::Result<T, LoyaltyError>;

/// Reasons a loyalty operation is refused.
///
/// Every variant maps to a stable, client-visible code (see [`LoyaltyError::code`]).
/// A refused operation never leaves a partial balance change behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoyaltyError {
    /// The balance does not cover the requested debit.
    #[error("insufficient points: balance={balance}, required={required}")]
    InsufficientPoints {
        /// Current balance.
        balance: i64,
        /// Points the operation needs.
        required: i64,
    },

    /// The reward requires a higher tier than the account holds.
    #[error("tier not eligible: reward requires {required_tier}")]
    TierNotEligible {
        /// Tier id the reward is gated on.
        required_tier: String,
        /// Tier id the account currently holds, if any.
        current_tier: Option<String>,
    },

    /// No active reward with this id exists in the scope.
    #[error("reward not found: {reward_id}")]
    RewardNotFound {
        /// The requested reward id.
        reward_id: String,
    },

    /// The caller accepted a different version of the program terms.
    #[error("legal version mismatch: expected {expected}, got {provided:?}")]
    LegalVersionMismatch {
        /// Terms version currently in force.
        expected: String,
        /// Terms version the caller accepted.
        provided: Option<String>,
    },
}

impl LoyaltyError {
    /// Stable error code returned to API clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InsufficientPoints { .. } => "LOYALTY_INSUFFICIENT_POINTS",
            Self::TierNotEligible { .. } => "LOYALTY_TIER_NOT_ELIGIBLE",
            Self::RewardNotFound { .. } => "LOYALTY_REWARD_NOT_FOUND",
            Self::LegalVersionMismatch { .. } => "LOYALTY_LEGAL_VERSION_MISMATCH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let insufficient = LoyaltyError::InsufficientPoints {
            balance: 10,
            required: 50,
        };
        assert_eq!(insufficient.code(), "LOYALTY_INSUFFICIENT_POINTS");
        assert_eq!(
            LoyaltyError::RewardNotFound {
                reward_id: "r1".into()
            }
            .code(),
            "LOYALTY_REWARD_NOT_FOUND"
        );
        assert_eq!(
            insufficient.to_string(),
            "insufficient points: balance=10, required=50"
        );
    }
}
