//! Reward Functions
//!
//! Turns a settled trade into the scalar reward fed to the online learner.

use serde::{Deserialize, Serialize};

/// Settled trade outcome reported by the execution collaborator
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeResult {
    /// Realized profit in account currency (negative for a loss)
    pub profit: f64,
    /// Capital put at risk (the stake)
    pub risk: f64,
    /// Contract duration in seconds
    pub duration_seconds: f64,
    /// Whether the contract settled in our favour
    pub success: bool,
}

/// Trait for computing rewards
pub trait RewardFunction: Send + Sync {
    /// Compute reward from a settled trade
    fn compute(&self, result: &TradeResult) -> f64;
}

/// Profit normalized by risk and holding time.
///
/// `reward = profit / (risk * duration_seconds)`. Zero or negative risk or
/// duration, or any non-finite input, yields `0.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskNormalizedReward;

impl RiskNormalizedReward {
    pub fn new() -> Self {
        Self
    }
}

impl RewardFunction for RiskNormalizedReward {
    fn compute(&self, result: &TradeResult) -> f64 {
        let TradeResult {
            profit,
            risk,
            duration_seconds,
            success,
        } = *result;

        if !(profit.is_finite() && risk.is_finite() && duration_seconds.is_finite()) {
            return 0.0;
        }
        if risk <= 0.0 || duration_seconds <= 0.0 {
            return 0.0;
        }

        // A losing contract cannot report a gain.
        let profit = if success { profit } else { profit.min(0.0) };

        let reward = profit / (risk * duration_seconds);
        if reward.is_finite() {
            reward
        } else {
            0.0
        }
    }
}
