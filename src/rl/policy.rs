//! Decision Policy
//!
//! Epsilon-greedy action selection over a [`PolicyModel`] and translation of
//! the chosen action into a broker-agnostic trade intent.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AdaptError;
use crate::rl::core::{ActionId, StateVector, NUM_ACTIONS};
use crate::rl::model::PolicyModel;

/// Contract direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Pays out if the price rises
    Call,
    /// Pays out if the price falls
    Put,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Call => write!(f, "CALL"),
            Direction::Put => write!(f, "PUT"),
        }
    }
}

/// Market snapshot handed to sizing and intent construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub symbol: String,
    pub price: Decimal,
    /// Account balance available for staking
    pub balance: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Broker-agnostic order request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub intent_id: Uuid,
    pub symbol: String,
    pub action: ActionId,
    pub direction: Direction,
    pub stake: Decimal,
    pub entry_price: Decimal,
    pub duration_secs: u64,
    /// Model score of the chosen action, 0..=1 (1 for rule signals)
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Risk-aware stake sizing
pub trait PositionSizer: Send + Sync {
    /// Stake for a trade, or `None` if no acceptable size exists
    fn stake(&self, context: &MarketContext, confidence: f64) -> Option<Decimal>;
}

/// Stakes a fixed fraction of balance, scaled between half and full size by
/// model confidence.
#[derive(Debug, Clone)]
pub struct FixedFractionSizer {
    fraction: Decimal,
    min_stake: Decimal,
}

impl FixedFractionSizer {
    pub fn new(fraction: Decimal, min_stake: Decimal) -> Self {
        Self {
            fraction,
            min_stake,
        }
    }
}

impl PositionSizer for FixedFractionSizer {
    fn stake(&self, context: &MarketContext, confidence: f64) -> Option<Decimal> {
        let max_stake = context.balance * self.fraction;
        if max_stake < self.min_stake {
            return None;
        }

        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let scale = Decimal::from_f64(0.5 + 0.5 * confidence).unwrap_or(Decimal::ONE);
        let stake = (max_stake * scale).round_dp(2).max(self.min_stake);

        Some(stake.min(max_stake))
    }
}

/// Epsilon-greedy decision policy
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    contract_duration_secs: u64,
}

impl DecisionPolicy {
    pub fn new(contract_duration_secs: u64) -> Self {
        Self {
            contract_duration_secs,
        }
    }

    /// Random action with probability `epsilon`, otherwise the model's best.
    ///
    /// An untrained or failing model falls back to `Hold`.
    pub fn select_action<M, R>(
        &self,
        state: &StateVector,
        epsilon: f64,
        model: &M,
        rng: &mut R,
    ) -> ActionId
    where
        M: PolicyModel + ?Sized,
        R: Rng + ?Sized,
    {
        if epsilon > 0.0 && rng.gen::<f64>() < epsilon {
            let action = ActionId::from_index(rng.gen_range(0..NUM_ACTIONS)).unwrap_or_default();
            debug!(%action, epsilon, "Exploring");
            return action;
        }

        match model.best_action(state) {
            Ok(action) => action,
            Err(AdaptError::UntrainedModel) => {
                debug!("Model untrained, holding");
                ActionId::Hold
            }
            Err(e) => {
                warn!("Policy scoring failed, holding: {}", e);
                ActionId::Hold
            }
        }
    }

    /// Model score for `action`, or a neutral prior when unavailable
    pub fn confidence<M: PolicyModel + ?Sized>(
        &self,
        state: &StateVector,
        action: ActionId,
        model: &M,
    ) -> f64 {
        model
            .score(state)
            .map(|scores| scores.get(action))
            .unwrap_or(1.0 / NUM_ACTIONS as f64)
    }

    /// Map `Buy`/`Sell` to a sized directional intent; `Hold` maps to `None`.
    pub fn to_trade_intent(
        &self,
        action: ActionId,
        context: &MarketContext,
        confidence: f64,
        sizer: &dyn PositionSizer,
    ) -> Option<TradeIntent> {
        let direction = match action {
            ActionId::Hold => return None,
            ActionId::Buy => Direction::Call,
            ActionId::Sell => Direction::Put,
        };

        let Some(stake) = sizer.stake(context, confidence) else {
            warn!(
                balance = %context.balance,
                "No acceptable stake for {} {}", direction, context.symbol
            );
            return None;
        };

        Some(TradeIntent {
            intent_id: Uuid::new_v4(),
            symbol: context.symbol.clone(),
            action,
            direction,
            stake,
            entry_price: context.price,
            duration_secs: self.contract_duration_secs,
            confidence,
            created_at: Utc::now(),
        })
    }
}
