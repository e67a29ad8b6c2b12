//! Core RL abstractions
//!
//! Fundamental types for state representation, actions, and rewards.

pub mod action;
pub mod reward;
pub mod state;

pub use action::{ActionId, ActionScores, NUM_ACTIONS};
pub use reward::{RewardFunction, RiskNormalizedReward, TradeResult};
pub use state::StateVector;
