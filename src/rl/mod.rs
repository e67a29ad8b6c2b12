//! Reinforcement Learning Module
//!
//! Online Q-learning core of the agent.
//!
//! # Components
//!
//! - **Experience Buffer**: fixed-capacity FIFO of past transitions
//! - **Drift Detection**: ADWIN over the reward stream
//! - **Policy Model**: one-vs-rest logistic policy trained by SGD
//! - **Online Learner**: replay, drift-triggered retraining, exploration state
//! - **Decision Policy**: epsilon-greedy action selection and trade intents
//! - **Signals**: rule-based Bollinger mean reversion alongside the policy

pub mod config;
pub mod core;
pub mod drift;
pub mod learner;
pub mod memory;
pub mod model;
pub mod policy;
pub mod signal;
pub mod training;

// Config exports
pub use config::LearnerConfig;

// Core exports
pub use core::{
    ActionId, ActionScores, RewardFunction, RiskNormalizedReward, StateVector, TradeResult,
    NUM_ACTIONS,
};

pub use drift::{Adwin, DriftDetector};
pub use learner::{
    LearnerPhase, LearnerSnapshot, LearnerState, ObserveOutcome, OnlineLearner,
};
pub use memory::{ExperienceBuffer, Transition};
pub use model::{PolicyModel, SgdPolicy};
pub use policy::{
    DecisionPolicy, Direction, FixedFractionSizer, MarketContext, PositionSizer, TradeIntent,
};
pub use signal::{BollingerSignal, SignalSource};
pub use training::{resume_or_fresh, Checkpointer, SessionSnapshot};
