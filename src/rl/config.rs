//! RL Configuration
//!
//! Typed, validated hyperparameters for the online learner. Validated once
//! when the learner is built and never mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::error::{AdaptError, Result};

/// Online learner hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Experience buffer capacity
    pub buffer_capacity: usize,
    /// Mini-batch size for experience replay
    pub batch_size: usize,
    /// Replay runs once the buffer holds strictly more than this many transitions
    pub replay_trigger_threshold: usize,
    /// Initial exploration rate
    pub epsilon_start: f64,
    /// Exploration floor
    pub epsilon_min: f64,
    /// Multiplicative decay applied after every processed transition
    pub epsilon_decay: f64,
    /// Discount factor
    pub gamma: f64,
    /// ADWIN confidence parameter
    pub drift_delta: f64,
    /// Epsilon multiplier applied after a drift-triggered retrain
    pub drift_recovery_factor: f64,
    /// SGD step size
    pub learning_rate: f64,
    /// L2 regularization strength
    pub l2_penalty: f64,
    /// Passes over the buffer during a full retrain
    pub fit_epochs: usize,
    /// Length of every state vector
    pub state_dim: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10_000,
            batch_size: 32,
            replay_trigger_threshold: 100,
            epsilon_start: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            gamma: 0.95,
            drift_delta: 0.002,
            drift_recovery_factor: 0.9,
            learning_rate: 0.01,
            l2_penalty: 0.0001,
            fit_epochs: 5,
            state_dim: 5,
        }
    }
}

impl LearnerConfig {
    /// Collect every invalid field
    pub fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.buffer_capacity == 0 {
            errors.push("buffer_capacity must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            errors.push("batch_size must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.epsilon_min) {
            errors.push(format!("epsilon_min {} must be in [0, 1]", self.epsilon_min));
        }
        if !(self.epsilon_min..=1.0).contains(&self.epsilon_start) {
            errors.push(format!(
                "epsilon_start {} must be in [epsilon_min, 1]",
                self.epsilon_start
            ));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            errors.push(format!("epsilon_decay {} must be in (0, 1]", self.epsilon_decay));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            errors.push(format!("gamma {} must be in [0, 1]", self.gamma));
        }
        if !(self.drift_delta > 0.0 && self.drift_delta < 1.0) {
            errors.push(format!("drift_delta {} must be in (0, 1)", self.drift_delta));
        }
        if !(self.drift_recovery_factor > 0.0 && self.drift_recovery_factor <= 1.0) {
            errors.push(format!(
                "drift_recovery_factor {} must be in (0, 1]",
                self.drift_recovery_factor
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            errors.push("learning_rate must be positive".to_string());
        }
        if !(self.l2_penalty.is_finite() && self.l2_penalty >= 0.0) {
            errors.push("l2_penalty must be non-negative".to_string());
        }
        if self.fit_epochs == 0 {
            errors.push("fit_epochs must be at least 1".to_string());
        }
        if self.state_dim == 0 {
            errors.push("state_dim must be at least 1".to_string());
        }

        errors
    }

    /// Validate, joining all problems into a single error
    pub fn validate(&self) -> Result<()> {
        let errors = self.problems();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AdaptError::Validation(errors.join("; ")))
        }
    }
}
