//! One-vs-rest logistic policy trained by SGD.
//!
//! Each action owns a binary logistic regression ("this action" vs the rest).
//! `score` normalizes the three sigmoid outputs so they sum to one. All three
//! action labels are always known, so fitting on a dataset containing a
//! single action is legal.

use serde::{Deserialize, Serialize};

use super::PolicyModel;
use crate::error::{AdaptError, Result};
use crate::rl::config::LearnerConfig;
use crate::rl::core::{ActionId, ActionScores, StateVector, NUM_ACTIONS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdPolicy {
    n_features: usize,
    /// Weights shape: [action][feature]
    weights: [Vec<f64>; NUM_ACTIONS],
    bias: [f64; NUM_ACTIONS],
    learning_rate: f64,
    l2_penalty: f64,
    fit_epochs: usize,
    /// Examples consumed since the last reset
    updates: u64,
    trained: bool,
}

impl SgdPolicy {
    pub fn new(n_features: usize, learning_rate: f64, l2_penalty: f64, fit_epochs: usize) -> Self {
        Self {
            n_features,
            weights: std::array::from_fn(|_| vec![0.0; n_features]),
            bias: [0.0; NUM_ACTIONS],
            learning_rate,
            l2_penalty,
            fit_epochs: fit_epochs.max(1),
            updates: 0,
            trained: false,
        }
    }

    pub fn from_config(config: &LearnerConfig) -> Self {
        Self::new(
            config.state_dim,
            config.learning_rate,
            config.l2_penalty,
            config.fit_epochs,
        )
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Shape and finiteness checks for a deserialized model
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.n_features == 0 {
            return Err("n_features must be > 0".to_string());
        }
        for (idx, row) in self.weights.iter().enumerate() {
            if row.len() != self.n_features {
                return Err(format!(
                    "weights[{idx}] len {} != n_features {}",
                    row.len(),
                    self.n_features
                ));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(format!("weights[{idx}] contain non-finite values"));
            }
        }
        if self.bias.iter().any(|v| !v.is_finite()) {
            return Err("bias contains non-finite values".to_string());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err("learning_rate must be positive".to_string());
        }
        Ok(())
    }

    fn reset(&mut self) {
        for row in &mut self.weights {
            row.iter_mut().for_each(|w| *w = 0.0);
        }
        self.bias = [0.0; NUM_ACTIONS];
        self.updates = 0;
        self.trained = false;
    }

    fn logit(&self, action: usize, x: &[f64]) -> f64 {
        self.bias[action]
            + self.weights[action]
                .iter()
                .zip(x)
                .map(|(w, xi)| w * xi)
                .sum::<f64>()
    }

    fn step(&mut self, x: &[f64], label: ActionId) {
        let lr = self.learning_rate;
        let shrink = 1.0 - lr * self.l2_penalty;

        for action in 0..NUM_ACTIONS {
            let target = if action == label.to_index() { 1.0 } else { 0.0 };
            let grad = sigmoid(self.logit(action, x)) - target;

            for (w, xi) in self.weights[action].iter_mut().zip(x) {
                *w = *w * shrink - lr * grad * xi;
            }
            self.bias[action] -= lr * grad;
        }
        self.updates += 1;
    }
}

impl PolicyModel for SgdPolicy {
    fn score(&self, state: &StateVector) -> Result<ActionScores> {
        if !self.trained {
            return Err(AdaptError::UntrainedModel);
        }
        state.ensure_dim(self.n_features)?;

        let x = state.as_slice();
        let raw: [f64; NUM_ACTIONS] = std::array::from_fn(|a| sigmoid(self.logit(a, x)));
        let sum: f64 = raw.iter().sum();
        if !(sum.is_finite() && sum > 0.0) {
            return Ok(ActionScores::uniform());
        }

        Ok(ActionScores::new(raw.map(|p| p / sum)))
    }

    fn partial_update(&mut self, batch: &[(&StateVector, ActionId)]) -> Result<()> {
        if batch.is_empty() {
            return Err(AdaptError::Validation(
                "partial_update needs at least one example".to_string(),
            ));
        }
        for (state, _) in batch {
            state.ensure_dim(self.n_features)?;
        }

        for (state, label) in batch {
            self.step(state.as_slice(), *label);
        }
        self.trained = true;
        Ok(())
    }

    fn full_fit(&mut self, states: &[&StateVector], actions: &[ActionId]) -> Result<()> {
        if states.is_empty() {
            return Err(AdaptError::Validation(
                "full_fit needs a non-empty dataset".to_string(),
            ));
        }
        if states.len() != actions.len() {
            return Err(AdaptError::Validation(format!(
                "full_fit got {} states but {} actions",
                states.len(),
                actions.len()
            )));
        }
        for state in states {
            state.ensure_dim(self.n_features)?;
        }

        self.reset();
        for _ in 0..self.fit_epochs {
            for (state, label) in states.iter().zip(actions) {
                self.step(state.as_slice(), *label);
            }
        }
        self.trained = true;
        Ok(())
    }

    fn is_trained(&self) -> bool {
        self.trained
    }
}

fn sigmoid(x: f64) -> f64 {
    // Numerically-stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
