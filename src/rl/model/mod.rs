//! Policy Models
//!
//! Stateful estimators mapping a state vector to per-action scores.

pub mod sgd;

pub use sgd::SgdPolicy;

use crate::error::Result;
use crate::rl::core::{ActionId, ActionScores, StateVector};

/// Trainable state → action-value estimator
pub trait PolicyModel: Send {
    /// Per-action scores, monotonic with confidence.
    ///
    /// Fails with `UntrainedModel` before the first update or fit.
    fn score(&self, state: &StateVector) -> Result<ActionScores>;

    /// `argmax` of [`score`](Self::score), ties to the lowest action tag
    fn best_action(&self, state: &StateVector) -> Result<ActionId> {
        Ok(self.score(state)?.argmax())
    }

    /// One incremental step per example; a single example is fine
    fn partial_update(&mut self, batch: &[(&StateVector, ActionId)]) -> Result<()>;

    /// Discard current parameters and fit from scratch
    fn full_fit(&mut self, states: &[&StateVector], actions: &[ActionId]) -> Result<()>;

    fn is_trained(&self) -> bool;
}
