//! Replay Buffer
//!
//! Fixed-capacity FIFO ring of past transitions for experience replay.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{AdaptError, Result};
use crate::rl::core::{ActionId, StateVector};

/// A single transition in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// State features before action
    pub state: StateVector,
    /// Action taken
    pub action: ActionId,
    /// Reward received
    pub reward: f64,
    /// Next state features
    pub next_state: StateVector,
    /// Whether the episode terminated
    pub terminal: bool,
}

impl Transition {
    /// Create a new transition
    pub fn new(
        state: StateVector,
        action: ActionId,
        reward: f64,
        next_state: StateVector,
        terminal: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            terminal,
        }
    }

    /// Check dimensions and reward before the transition is accepted
    pub fn validate(&self, state_dim: usize) -> Result<()> {
        self.state.ensure_dim(state_dim)?;
        self.next_state.ensure_dim(state_dim)?;
        if !self.reward.is_finite() {
            return Err(AdaptError::InvalidStateVector(format!(
                "reward is not finite ({})",
                self.reward
            )));
        }
        Ok(())
    }
}

/// Replay buffer for experience storage.
///
/// Insertion order is recency order; once full, every push evicts the oldest
/// transition.
#[derive(Debug, Clone)]
pub struct ExperienceBuffer {
    /// Storage for transitions
    buffer: VecDeque<Transition>,
    /// Maximum capacity
    capacity: usize,
}

impl ExperienceBuffer {
    /// Create a new buffer with given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a transition, evicting the oldest when full
    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Sample `batch_size` distinct transitions uniformly without replacement
    pub fn sample<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Vec<&Transition>> {
        if batch_size > self.buffer.len() {
            return Err(AdaptError::InsufficientData {
                requested: batch_size,
                available: self.buffer.len(),
            });
        }

        Ok(index::sample(rng, self.buffer.len(), batch_size)
            .into_iter()
            .map(|i| &self.buffer[i])
            .collect())
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    /// Get current number of transitions
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Check if buffer is at capacity
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    /// Get buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.buffer.len() as f64 / self.capacity as f64
    }

    /// Extract training columns (states, actions)
    pub fn to_dataset(&self) -> (Vec<&StateVector>, Vec<ActionId>) {
        self.buffer.iter().map(|t| (&t.state, t.action)).unzip()
    }
}

impl Default for ExperienceBuffer {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl Extend<Transition> for ExperienceBuffer {
    fn extend<T: IntoIterator<Item = Transition>>(&mut self, iter: T) {
        for transition in iter {
            self.push(transition);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn make_transition(reward: f64) -> Transition {
        let state = StateVector::new(vec![0.0; 4], 4).unwrap();
        Transition::new(state.clone(), ActionId::Hold, reward, state, false)
    }

    fn rewards(buffer: &ExperienceBuffer) -> Vec<f64> {
        buffer.iter().map(|t| t.reward).collect()
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut buffer = ExperienceBuffer::new(10);

        for i in 0..15 {
            buffer.push(make_transition(i as f64));
        }

        assert_eq!(buffer.len(), 10);
        assert!(buffer.is_full());
        let expected: Vec<f64> = (5..15).map(|i| i as f64).collect();
        assert_eq!(rewards(&buffer), expected);
    }

    #[test]
    fn test_capacity_three_keeps_last_three() {
        let mut buffer = ExperienceBuffer::new(3);
        for r in [1.0, 2.0, 3.0, 4.0] {
            buffer.push(make_transition(r));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(rewards(&buffer), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sample_returns_distinct_elements() {
        let mut buffer = ExperienceBuffer::new(100);
        for i in 0..50 {
            buffer.push(make_transition(i as f64));
        }

        let mut rng = StdRng::seed_from_u64(7);
        for batch_size in [0, 1, 10, 50] {
            let batch = buffer.sample(batch_size, &mut rng).unwrap();
            assert_eq!(batch.len(), batch_size);

            let distinct: HashSet<u64> = batch.iter().map(|t| t.reward.to_bits()).collect();
            assert_eq!(distinct.len(), batch_size);
        }
    }

    #[test]
    fn test_sample_more_than_len_fails() {
        let mut buffer = ExperienceBuffer::new(10);
        for i in 0..5 {
            buffer.push(make_transition(i as f64));
        }

        let mut rng = StdRng::seed_from_u64(1);
        match buffer.sample(6, &mut rng) {
            Err(AdaptError::InsufficientData {
                requested,
                available,
            }) => {
                assert_eq!(requested, 6);
                assert_eq!(available, 5);
            }
            other => panic!("expected InsufficientData, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_validate_rejects_dimension_mismatch() {
        let t = make_transition(1.0);
        assert!(t.validate(4).is_ok());
        assert!(matches!(
            t.validate(5),
            Err(AdaptError::InvalidStateVector(_))
        ));
    }
}
