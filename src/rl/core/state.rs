//! State Representation
//!
//! The learner and decision policy consume fixed-length, already-normalized
//! feature vectors produced upstream. Validation happens once, here, so that
//! garbage never reaches the buffer, the drift detector or the model.

use serde::{Deserialize, Serialize};

use crate::error::{AdaptError, Result};

/// Validated fixed-length feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct StateVector(Vec<f64>);

impl StateVector {
    /// Build a state vector, rejecting wrong dimensions and non-finite values
    pub fn new(values: Vec<f64>, expected_dim: usize) -> Result<Self> {
        if values.len() != expected_dim {
            return Err(AdaptError::InvalidStateVector(format!(
                "expected {} features, got {}",
                expected_dim,
                values.len()
            )));
        }
        Self::try_from(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Check against a required dimension
    pub fn ensure_dim(&self, expected_dim: usize) -> Result<()> {
        if self.0.len() != expected_dim {
            return Err(AdaptError::InvalidStateVector(format!(
                "expected {} features, got {}",
                expected_dim,
                self.0.len()
            )));
        }
        Ok(())
    }
}

impl TryFrom<Vec<f64>> for StateVector {
    type Error = AdaptError;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(AdaptError::InvalidStateVector(
                "state vector is empty".to_string(),
            ));
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(AdaptError::InvalidStateVector(format!(
                "feature {} is not finite ({})",
                idx, values[idx]
            )));
        }
        Ok(Self(values))
    }
}

impl From<StateVector> for Vec<f64> {
    fn from(state: StateVector) -> Self {
        state.0
    }
}

impl AsRef<[f64]> for StateVector {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}
