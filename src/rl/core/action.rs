//! Action Space
//!
//! The closed discrete action set and per-action value estimates.

use serde::{Deserialize, Serialize};

/// Number of discrete actions
pub const NUM_ACTIONS: usize = 3;

/// Discrete trading action.
///
/// The integer tags are persisted inside model snapshots and must never
/// change meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActionId {
    /// Stay flat, no order
    Hold = 0,
    /// Open a rise (CALL) contract
    Buy = 1,
    /// Open a fall (PUT) contract
    Sell = 2,
}

impl ActionId {
    /// Convert from action index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Hold),
            1 => Some(Self::Buy),
            2 => Some(Self::Sell),
            _ => None,
        }
    }

    /// Convert to action index
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// All actions in tag order
    pub fn all() -> &'static [ActionId; NUM_ACTIONS] {
        &[Self::Hold, Self::Buy, Self::Sell]
    }

    /// Whether this action results in an order
    pub fn is_trade(&self) -> bool {
        !matches!(self, Self::Hold)
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Hold => "Hold, no order",
            Self::Buy => "Buy rise contract",
            Self::Sell => "Buy fall contract",
        }
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::Hold
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionId::Hold => write!(f, "hold"),
            ActionId::Buy => write!(f, "buy"),
            ActionId::Sell => write!(f, "sell"),
        }
    }
}

/// Value estimate per action, indexed by [`ActionId`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionScores([f64; NUM_ACTIONS]);

impl ActionScores {
    pub fn new(values: [f64; NUM_ACTIONS]) -> Self {
        Self(values)
    }

    /// Equal score for every action
    pub fn uniform() -> Self {
        Self([1.0 / NUM_ACTIONS as f64; NUM_ACTIONS])
    }

    pub fn get(&self, action: ActionId) -> f64 {
        self.0[action.to_index()]
    }

    /// Copy with one action's entry replaced
    pub fn with_value(mut self, action: ActionId, value: f64) -> Self {
        self.0[action.to_index()] = value;
        self
    }

    /// Highest-scoring action; ties go to the lowest tag, NaN never wins.
    pub fn argmax(&self) -> ActionId {
        let mut best = ActionId::Hold;
        let mut best_value = f64::NEG_INFINITY;
        for (action, value) in self.iter() {
            if value > best_value {
                best = action;
                best_value = value;
            }
        }
        best
    }

    /// Largest finite-or-infinite score, ignoring NaN
    pub fn max(&self) -> f64 {
        self.0
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionId, f64)> + '_ {
        ActionId::all().iter().map(move |a| (*a, self.0[a.to_index()]))
    }

    pub fn as_array(&self) -> &[f64; NUM_ACTIONS] {
        &self.0
    }
}
