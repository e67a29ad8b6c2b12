//! Learning Monitor
//!
//! Turns learner snapshots into reports and keeps a bounded history of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::info;

use crate::rl::learner::{LearnerPhase, LearnerSnapshot};

/// Reports kept by default
pub const DEFAULT_HISTORY_LEN: usize = 1_000;

/// Learning progress at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningReport {
    pub timestamp: DateTime<Utc>,
    /// Current epsilon
    pub exploration_rate: f64,
    /// Buffer fill, 0..=1
    pub memory_utilization: f64,
    pub drift_detected: bool,
    pub drift_events: u64,
    pub retrain_count: u64,
    pub replay_count: u64,
    pub transitions_seen: u64,
    /// Mean of the recent reward window, 0 when empty
    pub mean_recent_reward: f64,
    pub recent_rewards: Vec<f64>,
    pub phase: LearnerPhase,
    /// Agreement between buffered actions and the model's choice
    pub model_accuracy: Option<f64>,
}

impl LearningReport {
    pub fn from_snapshot(snapshot: &LearnerSnapshot) -> Self {
        let memory_utilization = if snapshot.buffer_capacity == 0 {
            0.0
        } else {
            snapshot.buffer_len as f64 / snapshot.buffer_capacity as f64
        };

        let mean_recent_reward = if snapshot.recent_rewards.is_empty() {
            0.0
        } else {
            snapshot.recent_rewards.iter().sum::<f64>() / snapshot.recent_rewards.len() as f64
        };

        Self {
            timestamp: Utc::now(),
            exploration_rate: snapshot.epsilon,
            memory_utilization,
            drift_detected: snapshot.drift_detected,
            drift_events: snapshot.drift_events,
            retrain_count: snapshot.retrain_count,
            replay_count: snapshot.replay_count,
            transitions_seen: snapshot.transitions_seen,
            mean_recent_reward,
            recent_rewards: snapshot.recent_rewards.clone(),
            phase: snapshot.phase,
            model_accuracy: snapshot.model_accuracy,
        }
    }
}

/// Performance history collector
#[derive(Debug)]
pub struct LearningMonitor {
    history: VecDeque<LearningReport>,
    max_history: usize,
}

impl Default for LearningMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl LearningMonitor {
    pub fn new(max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            history: VecDeque::with_capacity(max_history.min(DEFAULT_HISTORY_LEN)),
            max_history,
        }
    }

    /// Build a report, log it and append it to the history
    pub fn record(&mut self, snapshot: &LearnerSnapshot) -> LearningReport {
        let report = LearningReport::from_snapshot(snapshot);

        info!(
            epsilon = report.exploration_rate,
            memory = report.memory_utilization,
            drift = report.drift_detected,
            retrains = report.retrain_count,
            mean_reward = report.mean_recent_reward,
            accuracy = ?report.model_accuracy,
            "Learning progress"
        );

        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(report.clone());
        report
    }

    pub fn latest(&self) -> Option<&LearningReport> {
        self.history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &LearningReport> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
