//! Online Learner
//!
//! Reactive component fed one transition per trade cycle. Each observation
//! is appended to the experience buffer and its reward fed to the drift
//! detector. A detected drift triggers a full retrain on everything in the
//! buffer; otherwise, once the buffer is past the replay threshold, a
//! mini-batch of stored transitions is replayed through the Q-learning
//! relabel-then-fit update.
//!
//! Epsilon decay after each processed transition belongs to the caller
//! (see [`OnlineLearner::decay_epsilon`]); the learner itself only applies the
//! drift-recovery multiplier.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::error::{AdaptError, Result};
use crate::rl::config::LearnerConfig;
use crate::rl::core::{ActionScores, StateVector};
use crate::rl::drift::{Adwin, DriftDetector};
use crate::rl::memory::{ExperienceBuffer, Transition};
use crate::rl::model::{PolicyModel, SgdPolicy};

/// Rewards kept for monitoring
pub const RECENT_REWARDS_LEN: usize = 100;

/// Learner state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearnerPhase {
    Idle,
    Accumulating,
    Replaying,
    Retraining,
}

impl std::fmt::Display for LearnerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LearnerPhase::Idle => write!(f, "idle"),
            LearnerPhase::Accumulating => write!(f, "accumulating"),
            LearnerPhase::Replaying => write!(f, "replaying"),
            LearnerPhase::Retraining => write!(f, "retraining"),
        }
    }
}

/// Exploration schedule and discount, persisted across sessions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearnerState {
    pub epsilon: f64,
    pub epsilon_min: f64,
    pub epsilon_decay: f64,
    pub gamma: f64,
}

impl LearnerState {
    pub fn from_config(config: &LearnerConfig) -> Self {
        Self {
            epsilon: config.epsilon_start,
            epsilon_min: config.epsilon_min,
            epsilon_decay: config.epsilon_decay,
            gamma: config.gamma,
        }
    }

    /// `epsilon = max(epsilon_min, epsilon * epsilon_decay)`
    pub fn decay_epsilon(&mut self) -> f64 {
        self.epsilon = (self.epsilon * self.epsilon_decay).max(self.epsilon_min);
        self.epsilon
    }

    /// Post-drift multiplier, clamped to `[epsilon_min, 1]`
    pub fn apply_drift_recovery(&mut self, factor: f64) -> f64 {
        self.epsilon = (self.epsilon * factor).clamp(self.epsilon_min, 1.0);
        self.epsilon
    }

    pub fn validate(&self) -> Result<()> {
        let ok = (0.0..=1.0).contains(&self.epsilon_min)
            && (self.epsilon_min..=1.0).contains(&self.epsilon)
            && self.epsilon_decay > 0.0
            && self.epsilon_decay <= 1.0
            && (0.0..=1.0).contains(&self.gamma);
        if ok {
            Ok(())
        } else {
            Err(AdaptError::Validation(format!(
                "inconsistent learner state: {:?}",
                self
            )))
        }
    }
}

/// What a single `observe` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// Stored only, no training this cycle
    Accumulated,
    /// Mini-batch replay ran over `batch` transitions
    Replayed { batch: usize },
    /// Replay was due but the buffer could not supply the batch
    ReplaySkipped { requested: usize, available: usize },
    /// Drift detected, model refit on `samples` transitions
    Retrained { samples: usize },
}

/// Point-in-time view for monitoring, taken in a single borrow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerSnapshot {
    pub epsilon: f64,
    pub epsilon_min: f64,
    pub buffer_len: usize,
    pub buffer_capacity: usize,
    /// Detected drift not yet consumed by a retrain
    pub drift_detected: bool,
    pub drift_events: u64,
    pub retrain_count: u64,
    pub replay_count: u64,
    pub transitions_seen: u64,
    pub recent_rewards: Vec<f64>,
    pub phase: LearnerPhase,
    /// Share of buffered actions the model would pick itself
    #[serde(default)]
    pub model_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct LearnerStats {
    transitions_seen: u64,
    drift_events: u64,
    retrain_count: u64,
    replay_count: u64,
}

/// Online Q-learning orchestrator over a buffer, drift detector and model
pub struct OnlineLearner<M = SgdPolicy, D = Adwin> {
    config: LearnerConfig,
    state: LearnerState,
    buffer: ExperienceBuffer,
    detector: D,
    model: M,
    phase: LearnerPhase,
    /// Set by the detector, cleared once a retrain consumed it
    drift_pending: bool,
    stats: LearnerStats,
    recent_rewards: VecDeque<f64>,
}

impl OnlineLearner<SgdPolicy, Adwin> {
    /// Fresh learner with an untrained SGD policy and an ADWIN detector
    pub fn new(config: LearnerConfig) -> Result<Self> {
        let model = SgdPolicy::from_config(&config);
        let detector = Adwin::new(config.drift_delta);
        Self::with_parts(config, model, detector)
    }
}

impl<M: PolicyModel, D: DriftDetector> OnlineLearner<M, D> {
    /// Build from explicit components
    pub fn with_parts(config: LearnerConfig, model: M, detector: D) -> Result<Self> {
        config.validate()?;
        let state = LearnerState::from_config(&config);
        let buffer = ExperienceBuffer::new(config.buffer_capacity);

        let mut learner = Self {
            config,
            state,
            buffer,
            detector,
            model,
            phase: LearnerPhase::Idle,
            drift_pending: false,
            stats: LearnerStats::default(),
            recent_rewards: VecDeque::with_capacity(RECENT_REWARDS_LEN),
        };
        learner.phase = LearnerPhase::Accumulating;
        Ok(learner)
    }

    /// Replace the exploration state (used when resuming a session)
    pub fn with_state(mut self, state: LearnerState) -> Result<Self> {
        state.validate()?;
        self.state = state;
        Ok(self)
    }

    /// Preload stored experience, oldest first. Does not touch the detector.
    pub fn with_experience(mut self, experience: Vec<Transition>) -> Result<Self> {
        for transition in &experience {
            transition.validate(self.config.state_dim)?;
        }
        self.buffer.extend(experience);
        Ok(self)
    }

    /// Process one transition.
    ///
    /// Invalid transitions are rejected before any state is touched. Once a
    /// transition is accepted the retrain cannot fail: the buffer holds at
    /// least that transition, every stored state has `state_dim` features,
    /// and `full_fit` checks its inputs before resetting any parameter.
    pub fn observe<R: Rng + ?Sized>(
        &mut self,
        transition: Transition,
        rng: &mut R,
    ) -> Result<ObserveOutcome> {
        if let Err(e) = transition.validate(self.config.state_dim) {
            warn!("Discarding transition: {}", e);
            return Err(e);
        }

        let reward = transition.reward;
        self.buffer.push(transition);
        self.stats.transitions_seen += 1;
        if self.recent_rewards.len() >= RECENT_REWARDS_LEN {
            self.recent_rewards.pop_front();
        }
        self.recent_rewards.push_back(reward);

        if self.detector.update(reward) {
            self.stats.drift_events += 1;
            self.drift_pending = true;
            info!(
                reward,
                window = self.detector.samples_seen(),
                "Concept drift detected in reward stream"
            );
        }

        let outcome = if self.drift_pending {
            self.phase = LearnerPhase::Retraining;
            let result = self.retrain();
            self.phase = LearnerPhase::Accumulating;
            let samples = result?;

            self.drift_pending = false;
            let epsilon = self
                .state
                .apply_drift_recovery(self.config.drift_recovery_factor);
            info!(samples, epsilon, "Retrained policy on current regime");
            ObserveOutcome::Retrained { samples }
        } else if self.buffer.len() > self.config.replay_trigger_threshold {
            self.phase = LearnerPhase::Replaying;
            let result = self.replay(rng);
            self.phase = LearnerPhase::Accumulating;

            match result {
                Ok(batch) => ObserveOutcome::Replayed { batch },
                Err(AdaptError::InsufficientData {
                    requested,
                    available,
                }) => {
                    warn!(requested, available, "Skipping replay, not enough experience");
                    ObserveOutcome::ReplaySkipped {
                        requested,
                        available,
                    }
                }
                Err(e) => return Err(e),
            }
        } else {
            ObserveOutcome::Accumulated
        };

        debug!(
            reward,
            buffer_len = self.buffer.len(),
            epsilon = self.state.epsilon,
            ?outcome,
            "Observed transition"
        );
        Ok(outcome)
    }

    /// Full refit on every buffered transition.
    ///
    /// Only called after a push, so the dataset is never empty.
    fn retrain(&mut self) -> Result<usize> {
        let Self {
            buffer,
            model,
            stats,
            ..
        } = self;
        let (states, actions) = buffer.to_dataset();
        model.full_fit(&states, &actions)?;
        stats.retrain_count += 1;
        Ok(states.len())
    }

    /// Mini-batch Q-learning replay.
    ///
    /// Each sampled transition is relabelled with the action maximizing the
    /// current scores after the taken action's entry is overwritten by its
    /// Q-target, then fitted one example at a time.
    fn replay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<usize> {
        let Self {
            buffer,
            model,
            state,
            config,
            stats,
            ..
        } = self;

        let batch = buffer.sample(config.batch_size, rng)?;
        for transition in &batch {
            let target = q_target(&*model, transition, state.gamma)?;
            let label = scores_or_prior(&*model, &transition.state)?
                .with_value(transition.action, target)
                .argmax();
            model.partial_update(&[(&transition.state, label)])?;
        }

        stats.replay_count += 1;
        Ok(batch.len())
    }

    /// Caller-driven exploration decay, run once per processed transition
    pub fn decay_epsilon(&mut self) -> f64 {
        self.state.decay_epsilon()
    }

    pub fn epsilon(&self) -> f64 {
        self.state.epsilon
    }

    pub fn state(&self) -> &LearnerState {
        &self.state
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn buffer(&self) -> &ExperienceBuffer {
        &self.buffer
    }

    pub fn phase(&self) -> LearnerPhase {
        self.phase
    }

    /// Consistent monitoring view
    pub fn snapshot(&self) -> LearnerSnapshot {
        LearnerSnapshot {
            epsilon: self.state.epsilon,
            epsilon_min: self.state.epsilon_min,
            buffer_len: self.buffer.len(),
            buffer_capacity: self.buffer.capacity(),
            drift_detected: self.drift_pending,
            drift_events: self.stats.drift_events,
            retrain_count: self.stats.retrain_count,
            replay_count: self.stats.replay_count,
            transitions_seen: self.stats.transitions_seen,
            recent_rewards: self.recent_rewards.iter().copied().collect(),
            phase: self.phase,
            model_accuracy: self.model_accuracy(),
        }
    }

    /// Fraction of buffered transitions whose taken action equals the
    /// model's current best action. `None` while untrained.
    pub fn model_accuracy(&self) -> Option<f64> {
        if !self.model.is_trained() {
            return None;
        }

        let (scored, hits) = self
            .buffer
            .iter()
            .filter_map(|t| self.model.best_action(&t.state).ok().map(|a| a == t.action))
            .fold((0usize, 0usize), |(n, hits), hit| (n + 1, hits + usize::from(hit)));

        (scored > 0).then(|| hits as f64 / scored as f64)
    }
}

/// Q-learning target: `reward` if terminal, else `reward + gamma * max(score(next_state))`
pub fn q_target<M: PolicyModel + ?Sized>(
    model: &M,
    transition: &Transition,
    gamma: f64,
) -> Result<f64> {
    if transition.terminal {
        return Ok(transition.reward);
    }
    let next = scores_or_prior(model, &transition.next_state)?;
    Ok(transition.reward + gamma * next.max())
}

/// Model scores, or a uniform prior while the model is still untrained
fn scores_or_prior<M: PolicyModel + ?Sized>(model: &M, state: &StateVector) -> Result<ActionScores> {
    match model.score(state) {
        Ok(scores) => Ok(scores),
        Err(AdaptError::UntrainedModel) => Ok(ActionScores::uniform()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::core::ActionId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> LearnerConfig {
        LearnerConfig {
            buffer_capacity: 500,
            state_dim: 3,
            ..Default::default()
        }
    }

    fn sv(values: [f64; 3]) -> StateVector {
        StateVector::new(values.to_vec(), 3).unwrap()
    }

    fn transition(reward: f64, action: ActionId) -> Transition {
        Transition::new(sv([0.1, 0.2, 0.3]), action, reward, sv([0.2, 0.1, 0.0]), false)
    }

    /// Detector that reports drift on a fixed schedule
    struct ScriptedDetector {
        drift_at: Vec<u64>,
        seen: u64,
        last: bool,
    }

    impl DriftDetector for ScriptedDetector {
        fn update(&mut self, _value: f64) -> bool {
            self.seen += 1;
            self.last = self.drift_at.contains(&self.seen);
            self.last
        }
        fn drift_detected(&self) -> bool {
            self.last
        }
        fn samples_seen(&self) -> u64 {
            self.seen
        }
    }

    fn scripted(drift_at: Vec<u64>) -> OnlineLearner<SgdPolicy, ScriptedDetector> {
        let config = config();
        let model = SgdPolicy::from_config(&config);
        let detector = ScriptedDetector {
            drift_at,
            seen: 0,
            last: false,
        };
        OnlineLearner::with_parts(config, model, detector).unwrap()
    }

    #[test]
    fn test_construction_enters_accumulating() {
        let learner = OnlineLearner::new(config()).unwrap();
        assert_eq!(learner.phase(), LearnerPhase::Accumulating);
        assert_eq!(learner.epsilon(), 1.0);
        assert!(!learner.model().is_trained());
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let bad = LearnerConfig {
            gamma: 2.0,
            ..config()
        };
        assert!(matches!(
            OnlineLearner::new(bad),
            Err(AdaptError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_transition_touches_nothing() {
        let mut learner = OnlineLearner::new(config()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let short = StateVector::new(vec![0.1, 0.2], 2).unwrap();
        let bad = Transition::new(short.clone(), ActionId::Buy, 1.0, short, false);

        assert!(matches!(
            learner.observe(bad, &mut rng),
            Err(AdaptError::InvalidStateVector(_))
        ));
        let snap = learner.snapshot();
        assert_eq!(snap.buffer_len, 0);
        assert_eq!(snap.transitions_seen, 0);
        assert!(snap.recent_rewards.is_empty());

        let nan_reward = Transition::new(sv([0.0; 3]), ActionId::Buy, f64::NAN, sv([0.0; 3]), false);
        assert!(learner.observe(nan_reward, &mut rng).is_err());
        assert_eq!(learner.buffer().len(), 0);
    }

    #[test]
    fn test_accumulates_until_replay_threshold() {
        let mut learner = scripted(vec![]);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..100 {
            let outcome = learner.observe(transition(0.5, ActionId::Buy), &mut rng).unwrap();
            assert_eq!(outcome, ObserveOutcome::Accumulated);
        }
        assert!(!learner.model().is_trained());

        let outcome = learner.observe(transition(0.5, ActionId::Buy), &mut rng).unwrap();
        assert_eq!(outcome, ObserveOutcome::Replayed { batch: 32 });
        assert!(learner.model().is_trained());
        assert_eq!(learner.phase(), LearnerPhase::Accumulating);
        assert_eq!(learner.snapshot().replay_count, 1);
    }

    #[test]
    fn test_replay_skipped_when_batch_exceeds_buffer() {
        let config = LearnerConfig {
            replay_trigger_threshold: 2,
            batch_size: 10,
            ..config()
        };
        let mut learner = OnlineLearner::with_parts(
            config.clone(),
            SgdPolicy::from_config(&config),
            ScriptedDetector {
                drift_at: vec![],
                seen: 0,
                last: false,
            },
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..2 {
            learner.observe(transition(0.5, ActionId::Buy), &mut rng).unwrap();
        }
        let outcome = learner.observe(transition(0.5, ActionId::Buy), &mut rng).unwrap();
        assert_eq!(
            outcome,
            ObserveOutcome::ReplaySkipped {
                requested: 10,
                available: 3
            }
        );
        assert!(!learner.model().is_trained());
    }

    #[test]
    fn test_drift_retrains_and_recovers_epsilon() {
        let mut learner = scripted(vec![5]);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..4 {
            learner.observe(transition(0.1, ActionId::Sell), &mut rng).unwrap();
        }
        let before = learner.epsilon();
        let outcome = learner.observe(transition(5.0, ActionId::Sell), &mut rng).unwrap();

        assert_eq!(outcome, ObserveOutcome::Retrained { samples: 5 });
        assert_eq!(learner.epsilon(), (before * 0.9).max(0.01));
        assert!(learner.model().is_trained());
        assert_eq!(
            learner.model().best_action(&sv([0.1, 0.2, 0.3])).unwrap(),
            ActionId::Sell
        );

        let snap = learner.snapshot();
        assert_eq!(snap.drift_events, 1);
        assert_eq!(snap.retrain_count, 1);
        // Consumed by the retrain
        assert!(!snap.drift_detected);
        assert_eq!(snap.phase, LearnerPhase::Accumulating);
    }

    #[test]
    fn test_model_accuracy_tracks_buffered_actions() {
        let mut learner = scripted(vec![5]);
        let mut rng = StdRng::seed_from_u64(8);

        learner.observe(transition(0.1, ActionId::Sell), &mut rng).unwrap();
        assert_eq!(learner.model_accuracy(), None);
        assert_eq!(learner.snapshot().model_accuracy, None);

        for _ in 0..4 {
            learner.observe(transition(0.1, ActionId::Sell), &mut rng).unwrap();
        }
        assert_eq!(learner.model_accuracy(), Some(1.0));

        // Same state, different action: one miss out of six
        learner.observe(transition(0.1, ActionId::Buy), &mut rng).unwrap();
        let accuracy = learner.snapshot().model_accuracy.unwrap();
        assert!((accuracy - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_drift_recovery_clamps_to_floor() {
        let mut state = LearnerState {
            epsilon: 0.011,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            gamma: 0.95,
        };
        assert_eq!(state.apply_drift_recovery(0.9), 0.01);

        state.epsilon = 0.5;
        assert_eq!(state.apply_drift_recovery(0.9), 0.5 * 0.9);
    }

    #[test]
    fn test_epsilon_decay_is_monotonic_and_floored() {
        let mut state = LearnerState::from_config(&config());
        let mut previous = state.epsilon;
        for _ in 0..5_000 {
            let eps = state.decay_epsilon();
            assert!(eps <= previous);
            assert!(eps >= state.epsilon_min);
            previous = eps;
        }
        assert_eq!(previous, state.epsilon_min);
    }

    #[test]
    fn test_terminal_target_is_reward() {
        let mut model = SgdPolicy::new(3, 0.1, 0.0, 1);
        let s = sv([1.0, 0.0, 0.0]);
        model.partial_update(&[(&s, ActionId::Buy)]).unwrap();

        let t = Transition::new(s.clone(), ActionId::Buy, 2.5, sv([9.0, 9.0, 9.0]), true);
        for gamma in [0.0, 0.5, 1.0] {
            assert_eq!(q_target(&model, &t, gamma).unwrap(), 2.5);
        }
    }

    #[test]
    fn test_non_terminal_target_bootstraps() {
        let model = SgdPolicy::new(3, 0.1, 0.0, 1);
        let t = transition(1.0, ActionId::Hold);

        // Untrained model: uniform prior of 1/3 per action.
        let target = q_target(&model, &t, 0.9).unwrap();
        assert!((target - (1.0 + 0.9 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_recent_rewards_are_bounded() {
        let mut learner = OnlineLearner::new(LearnerConfig {
            replay_trigger_threshold: usize::MAX,
            ..config()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for i in 0..250 {
            learner
                .observe(transition(0.001 * (i % 3) as f64, ActionId::Hold), &mut rng)
                .unwrap();
        }
        let snap = learner.snapshot();
        assert_eq!(snap.recent_rewards.len(), RECENT_REWARDS_LEN);
        assert_eq!(snap.transitions_seen, 250);
        assert_eq!(snap.buffer_len, 250);
    }
}
