use adaptrade::rl::core::ActionScores;
use adaptrade::rl::drift::{Adwin, DriftDetector};
use adaptrade::rl::learner::{q_target, ObserveOutcome};
use adaptrade::rl::training::{resume_or_fresh, SessionSnapshot};
use adaptrade::rl::{
    ActionId, DecisionPolicy, ExperienceBuffer, LearnerConfig, OnlineLearner, PolicyModel,
    SgdPolicy, StateVector, Transition,
};
use adaptrade::AdaptError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

fn sv(values: &[f64]) -> StateVector {
    StateVector::new(values.to_vec(), values.len()).unwrap()
}

fn transition(reward: f64) -> Transition {
    Transition::new(sv(&[0.0, 1.0]), ActionId::Buy, reward, sv(&[1.0, 0.0]), false)
}

fn small_config() -> LearnerConfig {
    LearnerConfig {
        state_dim: 2,
        buffer_capacity: 1_000,
        ..Default::default()
    }
}

#[test]
fn capacity_three_buffer_keeps_last_three_in_order() {
    let mut buffer = ExperienceBuffer::new(3);
    for reward in [1.0, 2.0, 3.0, 4.0] {
        buffer.push(transition(reward));
    }

    let rewards: Vec<f64> = buffer.iter().map(|t| t.reward).collect();
    assert_eq!(rewards, vec![2.0, 3.0, 4.0]);
    assert_eq!(buffer.len(), 3);
    assert!(buffer.is_full());
}

#[test]
fn fifo_holds_for_any_overflow() {
    for capacity in [1usize, 2, 7, 50] {
        for extra in [0usize, 1, 13] {
            let mut buffer = ExperienceBuffer::new(capacity);
            let total = capacity + extra;
            for i in 0..total {
                buffer.push(transition(i as f64));
            }
            let rewards: Vec<f64> = buffer.iter().map(|t| t.reward).collect();
            let expected: Vec<f64> = (extra..total).map(|i| i as f64).collect();
            assert_eq!(rewards, expected);
            assert_eq!(buffer.len(), capacity);
        }
    }
}

#[test]
fn sampling_never_repeats_and_never_overdraws() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut buffer = ExperienceBuffer::new(40);
    for i in 0..25 {
        buffer.push(transition(i as f64));
    }

    for batch in 0..=25 {
        let sample = buffer.sample(batch, &mut rng).unwrap();
        assert_eq!(sample.len(), batch);
        let distinct: HashSet<u64> = sample.iter().map(|t| t.reward.to_bits()).collect();
        assert_eq!(distinct.len(), batch);
    }

    for batch in [26, 40, 1_000] {
        assert!(matches!(
            buffer.sample(batch, &mut rng),
            Err(AdaptError::InsufficientData {
                requested,
                available: 25,
            }) if requested == batch
        ));
    }
}

#[test]
fn adwin_flags_shift_only_after_it_happens() {
    let mut detector = Adwin::new(0.002);

    for i in 0..50 {
        assert!(!detector.update(0.1), "false positive at {}", i);
    }

    let detected = (0..50).any(|_| detector.update(5.0));
    assert!(detected);
}

#[test]
fn reward_regime_shift_retrains_and_recovers_epsilon() {
    let mut learner = OnlineLearner::new(small_config()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..50 {
        let outcome = learner.observe(transition(0.1), &mut rng).unwrap();
        assert_eq!(outcome, ObserveOutcome::Accumulated);
        learner.decay_epsilon();
    }

    let mut retrained = false;
    for _ in 0..50 {
        let before = learner.epsilon();
        let outcome = learner.observe(transition(5.0), &mut rng).unwrap();
        if let ObserveOutcome::Retrained { samples } = outcome {
            assert_eq!(samples, learner.buffer().len());
            assert_eq!(learner.epsilon(), (before * 0.9).max(0.01));
            retrained = true;
            break;
        }
        learner.decay_epsilon();
    }

    assert!(retrained, "regime shift never triggered a retrain");
    assert!(learner.model().is_trained());
    let snapshot = learner.snapshot();
    assert_eq!(snapshot.retrain_count, 1);
    assert!(!snapshot.drift_detected);
}

#[test]
fn epsilon_decay_converges_to_floor() {
    let mut learner = OnlineLearner::new(small_config()).unwrap();
    let mut previous = learner.epsilon();
    for _ in 0..2_000 {
        let next = learner.decay_epsilon();
        assert!(next <= previous);
        assert!(next >= 0.01);
        previous = next;
    }
    assert_eq!(previous, 0.01);
}

#[test]
fn terminal_target_ignores_future() {
    let mut model = SgdPolicy::new(2, 0.1, 0.0, 1);
    model
        .partial_update(&[(&sv(&[1.0, 1.0]), ActionId::Sell)])
        .unwrap();

    let terminal = Transition::new(sv(&[0.0, 1.0]), ActionId::Buy, -3.25, sv(&[50.0, -50.0]), true);
    for gamma in [0.0, 0.3, 0.95, 1.0] {
        assert_eq!(q_target(&model, &terminal, gamma).unwrap(), -3.25);
    }
}

#[test]
fn ties_break_to_lowest_action() {
    assert_eq!(ActionScores::new([0.2, 0.4, 0.4]).argmax(), ActionId::Buy);
    assert_eq!(ActionScores::uniform().argmax(), ActionId::Hold);
}

#[test]
fn untrained_model_holds_under_greedy_policy() {
    let learner = OnlineLearner::new(small_config()).unwrap();
    let policy = DecisionPolicy::new(300);
    let mut rng = StdRng::seed_from_u64(1);

    for _ in 0..20 {
        let state = sv(&[rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)]);
        assert_eq!(
            policy.select_action(&state, 0.0, learner.model(), &mut rng),
            ActionId::Hold
        );
    }
}

#[test]
fn invalid_states_never_reach_the_buffer() {
    let mut learner = OnlineLearner::new(small_config()).unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    assert!(StateVector::new(vec![f64::NAN, 0.0], 2).is_err());
    assert!(StateVector::new(vec![], 0).is_err());

    let wrong_dim = Transition::new(sv(&[1.0, 2.0, 3.0]), ActionId::Sell, 1.0, sv(&[1.0, 2.0, 3.0]), false);
    let err = learner.observe(wrong_dim, &mut rng).unwrap_err();
    assert!(matches!(err, AdaptError::InvalidStateVector(_)));
    assert!(err.is_recoverable());
    assert_eq!(learner.buffer().len(), 0);
}

#[test]
fn resumed_session_scores_identically() {
    let dir = std::env::temp_dir().join(format!("adaptrade_resume_it_{}", std::process::id()));
    let path = dir.join("session.json");
    let config = LearnerConfig {
        replay_trigger_threshold: 20,
        batch_size: 8,
        ..small_config()
    };

    let mut learner = OnlineLearner::new(config.clone()).unwrap();
    let mut rng = StdRng::seed_from_u64(99);
    for i in 0..60 {
        let x = (i % 10) as f64 / 10.0;
        let action = if x > 0.5 { ActionId::Buy } else { ActionId::Sell };
        let t = Transition::new(sv(&[x, 1.0 - x]), action, 0.2, sv(&[1.0 - x, x]), false);
        learner.observe(t, &mut rng).unwrap();
        learner.decay_epsilon();
    }
    assert!(learner.model().is_trained());

    SessionSnapshot::capture(&learner, true).save_to(&path).unwrap();
    let resumed = resume_or_fresh(config, &path, true, false).unwrap();

    assert_eq!(resumed.epsilon(), learner.epsilon());
    assert_eq!(resumed.buffer().len(), learner.buffer().len());
    for i in 0..=20 {
        let x = i as f64 / 20.0;
        let state = sv(&[x, x * x]);
        assert_eq!(
            resumed.model().best_action(&state).unwrap(),
            learner.model().best_action(&state).unwrap()
        );
        assert_eq!(
            resumed.model().score(&state).unwrap(),
            learner.model().score(&state).unwrap()
        );
    }

    let _ = std::fs::remove_dir_all(&dir);
}
