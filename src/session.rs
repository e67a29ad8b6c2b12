//! Trading Session
//!
//! Drives one trade cycle at a time: features in, action out, contract
//! executed and settled, reward fed back to the learner. The learner sits
//! behind a single async mutex so a retrain never overlaps another update and
//! monitoring snapshots always see a consistent state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{AdaptError, Result};
use crate::monitor::{LearningMonitor, LearningReport};
use crate::risk::RiskGate;
use crate::rl::core::{ActionId, RewardFunction, RiskNormalizedReward, StateVector, TradeResult};
use crate::rl::learner::{ObserveOutcome, OnlineLearner};
use crate::rl::memory::Transition;
use crate::rl::policy::{DecisionPolicy, MarketContext, PositionSizer, TradeIntent};
use crate::rl::signal::SignalSource;
use crate::rl::training::checkpointing::{timestamped_name, Checkpointer, SessionSnapshot};

/// Progress report cadence in cycles
const REPORT_EVERY_CYCLES: u64 = 100;

/// Latest market view from the feature pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct MarketObservation {
    pub state: StateVector,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Settlement of an executed intent
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub intent_id: Uuid,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    /// Realized profit and loss in account currency
    pub pnl: Decimal,
    pub result: TradeResult,
}

/// Feature pipeline producing state vectors
#[async_trait]
pub trait FeatureSource: Send {
    async fn observe(&mut self) -> Result<MarketObservation>;
}

/// Places a contract and waits for its settlement
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn execute(&self, intent: &TradeIntent) -> Result<ExecutionReport>;
}

/// What a single cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No contract placed
    Held { action: ActionId },
    /// Intent refused by the risk gate
    Rejected { reason: String },
    /// Contract settled and learned from
    Traded {
        intent_id: Uuid,
        reward: f64,
        outcome: ObserveOutcome,
    },
}

/// Session counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub cycles: u64,
    pub trades: u64,
    pub holds: u64,
    pub rejected: u64,
    pub errors: u64,
    pub wins: u64,
    /// Trades opened by a rule signal rather than the policy
    #[serde(default)]
    pub signal_trades: u64,
    pub realized_pnl: Decimal,
}

/// Online trading session
pub struct TradingSession {
    learner: Arc<Mutex<OnlineLearner>>,
    feed: Box<dyn FeatureSource>,
    executor: Box<dyn OrderExecutor>,
    risk: Box<dyn RiskGate>,
    sizer: Box<dyn PositionSizer>,
    reward_fn: Box<dyn RewardFunction>,
    policy: DecisionPolicy,
    signals: Option<Box<dyn SignalSource>>,
    monitor: LearningMonitor,
    config: SessionConfig,
    checkpointer: Option<Checkpointer>,
    rng: StdRng,
    /// Observation read after the last settlement, reused as the next state
    pending: Option<MarketObservation>,
    stats: SessionStats,
}

impl TradingSession {
    pub fn new(
        learner: OnlineLearner,
        feed: Box<dyn FeatureSource>,
        executor: Box<dyn OrderExecutor>,
        risk: Box<dyn RiskGate>,
        sizer: Box<dyn PositionSizer>,
        config: SessionConfig,
        rng: StdRng,
    ) -> Self {
        let checkpointer = (config.max_checkpoints > 0).then(|| {
            let dir = config
                .snapshot_path
                .parent()
                .map(|p| p.join("history"))
                .unwrap_or_else(|| PathBuf::from("history"));
            Checkpointer::new(dir, config.max_checkpoints)
        });

        Self {
            learner: Arc::new(Mutex::new(learner)),
            feed,
            executor,
            risk,
            sizer,
            reward_fn: Box::new(RiskNormalizedReward::new()),
            policy: DecisionPolicy::new(config.contract_duration_secs),
            signals: None,
            monitor: LearningMonitor::default(),
            config,
            checkpointer,
            rng,
            pending: None,
            stats: SessionStats::default(),
        }
    }

    pub fn with_reward_fn(mut self, reward_fn: Box<dyn RewardFunction>) -> Self {
        self.reward_fn = reward_fn;
        self
    }

    /// Trade rule signals ahead of the learned policy
    pub fn with_signal_source(mut self, signals: Box<dyn SignalSource>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Shared handle for monitoring
    pub fn learner(&self) -> Arc<Mutex<OnlineLearner>> {
        Arc::clone(&self.learner)
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn monitor(&self) -> &LearningMonitor {
        &self.monitor
    }

    /// Run one trade cycle
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let observation = match self.pending.take() {
            Some(observation) => observation,
            None => self.feed.observe().await?,
        };

        let context = MarketContext {
            symbol: self.config.symbol.clone(),
            price: observation.price,
            balance: self.risk.balance(),
            timestamp: observation.timestamp,
        };

        let rule_intent = match self.signals.as_mut() {
            Some(signals) => {
                signals.update(observation.price);
                signals.signal(&context)
            }
            None => None,
        };
        let from_rule = rule_intent.is_some();

        let (action, intent) = match rule_intent {
            Some(intent) => {
                debug!(direction = %intent.direction, "Rule signal fired");
                (intent.action, Some(intent))
            }
            None => {
                let (action, confidence) = {
                    let learner = self.learner.lock().await;
                    let action = self.policy.select_action(
                        &observation.state,
                        learner.epsilon(),
                        learner.model(),
                        &mut self.rng,
                    );
                    let confidence = self
                        .policy
                        .confidence(&observation.state, action, learner.model());
                    (action, confidence)
                };
                let intent = self.policy.to_trade_intent(
                    action,
                    &context,
                    confidence,
                    self.sizer.as_ref(),
                );
                (action, intent)
            }
        };

        let Some(intent) = intent else {
            debug!(%action, "No trade this cycle");
            return Ok(CycleOutcome::Held { action });
        };

        if let Err(e) = self.risk.validate(&intent) {
            return match e {
                AdaptError::RiskRejected(reason) => Ok(CycleOutcome::Rejected { reason }),
                other => Err(other),
            };
        }

        self.risk.record_open(&intent);
        let report = match self.executor.execute(&intent).await {
            Ok(report) => report,
            Err(e) => {
                self.risk.record_close(Decimal::ZERO);
                return Err(e);
            }
        };
        self.risk.record_close(report.pnl);
        self.stats.realized_pnl += report.pnl;
        if report.result.success {
            self.stats.wins += 1;
        }
        if from_rule {
            self.stats.signal_trades += 1;
        }

        let reward = self.reward_fn.compute(&report.result);
        info!(
            intent_id = %intent.intent_id,
            direction = %intent.direction,
            stake = %intent.stake,
            pnl = %report.pnl,
            reward,
            "Contract settled"
        );

        let next = self.feed.observe().await?;
        let transition = Transition::new(
            observation.state,
            action,
            reward,
            next.state.clone(),
            false,
        );
        self.pending = Some(next);

        let outcome = self.learn(transition).await?;

        Ok(CycleOutcome::Traded {
            intent_id: intent.intent_id,
            reward,
            outcome,
        })
    }

    /// Observe on a blocking worker holding the learner lock, then decay epsilon
    async fn learn(&mut self, transition: Transition) -> Result<ObserveOutcome> {
        let mut learner = Arc::clone(&self.learner).lock_owned().await;
        let mut rng = StdRng::seed_from_u64(self.rng.gen());

        tokio::task::spawn_blocking(move || {
            let outcome = learner.observe(transition, &mut rng)?;
            learner.decay_epsilon();
            Ok::<_, AdaptError>(outcome)
        })
        .await
        .map_err(|e| AdaptError::Internal(format!("learner task failed: {}", e)))?
    }

    /// Run until `max_cycles` (if any) or a shutdown signal, then save a snapshot
    pub async fn run(
        &mut self,
        max_cycles: Option<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SessionStats> {
        info!(
            symbol = %self.config.symbol,
            max_cycles = ?max_cycles,
            "Trading session started"
        );

        let period = Duration::from_millis(self.config.cycle_interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut listening = true;

        loop {
            if max_cycles.is_some_and(|max| self.stats.cycles >= max) || *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed(), if listening => {
                    if changed.is_err() {
                        // Sender gone, only the cycle budget can stop us now.
                        listening = false;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            self.stats.cycles += 1;
            match self.run_cycle().await {
                Ok(CycleOutcome::Held { .. }) => self.stats.holds += 1,
                Ok(CycleOutcome::Rejected { reason }) => {
                    self.stats.rejected += 1;
                    debug!("Cycle rejected: {}", reason);
                }
                Ok(CycleOutcome::Traded { .. }) => self.stats.trades += 1,
                Err(e) => {
                    self.stats.errors += 1;
                    if e.is_recoverable() {
                        warn!(cycle = self.stats.cycles, "Cycle skipped: {}", e);
                    } else {
                        error!(cycle = self.stats.cycles, "Cycle failed: {}", e);
                    }
                }
            }

            if self.stats.cycles % REPORT_EVERY_CYCLES == 0 {
                self.report().await;
            }
        }

        self.report().await;
        self.save_snapshot().await?;

        info!(
            cycles = self.stats.cycles,
            trades = self.stats.trades,
            errors = self.stats.errors,
            pnl = %self.stats.realized_pnl,
            "Trading session stopped"
        );
        Ok(self.stats.clone())
    }

    /// Record a monitoring report from a consistent learner snapshot
    pub async fn report(&mut self) -> LearningReport {
        let snapshot = self.learner.lock().await.snapshot();
        self.monitor.record(&snapshot)
    }

    /// Persist the learner to `snapshot_path`, plus a rotated timestamped copy
    pub async fn save_snapshot(&self) -> Result<PathBuf> {
        let snapshot = {
            let learner = self.learner.lock().await;
            SessionSnapshot::capture(&learner, self.config.persist_experience)
        };

        snapshot.save_to(&self.config.snapshot_path)?;
        info!("Saved session snapshot to {:?}", self.config.snapshot_path);

        if let Some(checkpointer) = &self.checkpointer {
            if let Err(e) = checkpointer.save(&snapshot, &timestamped_name("session")) {
                warn!("Failed to write checkpoint copy: {}", e);
            }
        }

        Ok(self.config.snapshot_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::risk::PreTradeRiskManager;
    use crate::rl::config::LearnerConfig;
    use crate::rl::policy::{Direction, FixedFractionSizer};
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;

    /// Replays a fixed list of observations, then fails
    struct ScriptedFeed {
        states: VecDeque<Vec<f64>>,
    }

    #[async_trait]
    impl FeatureSource for ScriptedFeed {
        async fn observe(&mut self) -> Result<MarketObservation> {
            let values = self
                .states
                .pop_front()
                .ok_or_else(|| AdaptError::MarketDataUnavailable("script exhausted".into()))?;
            Ok(MarketObservation {
                state: StateVector::new(values, 2)?,
                price: dec!(100),
                timestamp: Utc::now(),
            })
        }
    }

    /// Wins every Call, loses every Put
    struct CallWins;

    #[async_trait]
    impl OrderExecutor for CallWins {
        async fn execute(&self, intent: &TradeIntent) -> Result<ExecutionReport> {
            let win = intent.direction == Direction::Call;
            let pnl = if win { intent.stake } else { -intent.stake };
            Ok(ExecutionReport {
                intent_id: intent.intent_id,
                entry_price: intent.entry_price,
                exit_price: intent.entry_price,
                pnl,
                result: TradeResult {
                    profit: if win { 1.0 } else { -1.0 },
                    risk: 1.0,
                    duration_seconds: 1.0,
                    success: win,
                },
            })
        }
    }

    /// Constant reward keeps the drift detector quiet
    struct FlatReward;

    impl RewardFunction for FlatReward {
        fn compute(&self, _result: &TradeResult) -> f64 {
            0.5
        }
    }

    fn session(name: &str, states: Vec<Vec<f64>>, epsilon_start: f64) -> TradingSession {
        let learner = OnlineLearner::new(LearnerConfig {
            state_dim: 2,
            epsilon_start,
            replay_trigger_threshold: 4,
            batch_size: 2,
            ..Default::default()
        })
        .unwrap();

        let snapshot_path = std::env::temp_dir()
            .join(format!("adaptrade_session_{}_{}", name, std::process::id()))
            .join("session.json");

        TradingSession::new(
            learner,
            Box::new(ScriptedFeed {
                states: states.into(),
            }),
            Box::new(CallWins),
            Box::new(PreTradeRiskManager::new(RiskConfig::default())),
            Box::new(FixedFractionSizer::new(dec!(0.02), dec!(0.35))),
            SessionConfig {
                snapshot_path,
                max_checkpoints: 0,
                cycle_interval_ms: 1,
                ..Default::default()
            },
            StdRng::seed_from_u64(17),
        )
    }

    #[tokio::test]
    async fn test_untrained_greedy_session_holds() {
        let mut session = session("hold", vec![vec![0.1, 0.2]], 0.0);

        let outcome = session.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Held {
                action: ActionId::Hold
            }
        );

        let learner = session.learner();
        let learner = learner.lock().await;
        assert_eq!(learner.buffer().len(), 0);
        assert_eq!(learner.epsilon(), 0.0);
    }

    #[tokio::test]
    async fn test_traded_cycle_feeds_learner_and_decays_epsilon() {
        let states = (0..40).map(|i| vec![i as f64 / 40.0, 0.5]).collect();
        let mut session = session("decay", states, 1.0).with_reward_fn(Box::new(FlatReward));

        let mut traded = 0;
        for _ in 0..15 {
            if let Ok(CycleOutcome::Traded { .. }) = session.run_cycle().await {
                traded += 1;
            }
        }
        assert!(traded > 0);

        let learner = session.learner();
        let learner = learner.lock().await;
        assert_eq!(learner.buffer().len(), traded);
        let expected = (0..traded).fold(1.0_f64, |eps, _| (eps * 0.995).max(0.01));
        assert!((learner.epsilon() - expected).abs() < 1e-12);
    }

    /// Fires a PUT once it has seen two prices
    struct PutAfterTwo {
        seen: usize,
    }

    impl SignalSource for PutAfterTwo {
        fn update(&mut self, _price: Decimal) {
            self.seen += 1;
        }

        fn signal(&self, context: &MarketContext) -> Option<TradeIntent> {
            (self.seen >= 2).then(|| TradeIntent {
                intent_id: Uuid::new_v4(),
                symbol: context.symbol.clone(),
                action: ActionId::Sell,
                direction: Direction::Put,
                stake: dec!(1),
                entry_price: context.price,
                duration_secs: 300,
                confidence: 1.0,
                created_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn test_rule_signal_overrides_holding_policy() {
        let states = (0..10).map(|i| vec![i as f64 / 10.0, 0.5]).collect();
        let mut session = session("rules", states, 0.0)
            .with_reward_fn(Box::new(FlatReward))
            .with_signal_source(Box::new(PutAfterTwo { seen: 0 }));

        // Untrained greedy policy holds until the rule fires
        assert_eq!(
            session.run_cycle().await.unwrap(),
            CycleOutcome::Held {
                action: ActionId::Hold
            }
        );
        for _ in 0..3 {
            let outcome = session.run_cycle().await.unwrap();
            assert!(matches!(outcome, CycleOutcome::Traded { .. }));
        }

        assert_eq!(session.stats().signal_trades, 3);
        assert_eq!(session.stats().wins, 0);
        assert_eq!(session.stats().realized_pnl, dec!(-3));

        let learner = session.learner();
        let learner = learner.lock().await;
        assert_eq!(learner.buffer().len(), 3);
        assert!(learner.buffer().iter().all(|t| t.action == ActionId::Sell));
    }

    #[tokio::test]
    async fn test_feed_failure_is_a_cycle_error() {
        let mut session = session("dry", vec![], 1.0);
        let err = session.run_cycle().await.unwrap_err();
        assert!(matches!(err, AdaptError::MarketDataUnavailable(_)));
    }

    #[tokio::test]
    async fn test_run_stops_on_budget_and_saves_snapshot() {
        let states = (0..10).map(|i| vec![i as f64 / 10.0, 0.0]).collect();
        let mut session = session("budget", states, 1.0);
        let (_tx, rx) = watch::channel(false);

        // The script runs dry partway, later cycles fail and the loop keeps going.
        let stats = session.run(Some(20), rx).await.unwrap();
        assert_eq!(stats.cycles, 20);
        assert!(stats.errors > 0);
        assert_eq!(stats.cycles, stats.trades + stats.holds + stats.rejected + stats.errors);

        let path = session.save_snapshot().await.unwrap();
        assert!(SessionSnapshot::load_from(&path).is_ok());
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_run() {
        let states = (0..1000).map(|i| vec![(i % 10) as f64, 1.0]).collect();
        let mut session = session("shutdown", states, 1.0);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let stats = session.run(None, rx).await.unwrap();
        assert_eq!(stats.cycles, 0);

        let _ = std::fs::remove_dir_all(
            std::env::temp_dir().join(format!("adaptrade_session_shutdown_{}", std::process::id())),
        );
    }
}
