//! Paper Trading
//!
//! Seeded price simulation shared by a feature feed and an executor that
//! settles binary contracts against the simulated path. Lets the session run
//! end to end without a broker.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{AdaptError, Result};
use crate::rl::core::{StateVector, TradeResult};
use crate::rl::policy::{Direction, TradeIntent};
use crate::session::{ExecutionReport, FeatureSource, MarketObservation, OrderExecutor};

/// Number of features emitted per observation
pub const FEATURE_DIM: usize = 5;

/// Price history kept for feature computation
const HISTORY_LEN: usize = 64;
const RSI_PERIOD: usize = 14;
const VOLATILITY_WINDOW: usize = 20;
const RETURN_LAG: usize = 5;
const FAST_MA: usize = 5;
const SLOW_MA: usize = 20;

/// Random walk configuration
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Starting price
    pub initial_price: f64,
    /// Std dev of per-tick log returns
    pub volatility: f64,
    /// Mean per-tick log return
    pub drift: f64,
    /// RNG seed
    pub seed: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            initial_price: 1000.0,
            volatility: 0.002,
            drift: 0.0,
            seed: 42,
        }
    }
}

/// Seeded geometric random walk
#[derive(Debug)]
pub struct PriceWalk {
    config: WalkConfig,
    price: f64,
    history: VecDeque<f64>,
    rng: StdRng,
    step: u64,
    /// Smoothed absolute return, used as an activity proxy
    activity: f64,
}

impl PriceWalk {
    pub fn new(config: WalkConfig) -> Self {
        let price = config.initial_price.max(f64::MIN_POSITIVE);
        let mut history = VecDeque::with_capacity(HISTORY_LEN);
        history.push_back(price);

        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            price,
            history,
            step: 0,
            activity: 0.0,
        }
    }

    /// Standard normal sample (Box-Muller transform)
    fn sample_normal(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(0.0001..1.0);
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Advance one tick
    pub fn step(&mut self) -> f64 {
        self.step += 1;
        let log_return = self.config.drift + self.config.volatility * self.sample_normal();
        self.price *= log_return.exp();

        self.activity = 0.9 * self.activity + 0.1 * log_return.abs();

        self.history.push_back(self.price);
        if self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
        self.price
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    /// Change the regime's mean return
    pub fn set_drift(&mut self, drift: f64) {
        self.config.drift = drift;
    }

    fn recent(&self, n: usize) -> impl Iterator<Item = &f64> {
        self.history.iter().skip(self.history.len().saturating_sub(n))
    }

    fn mean(&self, n: usize) -> f64 {
        let (sum, count) = self.recent(n).fold((0.0, 0usize), |(s, c), p| (s + p, c + 1));
        if count == 0 {
            self.price
        } else {
            sum / count as f64
        }
    }

    /// RSI scaled to 0..=1, 0.5 while there is no history
    fn rsi(&self) -> f64 {
        let prices: Vec<f64> = self.recent(RSI_PERIOD + 1).copied().collect();
        let (mut gains, mut losses) = (0.0, 0.0);
        for pair in prices.windows(2) {
            let change = pair[1] - pair[0];
            if change > 0.0 {
                gains += change;
            } else {
                losses -= change;
            }
        }
        if gains + losses == 0.0 {
            0.5
        } else {
            gains / (gains + losses)
        }
    }

    fn relative_volatility(&self) -> f64 {
        let prices: Vec<f64> = self.recent(VOLATILITY_WINDOW + 1).copied().collect();
        let returns: Vec<f64> = prices.windows(2).map(|p| (p[1] / p[0]).ln()).collect();
        if returns.len() < 2 || self.config.volatility <= 0.0 {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        (var.sqrt() / (2.0 * self.config.volatility)).min(1.0)
    }

    fn lagged_return(&self) -> f64 {
        let len = self.history.len();
        if len <= RETURN_LAG {
            return 0.0;
        }
        let past = self.history[len - 1 - RETURN_LAG];
        let scale = self.config.volatility.max(1e-9) * (RETURN_LAG as f64).sqrt() * 3.0;
        ((self.price / past).ln() / scale).clamp(-1.0, 1.0)
    }

    fn trend_strength(&self) -> f64 {
        let slow = self.mean(SLOW_MA);
        if slow <= 0.0 {
            return 0.0;
        }
        let scale = self.config.volatility.max(1e-9) * 5.0;
        (((self.mean(FAST_MA) - slow) / slow) / scale).clamp(-1.0, 1.0)
    }

    /// Normalized feature vector:
    /// RSI oscillator, relative volatility, activity, 5-tick return, trend strength
    pub fn features(&self) -> Vec<f64> {
        let activity_scale = self.config.volatility.max(1e-9) * 2.0;
        vec![
            self.rsi(),
            self.relative_volatility(),
            (self.activity / activity_scale).min(1.0),
            self.lagged_return(),
            self.trend_strength(),
        ]
    }
}

fn to_decimal(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(6))
        .ok_or_else(|| AdaptError::Internal(format!("price {} not representable", value)))
}

/// Shared simulated market handing out a feed and an executor
#[derive(Debug, Clone)]
pub struct PaperMarket {
    walk: Arc<Mutex<PriceWalk>>,
}

impl PaperMarket {
    pub fn new(config: WalkConfig) -> Self {
        Self {
            walk: Arc::new(Mutex::new(PriceWalk::new(config))),
        }
    }

    pub fn feed(&self) -> SimulatedFeed {
        SimulatedFeed {
            walk: Arc::clone(&self.walk),
        }
    }

    pub fn executor(&self, tick_seconds: u64, payout_ratio: Decimal) -> PaperExecutor {
        PaperExecutor {
            walk: Arc::clone(&self.walk),
            tick_seconds: tick_seconds.max(1),
            payout_ratio,
        }
    }

    pub fn walk(&self) -> Arc<Mutex<PriceWalk>> {
        Arc::clone(&self.walk)
    }
}

/// Feature source over the simulated walk, one tick per observation
#[derive(Debug, Clone)]
pub struct SimulatedFeed {
    walk: Arc<Mutex<PriceWalk>>,
}

#[async_trait]
impl FeatureSource for SimulatedFeed {
    async fn observe(&mut self) -> Result<MarketObservation> {
        let mut walk = self.walk.lock().await;
        let price = walk.step();
        let state = StateVector::new(walk.features(), FEATURE_DIM)?;

        Ok(MarketObservation {
            state,
            price: to_decimal(price)?,
            timestamp: Utc::now(),
        })
    }
}

/// Settles binary contracts against the simulated path
#[derive(Debug, Clone)]
pub struct PaperExecutor {
    walk: Arc<Mutex<PriceWalk>>,
    /// Simulated seconds per tick
    tick_seconds: u64,
    /// Profit per unit staked on a winning contract
    payout_ratio: Decimal,
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn execute(&self, intent: &TradeIntent) -> Result<ExecutionReport> {
        if intent.stake <= Decimal::ZERO {
            return Err(AdaptError::Execution(format!(
                "non-positive stake {}",
                intent.stake
            )));
        }

        let (entry, exit) = {
            let mut walk = self.walk.lock().await;
            let entry = walk.price();
            let ticks = (intent.duration_secs / self.tick_seconds).max(1);
            for _ in 0..ticks {
                walk.step();
            }
            (entry, walk.price())
        };

        let success = match intent.direction {
            Direction::Call => exit > entry,
            Direction::Put => exit < entry,
        };
        let pnl = if success {
            (intent.stake * self.payout_ratio).round_dp(2)
        } else {
            -intent.stake
        };

        debug!(
            intent_id = %intent.intent_id,
            entry,
            exit,
            success,
            %pnl,
            "Paper contract settled"
        );

        Ok(ExecutionReport {
            intent_id: intent.intent_id,
            entry_price: to_decimal(entry)?,
            exit_price: to_decimal(exit)?,
            pnl,
            result: TradeResult {
                profit: to_f64(pnl),
                risk: to_f64(intent.stake),
                duration_seconds: intent.duration_secs as f64,
                success,
            },
        })
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
