//! Rule-Based Signals
//!
//! Technical-analysis signal generators that run alongside the learned
//! policy. When a rule fires, its intent is traded in place of the policy's
//! action and the outcome is still fed back to the learner.

use chrono::Utc;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

use crate::config::SignalConfig;
use crate::rl::core::ActionId;
use crate::rl::policy::{Direction, MarketContext, TradeIntent};

/// Source of rule-based trade intents
pub trait SignalSource: Send {
    /// Feed the latest traded price
    fn update(&mut self, price: Decimal);

    /// Intent for the current market, if the rule fires
    fn signal(&self, context: &MarketContext) -> Option<TradeIntent>;
}

/// Bollinger-band mean reversion.
///
/// Buys a CALL when the price closes below `mean - k * std` of the lookback
/// window and a PUT when it closes above `mean + k * std`. The stake shrinks
/// as the average true range grows relative to the price.
#[derive(Debug, Clone)]
pub struct BollingerSignal {
    config: SignalConfig,
    prices: VecDeque<f64>,
    capacity: usize,
}

impl BollingerSignal {
    pub fn new(config: SignalConfig) -> Self {
        let capacity = config.lookback.max(config.atr_window + 1).max(2);
        Self {
            config,
            prices: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// `(mean, sample std)` of the last `lookback` prices
    pub fn bands(&self) -> Option<(f64, f64)> {
        let n = self.config.lookback;
        if n < 2 || self.prices.len() < n {
            return None;
        }

        let window = self.prices.iter().skip(self.prices.len() - n);
        let mean = window.clone().sum::<f64>() / n as f64;
        let variance = window.map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some((mean, variance.sqrt()))
    }

    /// Mean absolute close-to-close move over the ATR window
    pub fn average_true_range(&self) -> Option<f64> {
        let len = self.prices.len();
        if len < 2 {
            return None;
        }

        let diffs = self.config.atr_window.min(len - 1).max(1);
        let recent: Vec<f64> = self.prices.iter().skip(len - diffs - 1).copied().collect();
        let total: f64 = recent.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        Some(total / diffs as f64)
    }

    /// Volatility-scaled stake, `None` when it would fall under the minimum
    fn stake(&self, context: &MarketContext, price: f64) -> Option<Decimal> {
        let budget = context.balance * self.config.stake_fraction;
        if budget < self.config.min_stake {
            return None;
        }

        let atr_ratio = self.average_true_range().unwrap_or(0.0) / price;
        let scale = if atr_ratio > self.config.target_volatility {
            self.config.target_volatility / atr_ratio
        } else {
            1.0
        };
        let scale = Decimal::from_f64(scale).unwrap_or(Decimal::ONE);

        Some((budget * scale).round_dp(2).max(self.config.min_stake))
    }
}

impl SignalSource for BollingerSignal {
    fn update(&mut self, price: Decimal) {
        let Some(price) = price.to_f64().filter(|p| p.is_finite()) else {
            return;
        };
        if self.prices.len() >= self.capacity {
            self.prices.pop_front();
        }
        self.prices.push_back(price);
    }

    fn signal(&self, context: &MarketContext) -> Option<TradeIntent> {
        let (mean, std) = self.bands()?;
        let price = *self.prices.back()?;
        let width = self.config.entry_threshold * std;

        let (action, direction) = if price < mean - width {
            (ActionId::Buy, Direction::Call)
        } else if price > mean + width {
            (ActionId::Sell, Direction::Put)
        } else {
            return None;
        };

        let stake = self.stake(context, price)?;
        debug!(%direction, price, mean, std, %stake, "Band crossing");

        Some(TradeIntent {
            intent_id: Uuid::new_v4(),
            symbol: context.symbol.clone(),
            action,
            direction,
            stake,
            entry_price: context.price,
            duration_secs: self.config.duration_secs,
            confidence: 1.0,
            created_at: Utc::now(),
        })
    }
}
