//! Risk Gate
//!
//! Static pre-trade checks every intent passes before it reaches the
//! executor:
//! - symbol allow-list
//! - stake bounds relative to current balance
//! - open position cap
//! - daily realized loss cap

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::error::{AdaptError, Result};
use crate::rl::policy::TradeIntent;

/// Why an intent was refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockReason {
    SymbolNotAllowed { symbol: String },
    StakeBelowMinimum { min: Decimal, requested: Decimal },
    StakeAboveMaximum { max: Decimal, requested: Decimal },
    TooManyOpenPositions { limit: u32, current: u32 },
    DailyLossExceeded { limit: Decimal, current: Decimal },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::SymbolNotAllowed { symbol } => {
                write!(f, "Symbol {} is not allowed", symbol)
            }
            BlockReason::StakeBelowMinimum { min, requested } => {
                write!(f, "Stake ${} below minimum ${}", requested, min)
            }
            BlockReason::StakeAboveMaximum { max, requested } => {
                write!(f, "Stake ${} exceeds maximum ${}", requested, max)
            }
            BlockReason::TooManyOpenPositions { limit, current } => {
                write!(f, "Open positions {} at limit {}", current, limit)
            }
            BlockReason::DailyLossExceeded { limit, current } => {
                write!(f, "Daily loss ${} exceeds limit ${}", current, limit)
            }
        }
    }
}

impl From<BlockReason> for AdaptError {
    fn from(reason: BlockReason) -> Self {
        AdaptError::RiskRejected(reason.to_string())
    }
}

/// Pre-trade risk checks and position bookkeeping
pub trait RiskGate: Send + Sync {
    /// Refuse the intent with [`AdaptError::RiskRejected`] if any limit is hit
    fn validate(&self, intent: &TradeIntent) -> Result<()>;

    /// A contract was opened
    fn record_open(&mut self, intent: &TradeIntent);

    /// A contract settled with realized `pnl`
    fn record_close(&mut self, pnl: Decimal);

    /// Balance available for staking
    fn balance(&self) -> Decimal;
}

/// Daily statistics
#[derive(Debug, Clone, Default)]
struct DailyStats {
    date: Option<NaiveDate>,
    realized_pnl: Decimal,
    trade_count: u32,
}

/// Reference risk gate driven by [`RiskConfig`]
#[derive(Debug, Clone)]
pub struct PreTradeRiskManager {
    config: RiskConfig,
    balance: Decimal,
    open_positions: u32,
    daily: DailyStats,
}

impl PreTradeRiskManager {
    pub fn new(config: RiskConfig) -> Self {
        let balance = config.initial_balance;
        Self {
            config,
            balance,
            open_positions: 0,
            daily: DailyStats::default(),
        }
    }

    pub fn open_positions(&self) -> u32 {
        self.open_positions
    }

    /// Realized loss today as a positive amount, zero when in profit
    pub fn daily_loss(&self) -> Decimal {
        self.daily_loss_on(Utc::now().date_naive())
    }

    pub fn trades_today(&self) -> u32 {
        self.daily.trade_count
    }

    fn check(&self, intent: &TradeIntent) -> std::result::Result<(), BlockReason> {
        if !self.config.allowed_symbols.iter().any(|s| *s == intent.symbol) {
            return Err(BlockReason::SymbolNotAllowed {
                symbol: intent.symbol.clone(),
            });
        }

        if intent.stake < self.config.min_stake {
            return Err(BlockReason::StakeBelowMinimum {
                min: self.config.min_stake,
                requested: intent.stake,
            });
        }

        let max = self.config.max_stake(self.balance);
        if intent.stake > max {
            return Err(BlockReason::StakeAboveMaximum {
                max,
                requested: intent.stake,
            });
        }

        if self.open_positions >= self.config.max_open_positions {
            return Err(BlockReason::TooManyOpenPositions {
                limit: self.config.max_open_positions,
                current: self.open_positions,
            });
        }

        let limit = self.config.daily_loss_limit();
        let current = self.daily_loss();
        if current >= limit {
            return Err(BlockReason::DailyLossExceeded { limit, current });
        }

        Ok(())
    }

    /// Reset daily counters when the UTC date changes
    fn roll_day(&mut self, today: NaiveDate) {
        if self.daily.date != Some(today) {
            if self.daily.date.is_some() {
                info!(
                    pnl = %self.daily.realized_pnl,
                    trades = self.daily.trade_count,
                    "Daily risk counters reset"
                );
            }
            self.daily = DailyStats {
                date: Some(today),
                ..Default::default()
            };
        }
    }

    fn close_on(&mut self, pnl: Decimal, today: NaiveDate) {
        self.roll_day(today);
        self.open_positions = self.open_positions.saturating_sub(1);
        self.balance += pnl;
        self.daily.realized_pnl += pnl;

        let limit = self.config.daily_loss_limit();
        if self.daily_loss_on(today) >= limit {
            warn!(
                loss = %self.daily_loss_on(today),
                %limit,
                "Daily loss limit reached, new trades blocked until tomorrow"
            );
        }
    }

    fn daily_loss_on(&self, today: NaiveDate) -> Decimal {
        if self.daily.date == Some(today) {
            (-self.daily.realized_pnl).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        }
    }
}

impl RiskGate for PreTradeRiskManager {
    fn validate(&self, intent: &TradeIntent) -> Result<()> {
        match self.check(intent) {
            Ok(()) => Ok(()),
            Err(reason) => {
                warn!(intent_id = %intent.intent_id, "Intent blocked: {}", reason);
                Err(reason.into())
            }
        }
    }

    fn record_open(&mut self, intent: &TradeIntent) {
        self.roll_day(Utc::now().date_naive());
        self.open_positions += 1;
        self.daily.trade_count += 1;
        debug!(
            intent_id = %intent.intent_id,
            open = self.open_positions,
            "Position opened"
        );
    }

    fn record_close(&mut self, pnl: Decimal) {
        self.close_on(pnl, Utc::now().date_naive());
    }

    fn balance(&self) -> Decimal {
        self.balance
    }
}
