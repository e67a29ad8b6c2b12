use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::rl::config::LearnerConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub learner: LearnerConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Starting account balance in USD
    pub initial_balance: Decimal,
    /// Smallest stake the broker accepts
    pub min_stake: Decimal,
    /// Largest stake as a fraction of balance (e.g., 0.02 = 2%)
    pub max_stake_fraction: Decimal,
    /// Maximum concurrent open contracts
    pub max_open_positions: u32,
    /// Daily loss limit as a fraction of initial balance
    pub max_daily_loss_fraction: Decimal,
    /// Instruments the agent may trade
    pub allowed_symbols: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(1000),
            min_stake: dec!(0.35),
            max_stake_fraction: dec!(0.02),
            max_open_positions: 20,
            max_daily_loss_fraction: dec!(0.05),
            allowed_symbols: vec![
                "R_50".to_string(),
                "R_100".to_string(),
                "1HZ100V".to_string(),
            ],
        }
    }
}

impl RiskConfig {
    /// Largest stake permitted for a given balance
    pub fn max_stake(&self, balance: Decimal) -> Decimal {
        balance * self.max_stake_fraction
    }

    /// Absolute daily loss limit in USD
    pub fn daily_loss_limit(&self) -> Decimal {
        self.initial_balance * self.max_daily_loss_fraction
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Instrument traded by the session
    pub symbol: String,
    /// Sleep between trade cycles in milliseconds
    pub cycle_interval_ms: u64,
    /// Contract duration in seconds
    pub contract_duration_secs: u64,
    /// Where the session snapshot is written on shutdown
    pub snapshot_path: PathBuf,
    /// Restore learner state from `snapshot_path` on startup
    pub resume: bool,
    /// Fall back to a fresh learner when the snapshot cannot be read
    pub start_fresh_on_corrupt_snapshot: bool,
    /// Include buffered experience in snapshots
    pub persist_experience: bool,
    /// Timestamped checkpoints kept next to the snapshot
    pub max_checkpoints: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            symbol: "R_100".to_string(),
            cycle_interval_ms: 1000,
            contract_duration_secs: 300,
            snapshot_path: PathBuf::from("./checkpoints/session.json"),
            resume: false,
            start_fresh_on_corrupt_snapshot: false,
            persist_experience: true,
            max_checkpoints: 5,
        }
    }
}

/// Bollinger mean-reversion rule
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Trade rule signals ahead of the learned policy
    pub enabled: bool,
    /// Band window in ticks
    pub lookback: usize,
    /// Band half-width in standard deviations
    pub entry_threshold: f64,
    /// Close-to-close moves averaged for the ATR
    pub atr_window: usize,
    pub duration_secs: u64,
    /// Stake budget as a fraction of balance
    pub stake_fraction: Decimal,
    pub min_stake: Decimal,
    /// ATR/price ratio at which the full budget is staked
    pub target_volatility: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lookback: 14,
            entry_threshold: 2.0,
            atr_window: 14,
            duration_secs: 300,
            stake_fraction: dec!(0.02),
            min_stake: dec!(0.35),
            target_volatility: 0.001,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info,adaptrade=debug".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info,adaptrade=debug")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ADAPT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (ADAPT_LEARNER__GAMMA, etc.)
            .add_source(
                Environment::with_prefix("ADAPT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.learner.problems();

        if self.risk.initial_balance <= Decimal::ZERO {
            errors.push("initial_balance must be positive".to_string());
        }

        if self.risk.min_stake <= Decimal::ZERO {
            errors.push("min_stake must be positive".to_string());
        }

        if self.risk.max_stake_fraction <= Decimal::ZERO || self.risk.max_stake_fraction > Decimal::ONE
        {
            errors.push("max_stake_fraction must be in (0, 1]".to_string());
        }

        if self.risk.max_stake(self.risk.initial_balance) < self.risk.min_stake {
            errors.push(format!(
                "max stake {} is below min_stake {}. Raise initial_balance or max_stake_fraction.",
                self.risk.max_stake(self.risk.initial_balance),
                self.risk.min_stake
            ));
        }

        if self.risk.max_daily_loss_fraction <= Decimal::ZERO
            || self.risk.max_daily_loss_fraction > Decimal::ONE
        {
            errors.push("max_daily_loss_fraction must be in (0, 1]".to_string());
        }

        if !self
            .risk
            .allowed_symbols
            .iter()
            .any(|s| *s == self.session.symbol)
        {
            errors.push(format!(
                "session symbol {} is not in risk.allowed_symbols",
                self.session.symbol
            ));
        }

        if self.session.contract_duration_secs == 0 {
            errors.push("contract_duration_secs must be positive".to_string());
        }

        if self.signal.lookback < 2 {
            errors.push("signal.lookback must be at least 2".to_string());
        }

        if !(self.signal.entry_threshold.is_finite() && self.signal.entry_threshold > 0.0) {
            errors.push("signal.entry_threshold must be positive".to_string());
        }

        if self.signal.atr_window == 0 || self.signal.duration_secs == 0 {
            errors.push("signal.atr_window and signal.duration_secs must be positive".to_string());
        }

        if !(self.signal.target_volatility.is_finite() && self.signal.target_volatility > 0.0) {
            errors.push("signal.target_volatility must be positive".to_string());
        }

        if self.signal.stake_fraction > self.risk.max_stake_fraction {
            errors.push(format!(
                "signal.stake_fraction {} exceeds risk.max_stake_fraction {}",
                self.signal.stake_fraction, self.risk.max_stake_fraction
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_max_stake_two_percent_rule() {
        let risk = RiskConfig::default();
        assert_eq!(risk.max_stake(dec!(1000)), dec!(20));
        assert_eq!(risk.daily_loss_limit(), dec!(50));
    }

    #[test]
    fn test_symbol_must_be_allowed() {
        let mut config = AppConfig::default();
        config.session.symbol = "EURUSD".to_string();

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("EURUSD")));
    }

    #[test]
    fn test_signal_stake_cannot_outgrow_risk_limit() {
        let mut config = AppConfig::default();
        config.signal.stake_fraction = dec!(0.05);
        config.signal.lookback = 1;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("stake_fraction")));
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let dir = std::env::temp_dir().join("adaptrade_no_such_config_dir");
        let config = AppConfig::load_from(&dir).unwrap();

        assert_eq!(config.learner.batch_size, 32);
        assert_eq!(config.session.symbol, "R_100");
        assert!(!config.signal.enabled);
        assert_eq!(config.signal.lookback, 14);
        assert_eq!(config.logging.level, "info,adaptrade=debug");
    }
}
