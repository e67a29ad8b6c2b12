pub mod cli;
pub mod config;
pub mod error;
pub mod monitor;
pub mod paper;
pub mod risk;
pub mod rl;
pub mod session;

pub use config::AppConfig;
pub use error::{AdaptError, Result};
pub use monitor::{LearningMonitor, LearningReport};
pub use paper::{PaperExecutor, PaperMarket, SimulatedFeed};
pub use risk::{PreTradeRiskManager, RiskGate};
pub use rl::{
    ActionId, Adwin, DecisionPolicy, ExperienceBuffer, OnlineLearner, SessionSnapshot, SgdPolicy,
    StateVector, Transition,
};
pub use session::{
    CycleOutcome, ExecutionReport, FeatureSource, MarketObservation, OrderExecutor,
    TradingSession,
};
