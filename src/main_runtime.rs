use adaptrade::config::{AppConfig, LoggingConfig};
use adaptrade::monitor::LearningReport;
use adaptrade::paper::{PaperMarket, WalkConfig, FEATURE_DIM};
use adaptrade::risk::PreTradeRiskManager;
use adaptrade::rl::policy::FixedFractionSizer;
use adaptrade::rl::signal::BollingerSignal;
use adaptrade::rl::training::{resume_or_fresh, SessionSnapshot};
use adaptrade::rl::{OnlineLearner, PolicyModel};
use adaptrade::session::{SessionStats, TradingSession};
use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal_macros::dec;
use std::path::Path;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Simulated seconds per paper tick
const PAPER_TICK_SECONDS: u64 = 60;

pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info,adaptrade=debug"));

    // File logging only when ADAPT_LOG_DIR is set.
    //
    // `tracing_appender::rolling::daily` panics if it can't create the
    // initial log file, so check writability first.
    let log_dir = std::env::var("ADAPT_LOG_DIR").ok();
    let file_layer = log_dir.as_deref().and_then(|dir| {
        let writable = std::fs::create_dir_all(dir).is_ok() && {
            let test_path = Path::new(dir).join(".adaptrade_write_test");
            let ok = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&test_path)
                .is_ok();
            let _ = std::fs::remove_file(&test_path);
            ok
        };

        if !writable {
            eprintln!(
                "Warning: Could not write to log directory {}, file logging disabled",
                dir
            );
            return None;
        }

        let file_appender = tracing_appender::rolling::daily(dir, "adaptrade.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Keep the guard alive for the life of the process
        Box::leak(Box::new(guard));

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let (json_layer, console_layer) = if config.json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/adaptrade.log", dir);
    }
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

/// Run a paper trading session until the cycle budget or Ctrl-C
pub async fn run_paper(
    mut config: AppConfig,
    cycles: Option<u64>,
    resume: bool,
    rules: bool,
    seed: u64,
) -> Result<SessionStats> {
    if config.learner.state_dim != FEATURE_DIM {
        bail!(
            "paper feed emits {} features but learner.state_dim is {}",
            FEATURE_DIM,
            config.learner.state_dim
        );
    }
    config.session.resume |= resume;
    config.signal.enabled |= rules;

    let learner = resume_or_fresh(
        config.learner.clone(),
        &config.session.snapshot_path,
        config.session.resume,
        config.session.start_fresh_on_corrupt_snapshot,
    )
    .context("failed to initialize learner")?;

    let market = PaperMarket::new(WalkConfig {
        seed,
        ..Default::default()
    });
    let sizer = FixedFractionSizer::new(config.risk.max_stake_fraction, config.risk.min_stake);

    let mut session = TradingSession::new(
        learner,
        Box::new(market.feed()),
        Box::new(market.executor(PAPER_TICK_SECONDS, dec!(0.95))),
        Box::new(PreTradeRiskManager::new(config.risk.clone())),
        Box::new(sizer),
        config.session.clone(),
        StdRng::seed_from_u64(seed.wrapping_add(1)),
    );
    if config.signal.enabled {
        info!(
            lookback = config.signal.lookback,
            threshold = config.signal.entry_threshold,
            "Bollinger rule signals enabled"
        );
        session = session.with_signal_source(Box::new(BollingerSignal::new(config.signal.clone())));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    Ok(session.run(cycles, shutdown_rx).await?)
}

/// Print a report for a saved snapshot
pub fn inspect(config: &AppConfig, path: &Path) -> Result<()> {
    let snapshot = SessionSnapshot::load_from(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let created_at = snapshot.created_at;
    let updates = snapshot.model.updates();

    let learner = OnlineLearner::restore(config.learner.clone(), snapshot)?;
    let report = LearningReport::from_snapshot(&learner.snapshot());

    let summary = serde_json::json!({
        "snapshot": path.display().to_string(),
        "created_at": created_at,
        "model_updates": updates,
        "model_trained": learner.model().is_trained(),
        "report": report,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
