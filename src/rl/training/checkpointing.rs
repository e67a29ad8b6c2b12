//! Model Checkpointing
//!
//! Save and load session snapshots (policy parameters, learner state and,
//! optionally, buffered experience) as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{AdaptError, Result};
use crate::rl::config::LearnerConfig;
use crate::rl::drift::Adwin;
use crate::rl::learner::{LearnerState, OnlineLearner};
use crate::rl::memory::Transition;
use crate::rl::model::SgdPolicy;

/// Current on-disk snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to resume a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub model: SgdPolicy,
    pub learner_state: LearnerState,
    /// Buffered experience, oldest first
    #[serde(default)]
    pub experience: Option<Vec<Transition>>,
}

impl SessionSnapshot {
    /// Capture a learner's persistent state
    pub fn capture(learner: &OnlineLearner, include_experience: bool) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            model: learner.model().clone(),
            learner_state: *learner.state(),
            experience: include_experience.then(|| learner.buffer().iter().cloned().collect()),
        }
    }

    /// Rebuild a learner. The drift detector always starts fresh.
    pub fn into_learner(self, config: LearnerConfig) -> Result<OnlineLearner> {
        if self.version != SNAPSHOT_VERSION {
            return Err(AdaptError::Snapshot(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }
        self.model.validate().map_err(AdaptError::Snapshot)?;
        if self.model.n_features() != config.state_dim {
            return Err(AdaptError::Snapshot(format!(
                "snapshot model has {} features, config expects {}",
                self.model.n_features(),
                config.state_dim
            )));
        }

        let detector = Adwin::new(config.drift_delta);
        let learner = OnlineLearner::with_parts(config, self.model, detector)?
            .with_state(self.learner_state)
            .map_err(|e| AdaptError::Snapshot(e.to_string()))?;

        match self.experience {
            Some(experience) => learner
                .with_experience(experience)
                .map_err(|e| AdaptError::Snapshot(e.to_string())),
            None => Ok(learner),
        }
    }

    /// Write atomically: temp file in the same directory, then rename
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| AdaptError::Snapshot(format!("corrupt snapshot {:?}: {}", path, e)))
    }
}

impl OnlineLearner {
    /// Rebuild a learner from a decoded snapshot
    pub fn restore(config: LearnerConfig, snapshot: SessionSnapshot) -> Result<Self> {
        snapshot.into_learner(config)
    }
}

/// Restore a learner from `path` when `resume` is set, else start fresh.
///
/// A missing or unreadable snapshot is fatal unless `start_fresh_on_corrupt`
/// opts into a fresh learner.
pub fn resume_or_fresh<P: AsRef<Path>>(
    config: LearnerConfig,
    path: P,
    resume: bool,
    start_fresh_on_corrupt: bool,
) -> Result<OnlineLearner> {
    if !resume {
        return OnlineLearner::new(config);
    }

    let path = path.as_ref();
    let restored = SessionSnapshot::load_from(path)
        .and_then(|snapshot| OnlineLearner::restore(config.clone(), snapshot));

    match restored {
        Ok(learner) => {
            info!(
                "Resumed session from {:?} (epsilon {:.4}, {} buffered transitions)",
                path,
                learner.epsilon(),
                learner.buffer().len()
            );
            Ok(learner)
        }
        Err(e) if start_fresh_on_corrupt => {
            warn!("Could not resume from {:?} ({}), starting fresh", path, e);
            OnlineLearner::new(config)
        }
        Err(e) => Err(e),
    }
}

/// Checkpointer for rotating timestamped snapshots
pub struct Checkpointer {
    /// Directory for checkpoints
    checkpoint_dir: PathBuf,
    /// Maximum checkpoints to keep
    max_checkpoints: usize,
}

impl Checkpointer {
    /// Create a new checkpointer
    pub fn new<P: AsRef<Path>>(checkpoint_dir: P, max_checkpoints: usize) -> Self {
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();

        if !checkpoint_dir.exists() {
            if let Err(e) = fs::create_dir_all(&checkpoint_dir) {
                warn!("Failed to create checkpoint directory: {}", e);
            }
        }

        Self {
            checkpoint_dir,
            max_checkpoints: max_checkpoints.max(1),
        }
    }

    /// Get checkpoint path for a given name
    pub fn checkpoint_path(&self, name: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("{}.json", name))
    }

    /// Save a snapshot and prune old ones
    pub fn save(&self, snapshot: &SessionSnapshot, name: &str) -> Result<PathBuf> {
        let path = self.checkpoint_path(name);
        snapshot.save_to(&path)?;
        info!("Saved checkpoint to {:?}", path);

        self.cleanup_old_checkpoints();

        Ok(path)
    }

    /// Load a snapshot by name
    pub fn load(&self, name: &str) -> Result<SessionSnapshot> {
        let path = self.checkpoint_path(name);

        if !path.exists() {
            return Err(AdaptError::Snapshot(format!(
                "Checkpoint not found: {:?}",
                path
            )));
        }

        SessionSnapshot::load_from(&path)
    }

    /// List available checkpoints, oldest first
    pub fn list_checkpoints(&self) -> Vec<String> {
        let mut checkpoints = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.checkpoint_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(stem) = name.strip_suffix(".json") {
                        checkpoints.push(stem.to_string());
                    }
                }
            }
        }

        checkpoints.sort();
        checkpoints
    }

    /// Get latest checkpoint name
    pub fn latest_checkpoint(&self) -> Option<String> {
        self.list_checkpoints().into_iter().last()
    }

    /// Cleanup old checkpoints keeping only max_checkpoints
    fn cleanup_old_checkpoints(&self) {
        let checkpoints = self.list_checkpoints();

        if checkpoints.len() <= self.max_checkpoints {
            return;
        }

        let to_remove = checkpoints.len() - self.max_checkpoints;
        for name in checkpoints.into_iter().take(to_remove) {
            let path = self.checkpoint_path(&name);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old checkpoint {:?}: {}", path, e);
            } else {
                info!("Removed old checkpoint: {}", name);
            }
        }
    }

    /// Check if a checkpoint exists
    pub fn exists(&self, name: &str) -> bool {
        self.checkpoint_path(name).exists()
    }
}

/// Generate a checkpoint name with timestamp
pub fn timestamped_name(prefix: &str) -> String {
    let now = Utc::now();
    format!("{}_{}", prefix, now.format("%Y%m%d_%H%M%S%3f"))
}
