//! Layered configuration for the kaizen engine, read from `kaizen.toml`.
//!
//! Every field has a sensible default, so a missing file or an empty table
//! yields a working configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [store]
//! db_path = "kaizen.db"
//!
//! [phases]
//! timeout_secs = 120
//! history_window = 10
//!
//! [scoring]
//! quality_floor = 80.0
//!
//! [scoring.weights]
//! plan = 0.15
//! make = 0.15
//! check = 0.30
//! reflect = 0.10
//! optimize = 0.30
//!
//! [triggers]
//! quality_window = 10
//! evolution_priority = 10
//! default_time_interval_secs = 86400
//!
//! [scheduler]
//! poll_interval_secs = 180
//! batch_size = 4
//! worker_count = 2
//! max_task_retries = 3
//! default_task_priority = 5
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::scorer::PhaseWeights;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub phases: PhasesConfig,
    pub scoring: ScoringConfig,
    pub triggers: TriggersConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("kaizen.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhasesConfig {
    /// Upper bound per phase call; exceeding it fails the cycle.
    pub timeout_secs: u64,
    /// How many recent completed cycles the Reflect phase may read.
    pub history_window: usize,
}

impl Default for PhasesConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            history_window: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: PhaseWeights,
    /// Scores below this floor mark an assessment as requiring improvement.
    pub quality_floor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: PhaseWeights::default(),
            quality_floor: 80.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggersConfig {
    /// Completed cycles considered by quality-threshold rules, and the
    /// default minimum before such a rule may fire at all.
    pub quality_window: usize,
    /// Priority given to spawned evolution tasks; self-improvement work
    /// outranks routine tasks.
    pub evolution_priority: i64,
    /// Interval for time-based rules that do not specify their own.
    pub default_time_interval_secs: i64,
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            quality_window: 10,
            evolution_priority: 10,
            default_time_interval_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
    /// Max tasks claimed per tick.
    pub batch_size: usize,
    /// Bounded parallelism for running claimed tasks.
    pub worker_count: usize,
    /// A failed task is requeued while its retry count stays below this.
    pub max_task_retries: i64,
    pub default_task_priority: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 180,
            batch_size: 4,
            worker_count: 2,
            max_task_retries: 3,
            default_task_priority: 5,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from `path` if it exists, otherwise defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.phases.timeout_secs, 120);
        assert_eq!(cfg.triggers.quality_window, 10);
        assert_eq!(cfg.scheduler.worker_count, 2);
        assert!(cfg.scoring.quality_floor > 0.0);
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kaizen.toml");
        fs::write(
            &path,
            r#"
            [phases]
            timeout_secs = 30

            [scoring.weights]
            check = 0.5
            "#,
        )
        .unwrap();

        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.phases.timeout_secs, 30);
        assert_eq!(cfg.phases.history_window, 10);
        assert_eq!(cfg.scoring.weights.check, 0.5);
        assert_eq!(cfg.scoring.weights.plan, 0.15);
        assert_eq!(cfg.scheduler.batch_size, 4);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let cfg = EngineConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.scheduler.poll_interval_secs, 180);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kaizen.toml");
        fs::write(&path, "not [ valid").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
