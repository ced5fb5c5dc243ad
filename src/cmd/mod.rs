//! CLI command implementations.
//!
//! | Module    | Commands handled            |
//! |-----------|-----------------------------|
//! | `run`     | `Run`, `Daemon`             |
//! | `task`    | `Task add`, `Task list`     |
//! | `trigger` | `Trigger ...`               |
//! | `status`  | `Status`                    |

pub mod run;
pub mod status;
pub mod task;
pub mod trigger;

pub use run::{cmd_daemon, cmd_run};
pub use status::cmd_status;
pub use task::cmd_task;
pub use trigger::cmd_trigger;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use kaizen::config::EngineConfig;
use kaizen::executor::{NullToolProvider, PhaseExecutor};
use kaizen::orchestrator::CycleOrchestrator;
use kaizen::predict::HeuristicPredictor;
use kaizen::scorer::QualityScorer;
use kaizen::store::{DbHandle, EngineDb};
use kaizen::triggers::TriggerEvaluator;

use crate::Cli;

/// The assembled engine behind every command.
///
/// The CLI runs in offline mode: phases execute on the deterministic local
/// estimator until an external capability provider is wired in.
pub(crate) struct Engine {
    pub config: EngineConfig,
    pub store: Arc<DbHandle>,
    pub orchestrator: Arc<CycleOrchestrator>,
    pub triggers: Arc<TriggerEvaluator>,
    pub shutdown: CancellationToken,
}

impl Engine {
    pub fn open(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| Path::new("kaizen.toml").to_path_buf());
        let config = EngineConfig::load_or_default(&config_path)?;

        let db_path = cli.db.clone().unwrap_or_else(|| config.store.db_path.clone());
        let db = EngineDb::new(&db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        let store = Arc::new(DbHandle::new(db));

        let predictor = Arc::new(HeuristicPredictor);
        let executor = PhaseExecutor::new(Arc::new(NullToolProvider), Some(predictor));
        let triggers = Arc::new(TriggerEvaluator::new(
            store.clone(),
            QualityScorer::weighted(config.scoring.weights),
            config.triggers.clone(),
            config.scoring.quality_floor,
        ));
        let shutdown = CancellationToken::new();
        let orchestrator = Arc::new(CycleOrchestrator::new(
            store.clone(),
            executor,
            QualityScorer::weighted(config.scoring.weights),
            triggers.clone(),
            config.phases.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            config,
            store,
            orchestrator,
            triggers,
            shutdown,
        })
    }
}

/// Parse a `--params`-style JSON object argument.
pub(crate) fn parse_json_object(flag: &str, raw: &str) -> Result<serde_json::Value> {
    let value: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("{flag} must be valid JSON"))?;
    anyhow::ensure!(value.is_object(), "{flag} must be a JSON object");
    Ok(value)
}
