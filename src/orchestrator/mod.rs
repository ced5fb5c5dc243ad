//! The cycle driver: runs one goal through Plan, Make, Check, Reflect,
//! Optimize, persisting every artifact before the next phase starts.
//!
//! A cycle never leaves the store in an ambiguous state. Either all phases
//! completed and the cycle is `completed` with a score, or the cycle is
//! `failed` with the error recorded in its lessons. Phase timeouts,
//! cancellation, and store faults all land on the failed path; provider
//! faults do not, since the executor degrades to its local estimator.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::PhasesConfig;
use crate::errors::CycleError;
use crate::executor::PhaseExecutor;
use crate::phase::{CycleContext, CycleDigest, Phase};
use crate::scorer::QualityScorer;
use crate::store::models::Cycle;
use crate::store::CycleStore;
use crate::triggers::TriggerEvaluator;

/// Outcome of one `run_full_cycle` call. Infallible by construction so a
/// scheduler worker never has to decide what a torn error means.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Absent only when the cycle row itself could not be created.
    pub cycle_id: Option<i64>,
    pub success: bool,
    pub final_score: Option<f64>,
    pub error_message: Option<String>,
}

impl ExecutionResult {
    fn failed(cycle_id: Option<i64>, error: impl ToString) -> Self {
        Self {
            cycle_id,
            success: false,
            final_score: None,
            error_message: Some(error.to_string()),
        }
    }
}

pub struct CycleOrchestrator {
    store: Arc<dyn CycleStore>,
    executor: PhaseExecutor,
    scorer: QualityScorer,
    triggers: Arc<TriggerEvaluator>,
    cfg: PhasesConfig,
    shutdown: CancellationToken,
}

impl CycleOrchestrator {
    pub fn new(
        store: Arc<dyn CycleStore>,
        executor: PhaseExecutor,
        scorer: QualityScorer,
        triggers: Arc<TriggerEvaluator>,
        cfg: PhasesConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            executor,
            scorer,
            triggers,
            cfg,
            shutdown,
        }
    }

    /// Drive one cycle for `goal` from creation to a terminal state.
    pub async fn run_full_cycle(
        &self,
        goal: &str,
        parameters: Value,
        parent_cycle_id: Option<i64>,
    ) -> ExecutionResult {
        let cycle = match self.store.create_cycle(goal, parameters, parent_cycle_id).await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "could not create cycle");
                return ExecutionResult::failed(None, e);
            }
        };
        info!(cycle_id = cycle.id, goal, "cycle started");

        match self.drive_phases(&cycle).await {
            Ok(ctx) => self.finish(&cycle, &ctx).await,
            Err(e) => {
                warn!(cycle_id = cycle.id, error = %e, "cycle failed");
                if let Err(store_err) = self.store.fail_cycle(cycle.id, &e.to_string()).await {
                    error!(cycle_id = cycle.id, error = %store_err, "could not mark cycle failed");
                }
                ExecutionResult::failed(Some(cycle.id), e)
            }
        }
    }

    /// Run all five phases in order, recording each artifact durably
    /// before the next phase starts.
    async fn drive_phases(&self, cycle: &Cycle) -> Result<CycleContext, CycleError> {
        let mut ctx = CycleContext::new(&cycle.goal, cycle.parameters.clone());
        ctx.history = self.recent_history().await;

        for phase in Phase::ALL {
            if self.shutdown.is_cancelled() {
                return Err(CycleError::Cancelled {
                    phase: phase.to_string(),
                });
            }
            let artifact = tokio::time::timeout(
                Duration::from_secs(self.cfg.timeout_secs),
                self.executor.execute(phase, &ctx),
            )
            .await
            .map_err(|_| CycleError::PhaseTimeout {
                phase: phase.to_string(),
                seconds: self.cfg.timeout_secs,
            })?;

            self.store.record_phase(cycle.id, artifact.clone()).await?;
            info!(
                cycle_id = cycle.id,
                phase = %phase,
                score = artifact.score,
                fallback = artifact.used_fallback,
                "phase recorded"
            );
            ctx.prior.push(artifact);
        }
        Ok(ctx)
    }

    async fn finish(&self, cycle: &Cycle, ctx: &CycleContext) -> ExecutionResult {
        let score = self.scorer.score(&ctx.prior);
        let lessons = Self::lessons(ctx);
        let completed = match self.store.complete_cycle(cycle.id, score, &lessons).await {
            Ok(c) => c,
            Err(e) => {
                error!(cycle_id = cycle.id, error = %e, "could not complete cycle");
                // The cycle must still reach a terminal state; never leave
                // it parked in optimizing.
                if let Err(fail_err) = self.store.fail_cycle(cycle.id, &e.to_string()).await {
                    error!(cycle_id = cycle.id, error = %fail_err, "could not mark cycle failed");
                }
                return ExecutionResult::failed(Some(cycle.id), e);
            }
        };
        info!(cycle_id = cycle.id, score, "cycle completed");

        // Best-effort by contract: a trigger fault never taints the result.
        let spawned = self.triggers.evaluate_cycle(&completed, None).await;
        if !spawned.is_empty() {
            info!(cycle_id = cycle.id, count = spawned.len(), "evolution tasks spawned");
        }

        ExecutionResult {
            cycle_id: Some(cycle.id),
            success: true,
            final_score: Some(score),
            error_message: None,
        }
    }

    /// Lessons come from the Reflect artifact's insights and
    /// recommendations, joined into one audit line.
    fn lessons(ctx: &CycleContext) -> String {
        let Some(reflect) = ctx.artifact(Phase::Reflect) else {
            return String::new();
        };
        let mut lines: Vec<String> = Vec::new();
        for key in ["insights", "recommendations"] {
            if let Some(items) = reflect.payload.get(key).and_then(Value::as_array) {
                lines.extend(items.iter().filter_map(Value::as_str).map(String::from));
            }
        }
        lines.join("; ")
    }

    /// Recent completed-cycle digests for Reflect. History is advisory, so
    /// a store fault here degrades to an empty window.
    async fn recent_history(&self) -> Vec<CycleDigest> {
        match self.store.get_recent_completed(self.cfg.history_window).await {
            Ok(cycles) => cycles
                .into_iter()
                .map(|c| CycleDigest {
                    cycle_id: c.id,
                    success_score: c.success_score,
                    lessons_learned: c.lessons_learned,
                    started_at: c.started_at,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "could not load cycle history");
                Vec::new()
            }
        }
    }
}
