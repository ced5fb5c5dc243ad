//! Background task scheduler: polls the queue, runs claimed tasks as
//! cycles under bounded parallelism, and sweeps the time-based triggers.
//!
//! Claiming happens in priority order inside the store, so evolution tasks
//! spawned by triggers outrank routine work automatically. A batch is
//! always drained before the loop yields, including on shutdown, so no
//! claimed task is abandoned in `in_progress`.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::orchestrator::CycleOrchestrator;
use crate::store::models::Task;
use crate::store::CycleStore;
use crate::triggers::TriggerEvaluator;

pub struct Scheduler {
    store: Arc<dyn CycleStore>,
    orchestrator: Arc<CycleOrchestrator>,
    triggers: Arc<TriggerEvaluator>,
    cfg: SchedulerConfig,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn CycleStore>,
        orchestrator: Arc<CycleOrchestrator>,
        triggers: Arc<TriggerEvaluator>,
        cfg: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            orchestrator,
            triggers,
            cfg,
            shutdown,
        }
    }

    /// Poll until shutdown. Each tick claims a batch, runs it to
    /// completion, then sweeps periodic triggers.
    pub async fn run(&self) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(self.cfg.poll_interval_secs));
        info!(
            poll_interval_secs = self.cfg.poll_interval_secs,
            workers = self.cfg.worker_count,
            "scheduler started"
        );
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    let processed = self.run_pending_batch().await;
                    if processed > 0 {
                        info!(processed, "batch drained");
                    }
                    let spawned = self.triggers.evaluate_periodic().await;
                    if !spawned.is_empty() {
                        info!(count = spawned.len(), "periodic triggers spawned tasks");
                    }
                }
            }
        }
    }

    /// Claim up to `batch_size` pending tasks and run each one as a full
    /// cycle. Returns the number of tasks processed. The batch is fully
    /// drained before returning.
    pub async fn run_pending_batch(&self) -> usize {
        let tasks = match self.store.claim_pending_tasks(self.cfg.batch_size).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "could not claim pending tasks");
                return 0;
            }
        };
        if tasks.is_empty() {
            return 0;
        }

        let semaphore = Arc::new(Semaphore::new(self.cfg.worker_count.max(1)));
        let mut workers = JoinSet::new();
        let count = tasks.len();
        for task in tasks {
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let orchestrator = self.orchestrator.clone();
            let max_retries = self.cfg.max_task_retries;
            workers.spawn(async move {
                // Semaphore is never closed while workers hold it.
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                run_task(store, orchestrator, task, max_retries).await;
            });
        }
        while workers.join_next().await.is_some() {}
        count
    }
}

/// Run one claimed task as a cycle and record its outcome on the task row.
async fn run_task(
    store: Arc<dyn CycleStore>,
    orchestrator: Arc<CycleOrchestrator>,
    task: Task,
    max_retries: i64,
) {
    let goal = if task.description.trim().is_empty() {
        task.name.clone()
    } else {
        task.description.clone()
    };
    info!(task_id = task.id, task = %task.name, "running task");

    let result = orchestrator
        .run_full_cycle(&goal, task.parameters.clone(), None)
        .await;

    if let Some(cycle_id) = result.cycle_id {
        if let Err(e) = store.bind_task_cycle(task.id, cycle_id).await {
            warn!(task_id = task.id, error = %e, "could not bind task to cycle");
        }
    }

    if result.success {
        let outcome = json!({
            "cycle_id": result.cycle_id,
            "score": result.final_score,
        });
        if let Err(e) = store.complete_task(task.id, outcome).await {
            error!(task_id = task.id, error = %e, "could not mark task completed");
        }
        return;
    }

    warn!(
        task_id = task.id,
        error = result.error_message.as_deref().unwrap_or("unknown"),
        "task cycle failed"
    );
    match store.fail_task(task.id).await {
        Ok(failed) if failed.retry_count < max_retries => {
            match store.requeue_task(task.id).await {
                Ok(requeued) => {
                    info!(task_id = task.id, attempt = requeued.retry_count, "task requeued")
                }
                Err(e) => error!(task_id = task.id, error = %e, "could not requeue task"),
            }
        }
        Ok(failed) => {
            info!(task_id = task.id, retries = failed.retry_count, "task retries exhausted")
        }
        Err(e) => error!(task_id = task.id, error = %e, "could not mark task failed"),
    }
}
