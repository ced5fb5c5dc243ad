//! Durable state for cycles, tasks, triggers, and assessments.
//!
//! `EngineDb` is the synchronous rusqlite implementation; `DbHandle` makes
//! it async-safe. [`CycleStore`] is the seam the orchestrator, trigger
//! evaluator, and scheduler depend on, so tests can substitute stores that
//! fail on demand.

pub mod db;
pub mod models;

use async_trait::async_trait;
use serde_json::Value;

pub use db::{DbHandle, EngineDb};
pub use models::*;

use crate::errors::StoreError;
use crate::phase::PhaseArtifact;

type Result<T> = std::result::Result<T, StoreError>;

/// Persistence operations the engine components rely on.
///
/// Implementations must serialize writes per cycle id and make the trigger
/// counter update atomic; `DbHandle` gets both from its mutex.
#[async_trait]
pub trait CycleStore: Send + Sync {
    async fn create_cycle(
        &self,
        goal: &str,
        parameters: Value,
        parent_cycle_id: Option<i64>,
    ) -> Result<Cycle>;
    async fn get_cycle(&self, id: i64) -> Result<Option<Cycle>>;
    async fn record_phase(&self, cycle_id: i64, artifact: PhaseArtifact) -> Result<()>;
    async fn complete_cycle(&self, id: i64, score: f64, lessons: &str) -> Result<Cycle>;
    async fn fail_cycle(&self, id: i64, error: &str) -> Result<Cycle>;
    async fn get_active_cycles(&self) -> Result<Vec<Cycle>>;
    async fn get_recent_cycles(&self, n: usize) -> Result<Vec<Cycle>>;
    async fn get_recent_completed(&self, n: usize) -> Result<Vec<Cycle>>;

    async fn create_task(&self, new: NewTask) -> Result<Task>;
    async fn claim_pending_tasks(&self, limit: usize) -> Result<Vec<Task>>;
    async fn bind_task_cycle(&self, task_id: i64, cycle_id: i64) -> Result<()>;
    async fn complete_task(&self, id: i64, result: Value) -> Result<Task>;
    async fn fail_task(&self, id: i64) -> Result<Task>;
    async fn requeue_task(&self, id: i64) -> Result<Task>;

    async fn create_trigger(&self, new: NewTrigger) -> Result<EvolutionTrigger>;
    async fn list_active_triggers(&self) -> Result<Vec<EvolutionTrigger>>;
    async fn fire_trigger(&self, id: i64) -> Result<EvolutionTrigger>;

    async fn record_assessment(&self, new: NewAssessment) -> Result<SelfAssessment>;
}

#[async_trait]
impl CycleStore for DbHandle {
    async fn create_cycle(
        &self,
        goal: &str,
        parameters: Value,
        parent_cycle_id: Option<i64>,
    ) -> Result<Cycle> {
        let goal = goal.to_string();
        self.call(move |db| db.create_cycle(&goal, &parameters, parent_cycle_id))
            .await
    }

    async fn get_cycle(&self, id: i64) -> Result<Option<Cycle>> {
        self.call(move |db| db.get_cycle(id)).await
    }

    async fn record_phase(&self, cycle_id: i64, artifact: PhaseArtifact) -> Result<()> {
        self.call(move |db| db.record_phase(cycle_id, &artifact))
            .await
    }

    async fn complete_cycle(&self, id: i64, score: f64, lessons: &str) -> Result<Cycle> {
        let lessons = lessons.to_string();
        self.call(move |db| db.complete_cycle(id, score, &lessons))
            .await
    }

    async fn fail_cycle(&self, id: i64, error: &str) -> Result<Cycle> {
        let error = error.to_string();
        self.call(move |db| db.fail_cycle(id, &error)).await
    }

    async fn get_active_cycles(&self) -> Result<Vec<Cycle>> {
        self.call(|db| db.get_active_cycles()).await
    }

    async fn get_recent_cycles(&self, n: usize) -> Result<Vec<Cycle>> {
        self.call(move |db| db.get_recent_cycles(n)).await
    }

    async fn get_recent_completed(&self, n: usize) -> Result<Vec<Cycle>> {
        self.call(move |db| db.get_recent_completed(n)).await
    }

    async fn create_task(&self, new: NewTask) -> Result<Task> {
        self.call(move |db| db.create_task(&new)).await
    }

    async fn claim_pending_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        self.call(move |db| db.claim_pending_tasks(limit)).await
    }

    async fn bind_task_cycle(&self, task_id: i64, cycle_id: i64) -> Result<()> {
        self.call(move |db| db.bind_task_cycle(task_id, cycle_id))
            .await
    }

    async fn complete_task(&self, id: i64, result: Value) -> Result<Task> {
        self.call(move |db| db.complete_task(id, &result)).await
    }

    async fn fail_task(&self, id: i64) -> Result<Task> {
        self.call(move |db| db.fail_task(id)).await
    }

    async fn requeue_task(&self, id: i64) -> Result<Task> {
        self.call(move |db| db.requeue_task(id)).await
    }

    async fn create_trigger(&self, new: NewTrigger) -> Result<EvolutionTrigger> {
        self.call(move |db| db.create_trigger(&new)).await
    }

    async fn list_active_triggers(&self) -> Result<Vec<EvolutionTrigger>> {
        self.call(|db| db.list_active_triggers()).await
    }

    async fn fire_trigger(&self, id: i64) -> Result<EvolutionTrigger> {
        self.call(move |db| db.fire_trigger(id)).await
    }

    async fn record_assessment(&self, new: NewAssessment) -> Result<SelfAssessment> {
        self.call(move |db| db.record_assessment(&new)).await
    }
}
