//! End-to-end tests wiring the real store, executor, scorer, triggers,
//! orchestrator, and scheduler together.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use kaizen::config::{PhasesConfig, SchedulerConfig, TriggersConfig};
use kaizen::errors::{StoreError, ToolError};
use kaizen::executor::{NullToolProvider, PhaseExecutor, ToolProvider};
use kaizen::orchestrator::CycleOrchestrator;
use kaizen::phase::{Phase, PhaseArtifact};
use kaizen::predict::HeuristicPredictor;
use kaizen::scheduler::Scheduler;
use kaizen::scorer::{PhaseWeights, QualityScorer};
use kaizen::store::models::{
    Cycle, CycleStatus, EvolutionTrigger, NewTask, NewTrigger, SelfAssessment, Task, TaskStatus,
    TriggerType,
};
use kaizen::store::{CycleStore, DbHandle, EngineDb};
use kaizen::triggers::TriggerEvaluator;

fn memory_store() -> Arc<DbHandle> {
    Arc::new(DbHandle::new(EngineDb::new_in_memory().unwrap()))
}

fn build_orchestrator(
    store: Arc<dyn CycleStore>,
    tools: Arc<dyn ToolProvider>,
    shutdown: CancellationToken,
) -> Arc<CycleOrchestrator> {
    let triggers = Arc::new(TriggerEvaluator::new(
        store.clone(),
        QualityScorer::weighted(PhaseWeights::default()),
        TriggersConfig::default(),
        80.0,
    ));
    Arc::new(CycleOrchestrator::new(
        store,
        PhaseExecutor::new(tools, Some(Arc::new(HeuristicPredictor))),
        QualityScorer::weighted(PhaseWeights::default()),
        triggers,
        PhasesConfig::default(),
        shutdown,
    ))
}

mod cycle_lifecycle {
    use super::*;

    #[tokio::test]
    async fn offline_cycle_completes_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("kaizen.db");

        let cycle_id = {
            let store = Arc::new(DbHandle::new(EngineDb::new(&db_path).unwrap()));
            let orch = build_orchestrator(
                store.clone(),
                Arc::new(NullToolProvider),
                CancellationToken::new(),
            );
            let result = orch
                .run_full_cycle("Refactor the queue module. Add coverage.", json!({}), None)
                .await;
            assert!(result.success);
            result.cycle_id.unwrap()
        };

        // A fresh handle over the same file sees the finished cycle.
        let store = Arc::new(DbHandle::new(EngineDb::new(&db_path).unwrap()));
        let cycle = store.get_cycle(cycle_id).await.unwrap().unwrap();
        assert_eq!(cycle.status, CycleStatus::Completed);
        assert_eq!(cycle.artifacts.len(), 5);
        let phases: Vec<Phase> = cycle.artifacts.iter().map(|a| a.phase).collect();
        assert_eq!(phases, Phase::ALL.to_vec());
        assert!(cycle.success_score.is_some());
    }

    /// Provider that fails exactly one named tool and answers the rest.
    struct ScriptedProvider {
        failing_tool: &'static str,
    }

    #[async_trait]
    impl ToolProvider for ScriptedProvider {
        async fn invoke(&self, tool: &str, _params: Value) -> Result<Value, ToolError> {
            if tool == self.failing_tool {
                Err(ToolError::Malformed {
                    tool: tool.to_string(),
                    reason: "truncated response".to_string(),
                })
            } else {
                Ok(json!({"score": 0.85, "tool": tool}))
            }
        }
    }

    #[tokio::test]
    async fn one_bad_tool_degrades_only_that_phase() {
        let store = memory_store();
        let orch = build_orchestrator(
            store.clone(),
            Arc::new(ScriptedProvider {
                failing_tool: "check",
            }),
            CancellationToken::new(),
        );

        let result = orch.run_full_cycle("Ship the feature", json!({}), None).await;
        assert!(result.success);

        let cycle = store
            .get_cycle(result.cycle_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cycle.status, CycleStatus::Completed);
        for artifact in &cycle.artifacts {
            assert_eq!(artifact.used_fallback, artifact.phase == Phase::Check);
        }
    }

    #[tokio::test]
    async fn rescoring_stored_artifacts_reproduces_the_score() {
        let store = memory_store();
        let orch = build_orchestrator(
            store.clone(),
            Arc::new(NullToolProvider),
            CancellationToken::new(),
        );

        let result = orch
            .run_full_cycle("Audit error handling in the parser", json!({}), None)
            .await;
        let cycle = store
            .get_cycle(result.cycle_id.unwrap())
            .await
            .unwrap()
            .unwrap();

        let scorer = QualityScorer::weighted(PhaseWeights::default());
        let rescored = scorer.score(&cycle.artifacts);
        assert_eq!(Some(rescored), cycle.success_score);
        assert_eq!(result.final_score, cycle.success_score);
    }
}

mod store_faults {
    use super::*;

    /// Delegates to a real store but errors at a chosen write.
    struct FailingStore {
        inner: Arc<DbHandle>,
        fail_on: Option<Phase>,
        fail_completion: bool,
    }

    #[async_trait]
    impl CycleStore for FailingStore {
        async fn create_cycle(
            &self,
            goal: &str,
            parameters: Value,
            parent_cycle_id: Option<i64>,
        ) -> Result<Cycle, StoreError> {
            self.inner.create_cycle(goal, parameters, parent_cycle_id).await
        }
        async fn get_cycle(&self, id: i64) -> Result<Option<Cycle>, StoreError> {
            self.inner.get_cycle(id).await
        }
        async fn record_phase(
            &self,
            cycle_id: i64,
            artifact: PhaseArtifact,
        ) -> Result<(), StoreError> {
            if self.fail_on == Some(artifact.phase) {
                return Err(StoreError::Other(anyhow::anyhow!("disk full")));
            }
            self.inner.record_phase(cycle_id, artifact).await
        }
        async fn complete_cycle(
            &self,
            id: i64,
            score: f64,
            lessons: &str,
        ) -> Result<Cycle, StoreError> {
            if self.fail_completion {
                return Err(StoreError::Other(anyhow::anyhow!("disk full at completion")));
            }
            self.inner.complete_cycle(id, score, lessons).await
        }
        async fn fail_cycle(&self, id: i64, error: &str) -> Result<Cycle, StoreError> {
            self.inner.fail_cycle(id, error).await
        }
        async fn get_active_cycles(&self) -> Result<Vec<Cycle>, StoreError> {
            self.inner.get_active_cycles().await
        }
        async fn get_recent_cycles(&self, n: usize) -> Result<Vec<Cycle>, StoreError> {
            self.inner.get_recent_cycles(n).await
        }
        async fn get_recent_completed(&self, n: usize) -> Result<Vec<Cycle>, StoreError> {
            self.inner.get_recent_completed(n).await
        }
        async fn create_task(&self, new: NewTask) -> Result<Task, StoreError> {
            self.inner.create_task(new).await
        }
        async fn claim_pending_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
            self.inner.claim_pending_tasks(limit).await
        }
        async fn bind_task_cycle(&self, task_id: i64, cycle_id: i64) -> Result<(), StoreError> {
            self.inner.bind_task_cycle(task_id, cycle_id).await
        }
        async fn complete_task(&self, id: i64, result: Value) -> Result<Task, StoreError> {
            self.inner.complete_task(id, result).await
        }
        async fn fail_task(&self, id: i64) -> Result<Task, StoreError> {
            self.inner.fail_task(id).await
        }
        async fn requeue_task(&self, id: i64) -> Result<Task, StoreError> {
            self.inner.requeue_task(id).await
        }
        async fn create_trigger(&self, new: NewTrigger) -> Result<EvolutionTrigger, StoreError> {
            self.inner.create_trigger(new).await
        }
        async fn list_active_triggers(&self) -> Result<Vec<EvolutionTrigger>, StoreError> {
            self.inner.list_active_triggers().await
        }
        async fn fire_trigger(&self, id: i64) -> Result<EvolutionTrigger, StoreError> {
            self.inner.fire_trigger(id).await
        }
        async fn record_assessment(
            &self,
            new: kaizen::store::models::NewAssessment,
        ) -> Result<SelfAssessment, StoreError> {
            self.inner.record_assessment(new).await
        }
    }

    #[tokio::test]
    async fn persistence_fault_fails_the_cycle_with_a_clean_prefix() {
        let inner = memory_store();
        let store = Arc::new(FailingStore {
            inner: inner.clone(),
            fail_on: Some(Phase::Check),
            fail_completion: false,
        });
        let orch = build_orchestrator(
            store,
            Arc::new(NullToolProvider),
            CancellationToken::new(),
        );

        let result = orch.run_full_cycle("goal", json!({}), None).await;
        assert!(!result.success);
        assert!(result.error_message.is_some());

        let cycle = inner
            .get_cycle(result.cycle_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cycle.status, CycleStatus::Failed);
        // Only the phases recorded before the fault survive, in order.
        let phases: Vec<Phase> = cycle.artifacts.iter().map(|a| a.phase).collect();
        assert_eq!(phases, vec![Phase::Plan, Phase::Make]);
        assert!(cycle.success_score.is_none());
    }

    #[tokio::test]
    async fn completion_fault_still_ends_the_cycle_terminal() {
        let inner = memory_store();
        let store = Arc::new(FailingStore {
            inner: inner.clone(),
            fail_on: None,
            fail_completion: true,
        });
        let orch = build_orchestrator(
            store,
            Arc::new(NullToolProvider),
            CancellationToken::new(),
        );

        let result = orch.run_full_cycle("goal", json!({}), None).await;
        assert!(!result.success);
        assert!(result.final_score.is_none());

        // All five phases were recorded, but completion could not be
        // persisted; the cycle must not stay parked in optimizing.
        let cycle = inner
            .get_cycle(result.cycle_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cycle.status, CycleStatus::Failed);
        assert_eq!(cycle.artifacts.len(), 5);
        assert!(cycle.success_score.is_none());
        assert!(inner.get_active_cycles().await.unwrap().is_empty());
    }
}

mod evolution_loop {
    use super::*;

    fn scheduler_over(store: Arc<DbHandle>, cfg: SchedulerConfig) -> Scheduler {
        let triggers = Arc::new(TriggerEvaluator::new(
            store.clone(),
            QualityScorer::weighted(PhaseWeights::default()),
            TriggersConfig::default(),
            80.0,
        ));
        let orchestrator = build_orchestrator(
            store.clone(),
            Arc::new(NullToolProvider),
            CancellationToken::new(),
        );
        Scheduler::new(store, orchestrator, triggers, cfg, CancellationToken::new())
    }

    #[tokio::test]
    async fn low_quality_spawns_an_evolution_task_that_runs_next() {
        let store = memory_store();
        // Threshold above any achievable score, one completed cycle is
        // enough: the rule fires as soon as the first cycle finishes.
        store
            .create_trigger(NewTrigger {
                name: "always-improve".into(),
                description: "".into(),
                trigger_type: TriggerType::QualityThreshold,
                conditions: json!({"threshold": 101.0, "window": 5, "min_cycles": 1}),
                actions: json!({"tasks": [{
                    "name": "tighten-checks",
                    "kind": "evolution",
                    "description": "Review recent check-phase output"
                }]}),
            })
            .await
            .unwrap();
        store
            .create_task(NewTask {
                name: "routine-work".into(),
                kind: "routine".into(),
                description: "Update the changelog".into(),
                priority: 5,
                parameters: json!({}),
            })
            .await
            .unwrap();

        let cfg = SchedulerConfig {
            batch_size: 1,
            ..SchedulerConfig::default()
        };
        let scheduler = scheduler_over(store.clone(), cfg);

        assert_eq!(scheduler.run_pending_batch().await, 1);

        let tasks = store.lock_sync().unwrap().list_tasks(10).unwrap();
        let routine = tasks.iter().find(|t| t.name == "routine-work").unwrap();
        assert_eq!(routine.status, TaskStatus::Completed);
        let evolution = tasks.iter().find(|t| t.name == "tighten-checks").unwrap();
        assert_eq!(evolution.status, TaskStatus::Pending);
        assert_eq!(evolution.priority, TriggersConfig::default().evolution_priority);

        // The spawned task is claimed on the next tick.
        assert_eq!(scheduler.run_pending_batch().await, 1);
        let evolution = store
            .lock_sync()
            .unwrap()
            .get_task(evolution.id)
            .unwrap()
            .unwrap();
        assert_eq!(evolution.status, TaskStatus::Completed);
        assert!(evolution.associated_cycle_id.is_some());
    }

    #[tokio::test]
    async fn periodic_sweep_fires_time_rules_and_records_assessments() {
        let store = memory_store();
        store
            .create_trigger(NewTrigger {
                name: "hourly-review".into(),
                description: "".into(),
                trigger_type: TriggerType::TimeBased,
                conditions: json!({"interval_secs": 3600}),
                actions: json!({"tasks": [{"name": "health-check", "kind": "maintenance"}]}),
            })
            .await
            .unwrap();
        let cycle = store.create_cycle("seed", json!({}), None).await.unwrap();
        for phase in Phase::ALL {
            store
                .record_phase(cycle.id, PhaseArtifact::new(phase, json!({}), 0.55, true))
                .await
                .unwrap();
        }
        store.complete_cycle(cycle.id, 55.0, "").await.unwrap();

        let evaluator = TriggerEvaluator::new(
            store.clone(),
            QualityScorer::weighted(PhaseWeights::default()),
            TriggersConfig::default(),
            80.0,
        );
        let now = chrono::Utc::now();

        let spawned = evaluator.evaluate_periodic_at(now).await.unwrap();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].name, "health-check");

        // Still inside the interval on the next sweep.
        let spawned = evaluator
            .evaluate_periodic_at(now + chrono::Duration::seconds(60))
            .await
            .unwrap();
        assert!(spawned.is_empty());

        let assessments = store.lock_sync().unwrap().get_recent_assessments(10).unwrap();
        assert_eq!(assessments.len(), 2);
        assert!(assessments.iter().all(|a| a.overall_score == 55.0));
        assert!(assessments.iter().all(|a| a.requires_improvement));
    }
}
