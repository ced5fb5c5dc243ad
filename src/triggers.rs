//! Evolution triggers: standing rules that spawn follow-up tasks.
//!
//! The evaluator runs in two modes: per-cycle (quality-threshold and
//! event-driven rules, right after a cycle finishes) and periodic
//! (time-based rules plus a batch self-assessment). All trigger mutation
//! goes through the store; the evaluator keeps no state between calls.
//!
//! Evaluation is best-effort: faults are logged and swallowed so they can
//! never invalidate an already-completed cycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::TriggersConfig;
use crate::errors::StoreError;
use crate::scorer::QualityScorer;
use crate::store::models::{Cycle, EvolutionTrigger, NewTask, Task, TriggerType};
use crate::store::CycleStore;

/// Parameters of a quality-threshold rule, read from its `conditions`.
#[derive(Debug, Clone, Deserialize)]
struct QualityConditions {
    #[serde(default = "default_threshold")]
    threshold: f64,
    /// Completed cycles to average over; engine default when absent.
    window: Option<usize>,
    /// Minimum completed cycles before the rule may fire; defaults to the
    /// window so a cold-start store never fires.
    min_cycles: Option<usize>,
}

fn default_threshold() -> f64 {
    75.0
}

/// Parameters of a time-based rule.
#[derive(Debug, Clone, Default, Deserialize)]
struct TimeConditions {
    interval_secs: Option<i64>,
}

/// Parameters of an event-driven rule.
#[derive(Debug, Clone, Deserialize)]
struct EventConditions {
    event: String,
}

/// The `actions` payload: what tasks a firing spawns.
#[derive(Debug, Clone, Default, Deserialize)]
struct TriggerActions {
    #[serde(default)]
    tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct TaskSpec {
    name: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: Value,
    priority: Option<i64>,
}

/// Inspects completed cycles and system health against the active rules.
pub struct TriggerEvaluator {
    store: Arc<dyn CycleStore>,
    scorer: QualityScorer,
    cfg: TriggersConfig,
    /// Floor for periodic batch assessments.
    quality_floor: f64,
}

impl TriggerEvaluator {
    pub fn new(
        store: Arc<dyn CycleStore>,
        scorer: QualityScorer,
        cfg: TriggersConfig,
        quality_floor: f64,
    ) -> Self {
        Self {
            store,
            scorer,
            cfg,
            quality_floor,
        }
    }

    /// Evaluate single-cycle rules after a cycle reaches a terminal state.
    /// `event`, when supplied, additionally arms event-driven rules.
    pub async fn evaluate_cycle(&self, cycle: &Cycle, event: Option<&str>) -> Vec<Task> {
        match self.try_evaluate_cycle(cycle, event).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(cycle_id = cycle.id, error = %e, "trigger evaluation failed");
                Vec::new()
            }
        }
    }

    /// Periodic sweep: time-based rules and a batch self-assessment.
    pub async fn evaluate_periodic(&self) -> Vec<Task> {
        match self.evaluate_periodic_at(Utc::now()).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "periodic trigger sweep failed");
                Vec::new()
            }
        }
    }

    async fn try_evaluate_cycle(
        &self,
        cycle: &Cycle,
        event: Option<&str>,
    ) -> Result<Vec<Task>, StoreError> {
        let mut spawned = Vec::new();
        for trigger in self.store.list_active_triggers().await? {
            let fires = match trigger.trigger_type {
                TriggerType::QualityThreshold => self.quality_rule_fires(&trigger).await?,
                TriggerType::EventDriven => Self::event_rule_fires(&trigger, event),
                TriggerType::TimeBased => false,
            };
            if fires {
                info!(
                    trigger = %trigger.name,
                    cycle_id = cycle.id,
                    "evolution trigger fired"
                );
                spawned.extend(self.fire(&trigger).await?);
            }
        }
        Ok(spawned)
    }

    /// Sweep at an explicit point in time. Split out so intervals can be
    /// simulated deterministically.
    pub async fn evaluate_periodic_at(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let mut spawned = Vec::new();
        for trigger in self.store.list_active_triggers().await? {
            if trigger.trigger_type != TriggerType::TimeBased {
                continue;
            }
            if self.time_rule_due(&trigger, now) {
                info!(trigger = %trigger.name, "time-based trigger due");
                spawned.extend(self.fire(&trigger).await?);
            }
        }
        self.record_batch_assessment().await?;
        Ok(spawned)
    }

    async fn quality_rule_fires(&self, trigger: &EvolutionTrigger) -> Result<bool, StoreError> {
        let cond: QualityConditions = match serde_json::from_value(trigger.conditions.clone()) {
            Ok(c) => c,
            Err(e) => {
                warn!(trigger = %trigger.name, error = %e, "unparseable quality conditions");
                return Ok(false);
            }
        };
        let window = cond.window.unwrap_or(self.cfg.quality_window);
        let min_cycles = cond.min_cycles.unwrap_or(window);
        let completed = self.store.get_recent_completed(window).await?;
        if completed.len() < min_cycles.max(1) {
            return Ok(false);
        }
        let scores: Vec<f64> = completed.iter().filter_map(|c| c.success_score).collect();
        if scores.is_empty() {
            return Ok(false);
        }
        let avg = scores.iter().sum::<f64>() / scores.len() as f64;
        Ok(avg < cond.threshold)
    }

    fn event_rule_fires(trigger: &EvolutionTrigger, event: Option<&str>) -> bool {
        let Some(event) = event else {
            return false;
        };
        match serde_json::from_value::<EventConditions>(trigger.conditions.clone()) {
            Ok(cond) => cond.event == event,
            Err(e) => {
                warn!(trigger = %trigger.name, error = %e, "unparseable event conditions");
                false
            }
        }
    }

    fn time_rule_due(&self, trigger: &EvolutionTrigger, now: DateTime<Utc>) -> bool {
        let cond: TimeConditions =
            serde_json::from_value(trigger.conditions.clone()).unwrap_or_default();
        let interval = cond
            .interval_secs
            .unwrap_or(self.cfg.default_time_interval_secs);
        match &trigger.last_triggered_at {
            // Never fired before: due immediately.
            None => true,
            Some(ts) => match DateTime::parse_from_rfc3339(ts) {
                Ok(last) => (now - last.with_timezone(&Utc)).num_seconds() >= interval,
                Err(e) => {
                    warn!(trigger = %trigger.name, error = %e, "bad last_triggered_at, treating as due");
                    true
                }
            },
        }
    }

    /// Record the firing atomically, then spawn the tasks its actions
    /// describe, at elevated priority.
    async fn fire(&self, trigger: &EvolutionTrigger) -> Result<Vec<Task>, StoreError> {
        self.store.fire_trigger(trigger.id).await?;
        let actions: TriggerActions = match serde_json::from_value(trigger.actions.clone()) {
            Ok(a) => a,
            Err(e) => {
                warn!(trigger = %trigger.name, error = %e, "unparseable actions payload");
                TriggerActions::default()
            }
        };
        let mut tasks = Vec::new();
        for spec in actions.tasks {
            let task = self
                .store
                .create_task(NewTask {
                    name: spec.name,
                    kind: spec.kind,
                    description: spec.description,
                    priority: spec.priority.unwrap_or(self.cfg.evolution_priority),
                    parameters: spec.parameters,
                })
                .await?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    async fn record_batch_assessment(&self) -> Result<(), StoreError> {
        let recent = self
            .store
            .get_recent_completed(self.cfg.quality_window)
            .await?;
        if recent.is_empty() {
            return Ok(());
        }
        let assessment = self.scorer.assess_batch(&recent, self.quality_floor);
        self.store.record_assessment(assessment).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Phase, PhaseArtifact};
    use crate::scorer::PhaseWeights;
    use crate::store::models::{NewTrigger, TaskStatus};
    use crate::store::{DbHandle, EngineDb};
    use chrono::Duration;
    use serde_json::json;

    fn evaluator(store: Arc<DbHandle>) -> TriggerEvaluator {
        TriggerEvaluator::new(
            store,
            QualityScorer::weighted(PhaseWeights::default()),
            TriggersConfig::default(),
            80.0,
        )
    }

    async fn completed_cycle(store: &DbHandle, score: f64) -> Cycle {
        let cycle = store.create_cycle("seed", json!({}), None).await.unwrap();
        for phase in Phase::ALL {
            store
                .record_phase(cycle.id, PhaseArtifact::new(phase, json!({}), score / 100.0, true))
                .await
                .unwrap();
        }
        store.complete_cycle(cycle.id, score, "seeded").await.unwrap()
    }

    async fn seed_completed_cycles(store: &DbHandle, scores: &[f64]) {
        for score in scores {
            completed_cycle(store, *score).await;
        }
    }

    fn quality_trigger(threshold: f64) -> NewTrigger {
        NewTrigger {
            name: "low-quality".into(),
            description: "fires when recent cycles average below threshold".into(),
            trigger_type: TriggerType::QualityThreshold,
            conditions: json!({"threshold": threshold, "window": 10, "min_cycles": 10}),
            actions: json!({"tasks": [{
                "name": "improve-checks",
                "kind": "evolution",
                "description": "raise check phase quality",
                "parameters": {"focus": "check"}
            }]}),
        }
    }

    #[tokio::test]
    async fn test_quality_trigger_cold_start_never_fires() {
        let store = Arc::new(DbHandle::new(EngineDb::new_in_memory().unwrap()));
        store.create_trigger(quality_trigger(80.0)).await.unwrap();
        seed_completed_cycles(&store, &[10.0, 20.0, 30.0]).await;

        let cycle = completed_cycle(&store, 10.0).await;

        let ev = evaluator(store.clone());
        let tasks = ev.evaluate_cycle(&cycle, None).await;
        assert!(tasks.is_empty());
        let triggers = store.lock_sync().unwrap().list_triggers().unwrap();
        assert_eq!(triggers[0].trigger_count, 0);
        assert!(triggers[0].last_triggered_at.is_none());
    }

    #[tokio::test]
    async fn test_quality_trigger_fires_once_per_evaluation() {
        let store = Arc::new(DbHandle::new(EngineDb::new_in_memory().unwrap()));
        store.create_trigger(quality_trigger(80.0)).await.unwrap();
        // 12 completed cycles averaging 75, below the floor of 80.
        seed_completed_cycles(&store, &[75.0; 12]).await;
        let cycle = store.get_recent_completed(1).await.unwrap().remove(0);

        let ev = evaluator(store.clone());
        let tasks = ev.evaluate_cycle(&cycle, None).await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "improve-checks");
        assert_eq!(tasks[0].kind, "evolution");
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert_eq!(tasks[0].parameters, json!({"focus": "check"}));
        // Elevated above the routine default of 5.
        assert_eq!(tasks[0].priority, TriggersConfig::default().evolution_priority);

        let tasks = ev.evaluate_cycle(&cycle, None).await;
        assert_eq!(tasks.len(), 1);

        let triggers = store.lock_sync().unwrap().list_triggers().unwrap();
        assert_eq!(triggers[0].trigger_count, 2);
    }

    #[tokio::test]
    async fn test_quality_trigger_quiet_when_scores_healthy() {
        let store = Arc::new(DbHandle::new(EngineDb::new_in_memory().unwrap()));
        store.create_trigger(quality_trigger(80.0)).await.unwrap();
        seed_completed_cycles(&store, &[90.0; 12]).await;
        let cycle = store.get_recent_completed(1).await.unwrap().remove(0);

        let ev = evaluator(store.clone());
        assert!(ev.evaluate_cycle(&cycle, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_time_trigger_first_evaluation_is_due() {
        let store = Arc::new(DbHandle::new(EngineDb::new_in_memory().unwrap()));
        let trigger = store
            .create_trigger(NewTrigger {
                name: "nightly".into(),
                description: "".into(),
                trigger_type: TriggerType::TimeBased,
                conditions: json!({"interval_secs": 3600}),
                actions: json!({"tasks": [{"name": "sweep", "kind": "maintenance"}]}),
            })
            .await
            .unwrap();

        let ev = evaluator(store.clone());
        let now = Utc::now();

        let tasks = ev.evaluate_periodic_at(now).await.unwrap();
        assert_eq!(tasks.len(), 1);

        // Within the interval: quiet. Past it: fires again.
        let tasks = ev
            .evaluate_periodic_at(now + Duration::seconds(600))
            .await
            .unwrap();
        assert!(tasks.is_empty());
        let tasks = ev
            .evaluate_periodic_at(now + Duration::seconds(7200))
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);

        let fired = store.lock_sync().unwrap().get_trigger(trigger.id).unwrap().unwrap();
        assert_eq!(fired.trigger_count, 2);
    }

    #[tokio::test]
    async fn test_event_trigger_requires_matching_signal() {
        let store = Arc::new(DbHandle::new(EngineDb::new_in_memory().unwrap()));
        store
            .create_trigger(NewTrigger {
                name: "on-regression".into(),
                description: "".into(),
                trigger_type: TriggerType::EventDriven,
                conditions: json!({"event": "regression_detected"}),
                actions: json!({"tasks": [{"name": "bisect", "kind": "evolution"}]}),
            })
            .await
            .unwrap();
        let cycle = completed_cycle(&store, 90.0).await;

        let ev = evaluator(store.clone());
        assert!(ev.evaluate_cycle(&cycle, None).await.is_empty());
        assert!(ev
            .evaluate_cycle(&cycle, Some("unrelated_event"))
            .await
            .is_empty());
        let tasks = ev
            .evaluate_cycle(&cycle, Some("regression_detected"))
            .await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "bisect");
    }

    #[tokio::test]
    async fn test_inactive_trigger_is_never_evaluated() {
        let store = Arc::new(DbHandle::new(EngineDb::new_in_memory().unwrap()));
        let trigger = store
            .create_trigger(NewTrigger {
                name: "disabled".into(),
                description: "".into(),
                trigger_type: TriggerType::TimeBased,
                conditions: json!({}),
                actions: json!({"tasks": [{"name": "never"}]}),
            })
            .await
            .unwrap();
        store
            .lock_sync()
            .unwrap()
            .set_trigger_active(trigger.id, false)
            .unwrap();

        let ev = evaluator(store.clone());
        assert!(ev.evaluate_periodic_at(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_periodic_sweep_records_batch_assessment() {
        let store = Arc::new(DbHandle::new(EngineDb::new_in_memory().unwrap()));
        seed_completed_cycles(&store, &[60.0, 70.0]).await;

        let ev = evaluator(store.clone());
        ev.evaluate_periodic_at(Utc::now()).await.unwrap();

        let assessments = store.lock_sync().unwrap().get_recent_assessments(5).unwrap();
        assert_eq!(assessments.len(), 1);
        assert_eq!(assessments[0].overall_score, 65.0);
        assert!(assessments[0].requires_improvement);
    }
}
