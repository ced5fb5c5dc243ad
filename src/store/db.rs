use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::models::*;
use crate::errors::StoreError;
use crate::phase::{Phase, PhaseArtifact};

type Result<T> = std::result::Result<T, StoreError>;

/// Async-safe handle to the engine database.
///
/// Wraps `EngineDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads. The mutex also serializes all
/// writes, which is what makes the trigger counter read-modify-write and
/// per-cycle phase recording atomic.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<EngineDb>>,
}

impl DbHandle {
    pub fn new(db: EngineDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&EngineDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Other(anyhow!("DB task panicked: {}", e)))?
    }

    /// Acquire the database mutex synchronously. Used for startup seeding
    /// and tests; must not be called from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, EngineDb>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

pub struct EngineDb {
    conn: Connection,
}

impl EngineDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Database(anyhow!("Failed to open database: {}", e)))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Database(anyhow!("Failed to open in-memory database: {}", e)))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS cycles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    status TEXT NOT NULL DEFAULT 'planning',
                    goal TEXT NOT NULL,
                    parameters TEXT NOT NULL DEFAULT '{}',
                    success_score REAL,
                    lessons_learned TEXT,
                    parent_cycle_id INTEGER REFERENCES cycles(id),
                    started_at TEXT NOT NULL,
                    ended_at TEXT
                );

                CREATE TABLE IF NOT EXISTS phase_artifacts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    cycle_id INTEGER NOT NULL REFERENCES cycles(id) ON DELETE CASCADE,
                    phase TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    score REAL NOT NULL,
                    used_fallback INTEGER NOT NULL DEFAULT 0,
                    recorded_at TEXT NOT NULL,
                    UNIQUE(cycle_id, phase)
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    kind TEXT NOT NULL DEFAULT '',
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'pending',
                    priority INTEGER NOT NULL DEFAULT 5,
                    parameters TEXT NOT NULL DEFAULT '{}',
                    result TEXT,
                    associated_cycle_id INTEGER REFERENCES cycles(id),
                    retry_count INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS triggers (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    trigger_type TEXT NOT NULL,
                    conditions TEXT NOT NULL DEFAULT '{}',
                    actions TEXT NOT NULL DEFAULT '{}',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    last_triggered_at TEXT,
                    trigger_count INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS assessments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at TEXT NOT NULL,
                    assessment_type TEXT NOT NULL,
                    overall_score REAL NOT NULL,
                    strengths TEXT NOT NULL DEFAULT '[]',
                    weaknesses TEXT NOT NULL DEFAULT '[]',
                    improvement_areas TEXT NOT NULL DEFAULT '[]',
                    requires_improvement INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_cycles_status ON cycles(status);
                CREATE INDEX IF NOT EXISTS idx_cycles_started ON cycles(started_at);
                CREATE INDEX IF NOT EXISTS idx_artifacts_cycle ON phase_artifacts(cycle_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status, priority);
                CREATE INDEX IF NOT EXISTS idx_triggers_active ON triggers(is_active);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Cycle operations ──────────────────────────────────────────────

    pub fn create_cycle(
        &self,
        goal: &str,
        parameters: &Value,
        parent_cycle_id: Option<i64>,
    ) -> Result<Cycle> {
        if let Some(parent) = parent_cycle_id {
            // Parent is a weak reference but must at least exist.
            self.get_cycle(parent)?
                .ok_or(StoreError::CycleNotFound { id: parent })?;
        }
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO cycles (status, goal, parameters, parent_cycle_id, started_at)
             VALUES ('planning', ?1, ?2, ?3, ?4)",
            params![goal, parameters.to_string(), parent_cycle_id, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_cycle(id)?.ok_or(StoreError::CycleNotFound { id })
    }

    pub fn get_cycle(&self, id: i64) -> Result<Option<Cycle>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, status, goal, parameters, success_score, lessons_learned,
                        parent_cycle_id, started_at, ended_at
                 FROM cycles WHERE id = ?1",
                params![id],
                Self::map_cycle_row,
            )
            .optional()?;
        match row {
            Some(mut cycle) => {
                cycle.artifacts = self.load_artifacts(cycle.id)?;
                Ok(Some(cycle))
            }
            None => Ok(None),
        }
    }

    /// Record a phase artifact for a cycle.
    ///
    /// Enforces sequential phase recording: the artifact's phase must be the
    /// immediate successor of the highest phase already recorded (or Plan if
    /// none). On violation nothing is written and the cycle is unchanged.
    pub fn record_phase(&self, cycle_id: i64, artifact: &PhaseArtifact) -> Result<()> {
        let cycle = self
            .get_cycle(cycle_id)?
            .ok_or(StoreError::CycleNotFound { id: cycle_id })?;
        if cycle.status.is_terminal() {
            return Err(StoreError::TerminalCycle {
                id: cycle_id,
                status: cycle.status.to_string(),
            });
        }

        let expected = match cycle.artifacts.last() {
            Some(last) => last.phase.successor(),
            None => Some(Phase::Plan),
        };
        match expected {
            Some(p) if p == artifact.phase => {}
            other => {
                return Err(StoreError::InvalidTransition {
                    cycle_id,
                    expected: other.map(|p| p.to_string()).unwrap_or_else(|| "none".into()),
                    got: artifact.phase.to_string(),
                });
            }
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO phase_artifacts (cycle_id, phase, payload, score, used_fallback, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                cycle_id,
                artifact.phase.as_str(),
                artifact.payload.to_string(),
                artifact.score,
                artifact.used_fallback as i64,
                now
            ],
        )?;

        // Status reflects the phase now executing; after Optimize the cycle
        // stays optimizing until complete_cycle runs.
        let next_status = artifact
            .phase
            .successor()
            .map(CycleStatus::running)
            .unwrap_or(CycleStatus::Optimizing);
        self.conn.execute(
            "UPDATE cycles SET status = ?1 WHERE id = ?2",
            params![next_status.as_str(), cycle_id],
        )?;
        Ok(())
    }

    /// Mark a cycle completed with its final score.
    ///
    /// Only a cycle whose full artifact prefix is recorded (ending in
    /// Optimize) may complete; anything less is failed, not completed.
    pub fn complete_cycle(&self, id: i64, score: f64, lessons: &str) -> Result<Cycle> {
        let cycle = self
            .get_cycle(id)?
            .ok_or(StoreError::CycleNotFound { id })?;
        if cycle.status.is_terminal() {
            return Err(StoreError::TerminalCycle {
                id,
                status: cycle.status.to_string(),
            });
        }
        if cycle.artifacts.last().map(|a| a.phase) != Some(Phase::Optimize) {
            return Err(StoreError::IncompleteCycle {
                id,
                recorded: cycle.artifacts.len(),
            });
        }
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE cycles SET status = 'completed', success_score = ?1,
                    lessons_learned = ?2, ended_at = ?3 WHERE id = ?4",
            params![score.clamp(0.0, 100.0), lessons, now, id],
        )?;
        self.get_cycle(id)?.ok_or(StoreError::CycleNotFound { id })
    }

    pub fn fail_cycle(&self, id: i64, error: &str) -> Result<Cycle> {
        let cycle = self
            .get_cycle(id)?
            .ok_or(StoreError::CycleNotFound { id })?;
        if cycle.status.is_terminal() {
            return Err(StoreError::TerminalCycle {
                id,
                status: cycle.status.to_string(),
            });
        }
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE cycles SET status = 'failed', lessons_learned = ?1, ended_at = ?2
             WHERE id = ?3",
            params![error, now, id],
        )?;
        self.get_cycle(id)?.ok_or(StoreError::CycleNotFound { id })
    }

    pub fn get_active_cycles(&self) -> Result<Vec<Cycle>> {
        self.query_cycles(
            "SELECT id, status, goal, parameters, success_score, lessons_learned,
                    parent_cycle_id, started_at, ended_at
             FROM cycles WHERE status NOT IN ('completed', 'failed')
             ORDER BY started_at DESC, id DESC",
            params![],
        )
    }

    pub fn get_recent_cycles(&self, n: usize) -> Result<Vec<Cycle>> {
        self.query_cycles(
            "SELECT id, status, goal, parameters, success_score, lessons_learned,
                    parent_cycle_id, started_at, ended_at
             FROM cycles ORDER BY started_at DESC, id DESC LIMIT ?1",
            params![n as i64],
        )
    }

    pub fn get_recent_completed(&self, n: usize) -> Result<Vec<Cycle>> {
        self.query_cycles(
            "SELECT id, status, goal, parameters, success_score, lessons_learned,
                    parent_cycle_id, started_at, ended_at
             FROM cycles WHERE status = 'completed'
             ORDER BY started_at DESC, id DESC LIMIT ?1",
            params![n as i64],
        )
    }

    fn query_cycles<P: rusqlite::Params>(&self, sql: &str, p: P) -> Result<Vec<Cycle>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(p, Self::map_cycle_row)?;
        let mut cycles = Vec::new();
        for row in rows {
            let mut cycle = row?;
            cycle.artifacts = self.load_artifacts(cycle.id)?;
            cycles.push(cycle);
        }
        Ok(cycles)
    }

    fn map_cycle_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Cycle> {
        let status_str: String = row.get(1)?;
        let params_str: String = row.get(3)?;
        Ok(Cycle {
            id: row.get(0)?,
            status: CycleStatus::from_str(&status_str).unwrap_or(CycleStatus::Failed),
            goal: row.get(2)?,
            parameters: serde_json::from_str(&params_str).unwrap_or(Value::Null),
            artifacts: Vec::new(),
            success_score: row.get(4)?,
            lessons_learned: row.get(5)?,
            parent_cycle_id: row.get(6)?,
            started_at: row.get(7)?,
            ended_at: row.get(8)?,
        })
    }

    fn load_artifacts(&self, cycle_id: i64) -> Result<Vec<PhaseArtifact>> {
        let mut stmt = self.conn.prepare(
            "SELECT phase, payload, score, used_fallback FROM phase_artifacts
             WHERE cycle_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![cycle_id], |row| {
            let phase_str: String = row.get(0)?;
            let payload_str: String = row.get(1)?;
            let used_fallback: i64 = row.get(3)?;
            Ok((phase_str, payload_str, row.get::<_, f64>(2)?, used_fallback))
        })?;
        let mut artifacts = Vec::new();
        for row in rows {
            let (phase_str, payload_str, score, used_fallback) = row?;
            let phase = Phase::from_str(&phase_str)
                .map_err(|e| StoreError::Other(anyhow!("Corrupt artifact row: {}", e)))?;
            let payload = serde_json::from_str(&payload_str)
                .with_context(|| format!("Corrupt artifact payload for cycle {}", cycle_id))?;
            artifacts.push(PhaseArtifact {
                phase,
                payload,
                score,
                used_fallback: used_fallback != 0,
            });
        }
        Ok(artifacts)
    }

    // ── Task operations ───────────────────────────────────────────────

    pub fn create_task(&self, new: &NewTask) -> Result<Task> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO tasks (name, kind, description, priority, parameters, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                new.name,
                new.kind,
                new.description,
                new.priority,
                new.parameters.to_string(),
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_task(id)?.ok_or(StoreError::TaskNotFound { id })
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, kind, description, status, priority, parameters, result,
                        associated_cycle_id, retry_count, created_at, updated_at
                 FROM tasks WHERE id = ?1",
                params![id],
                Self::map_task_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, kind, description, status, priority, parameters, result,
                    associated_cycle_id, retry_count, created_at, updated_at
             FROM tasks ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], Self::map_task_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Claim up to `limit` pending tasks, highest priority first, and mark
    /// them in-progress. Select-then-update runs under the handle's mutex,
    /// so no task can be claimed twice.
    pub fn claim_pending_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, kind, description, status, priority, parameters, result,
                    associated_cycle_id, retry_count, created_at, updated_at
             FROM tasks WHERE status = 'pending'
             ORDER BY priority DESC, id ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], Self::map_task_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        let now = Utc::now().to_rfc3339();
        for task in &mut tasks {
            self.conn.execute(
                "UPDATE tasks SET status = 'in_progress', updated_at = ?1 WHERE id = ?2",
                params![now, task.id],
            )?;
            task.status = TaskStatus::InProgress;
            task.updated_at = now.clone();
        }
        Ok(tasks)
    }

    pub fn bind_task_cycle(&self, task_id: i64, cycle_id: i64) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE tasks SET associated_cycle_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![cycle_id, Utc::now().to_rfc3339(), task_id],
        )?;
        if updated == 0 {
            return Err(StoreError::TaskNotFound { id: task_id });
        }
        Ok(())
    }

    pub fn complete_task(&self, id: i64, result: &Value) -> Result<Task> {
        let updated = self.conn.execute(
            "UPDATE tasks SET status = 'completed', result = ?1, updated_at = ?2 WHERE id = ?3",
            params![result.to_string(), Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::TaskNotFound { id });
        }
        self.get_task(id)?.ok_or(StoreError::TaskNotFound { id })
    }

    /// Mark a task failed and bump its retry count. Requeueing is the
    /// scheduler's decision, not the task's.
    pub fn fail_task(&self, id: i64) -> Result<Task> {
        let updated = self.conn.execute(
            "UPDATE tasks SET status = 'failed', retry_count = retry_count + 1,
                    updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::TaskNotFound { id });
        }
        self.get_task(id)?.ok_or(StoreError::TaskNotFound { id })
    }

    pub fn requeue_task(&self, id: i64) -> Result<Task> {
        let updated = self.conn.execute(
            "UPDATE tasks SET status = 'pending', updated_at = ?1
             WHERE id = ?2 AND status = 'failed'",
            params![Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::TaskNotFound { id });
        }
        self.get_task(id)?.ok_or(StoreError::TaskNotFound { id })
    }

    fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
        let status_str: String = row.get(4)?;
        let params_str: String = row.get(6)?;
        let result_str: Option<String> = row.get(7)?;
        Ok(Task {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            description: row.get(3)?,
            status: TaskStatus::from_str(&status_str).unwrap_or(TaskStatus::Failed),
            priority: row.get(5)?,
            parameters: serde_json::from_str(&params_str).unwrap_or(Value::Null),
            result: result_str.and_then(|s| serde_json::from_str(&s).ok()),
            associated_cycle_id: row.get(8)?,
            retry_count: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    // ── Trigger operations ────────────────────────────────────────────

    pub fn create_trigger(&self, new: &NewTrigger) -> Result<EvolutionTrigger> {
        self.conn.execute(
            "INSERT INTO triggers (name, description, trigger_type, conditions, actions)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.name,
                new.description,
                new.trigger_type.as_str(),
                new.conditions.to_string(),
                new.actions.to_string()
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_trigger(id)?
            .ok_or(StoreError::TriggerNotFound { id })
    }

    pub fn get_trigger(&self, id: i64) -> Result<Option<EvolutionTrigger>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, description, trigger_type, conditions, actions,
                        is_active, last_triggered_at, trigger_count
                 FROM triggers WHERE id = ?1",
                params![id],
                Self::map_trigger_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_triggers(&self) -> Result<Vec<EvolutionTrigger>> {
        self.query_triggers(
            "SELECT id, name, description, trigger_type, conditions, actions,
                    is_active, last_triggered_at, trigger_count
             FROM triggers ORDER BY id",
        )
    }

    pub fn list_active_triggers(&self) -> Result<Vec<EvolutionTrigger>> {
        self.query_triggers(
            "SELECT id, name, description, trigger_type, conditions, actions,
                    is_active, last_triggered_at, trigger_count
             FROM triggers WHERE is_active = 1 ORDER BY id",
        )
    }

    fn query_triggers(&self, sql: &str) -> Result<Vec<EvolutionTrigger>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], Self::map_trigger_row)?;
        let mut triggers = Vec::new();
        for row in rows {
            triggers.push(row?);
        }
        Ok(triggers)
    }

    /// Record a firing: bump the counter and stamp the time in one UPDATE,
    /// so concurrent sweep and event evaluations never lose an increment.
    pub fn fire_trigger(&self, id: i64) -> Result<EvolutionTrigger> {
        let updated = self.conn.execute(
            "UPDATE triggers SET trigger_count = trigger_count + 1, last_triggered_at = ?1
             WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::TriggerNotFound { id });
        }
        self.get_trigger(id)?
            .ok_or(StoreError::TriggerNotFound { id })
    }

    pub fn set_trigger_active(&self, id: i64, active: bool) -> Result<EvolutionTrigger> {
        let updated = self.conn.execute(
            "UPDATE triggers SET is_active = ?1 WHERE id = ?2",
            params![active as i64, id],
        )?;
        if updated == 0 {
            return Err(StoreError::TriggerNotFound { id });
        }
        self.get_trigger(id)?
            .ok_or(StoreError::TriggerNotFound { id })
    }

    fn map_trigger_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EvolutionTrigger> {
        let type_str: String = row.get(3)?;
        let conditions_str: String = row.get(4)?;
        let actions_str: String = row.get(5)?;
        let is_active: i64 = row.get(6)?;
        Ok(EvolutionTrigger {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            trigger_type: TriggerType::from_str(&type_str).unwrap_or(TriggerType::EventDriven),
            conditions: serde_json::from_str(&conditions_str).unwrap_or(Value::Null),
            actions: serde_json::from_str(&actions_str).unwrap_or(Value::Null),
            is_active: is_active != 0,
            last_triggered_at: row.get(7)?,
            trigger_count: row.get(8)?,
        })
    }

    // ── Assessment operations ─────────────────────────────────────────

    pub fn record_assessment(&self, new: &NewAssessment) -> Result<SelfAssessment> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO assessments (created_at, assessment_type, overall_score,
                    strengths, weaknesses, improvement_areas, requires_improvement)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                now,
                new.assessment_type,
                new.overall_score.clamp(0.0, 100.0),
                serde_json::to_string(&new.strengths).unwrap_or_else(|_| "[]".into()),
                serde_json::to_string(&new.weaknesses).unwrap_or_else(|_| "[]".into()),
                serde_json::to_string(&new.improvement_areas).unwrap_or_else(|_| "[]".into()),
                new.requires_improvement as i64
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        let assessment = self
            .conn
            .query_row(
                "SELECT id, created_at, assessment_type, overall_score, strengths,
                        weaknesses, improvement_areas, requires_improvement
                 FROM assessments WHERE id = ?1",
                params![id],
                Self::map_assessment_row,
            )
            .optional()?;
        assessment.ok_or(StoreError::Other(anyhow!("Assessment not found after insert")))
    }

    pub fn get_recent_assessments(&self, n: usize) -> Result<Vec<SelfAssessment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, assessment_type, overall_score, strengths,
                    weaknesses, improvement_areas, requires_improvement
             FROM assessments ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![n as i64], Self::map_assessment_row)?;
        let mut assessments = Vec::new();
        for row in rows {
            assessments.push(row?);
        }
        Ok(assessments)
    }

    fn map_assessment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SelfAssessment> {
        let strengths: String = row.get(4)?;
        let weaknesses: String = row.get(5)?;
        let areas: String = row.get(6)?;
        let requires: i64 = row.get(7)?;
        Ok(SelfAssessment {
            id: row.get(0)?,
            created_at: row.get(1)?,
            assessment_type: row.get(2)?,
            overall_score: row.get(3)?,
            strengths: serde_json::from_str(&strengths).unwrap_or_default(),
            weaknesses: serde_json::from_str(&weaknesses).unwrap_or_default(),
            improvement_areas: serde_json::from_str(&areas).unwrap_or_default(),
            requires_improvement: requires != 0,
        })
    }
}
