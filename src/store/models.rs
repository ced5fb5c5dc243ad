use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::phase::{Phase, PhaseArtifact};

/// Lifecycle status of a cycle. The five running states mirror the phase
/// currently being executed; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Planning,
    Making,
    Checking,
    Reflecting,
    Optimizing,
    Completed,
    Failed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Making => "making",
            Self::Checking => "checking",
            Self::Reflecting => "reflecting",
            Self::Optimizing => "optimizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The running status in which the given phase executes.
    pub fn running(phase: Phase) -> Self {
        match phase {
            Phase::Plan => Self::Planning,
            Phase::Make => Self::Making,
            Phase::Check => Self::Checking,
            Phase::Reflect => Self::Reflecting,
            Phase::Optimize => Self::Optimizing,
        }
    }
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planning" => Ok(Self::Planning),
            "making" => Ok(Self::Making),
            "checking" => Ok(Self::Checking),
            "reflecting" => Ok(Self::Reflecting),
            "optimizing" => Ok(Self::Optimizing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid cycle status: {}", s)),
        }
    }
}

/// One attempt to carry a unit of work through all five phases.
///
/// Mutated only by the orchestrator through the store. `artifacts` is
/// ordered by execution; its phases always form a prefix of the canonical
/// order consistent with `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: i64,
    pub status: CycleStatus,
    pub goal: String,
    pub parameters: Value,
    pub artifacts: Vec<PhaseArtifact>,
    /// Valid only when `status` is `Completed`.
    pub success_score: Option<f64>,
    pub lessons_learned: Option<String>,
    /// Weak back-reference to the cycle this one was derived from.
    pub parent_cycle_id: Option<i64>,
    pub started_at: String,
    pub ended_at: Option<String>,
}

/// Lifecycle status of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// A unit of work queued for execution, independent of any cycle until
/// claimed by the scheduler. Retained indefinitely for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    /// Free-form classification string.
    pub kind: String,
    pub description: String,
    pub status: TaskStatus,
    /// Higher is more urgent.
    pub priority: i64,
    pub parameters: Value,
    pub result: Option<Value>,
    pub associated_cycle_id: Option<i64>,
    pub retry_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for creating a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub kind: String,
    pub description: String,
    pub priority: i64,
    pub parameters: Value,
}

/// Kind of standing rule an evolution trigger expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    QualityThreshold,
    TimeBased,
    EventDriven,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QualityThreshold => "quality_threshold",
            Self::TimeBased => "time_based",
            Self::EventDriven => "event_driven",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quality_threshold" => Ok(Self::QualityThreshold),
            "time_based" => Ok(Self::TimeBased),
            "event_driven" => Ok(Self::EventDriven),
            _ => Err(format!("Invalid trigger type: {}", s)),
        }
    }
}

/// A standing rule that, when satisfied, spawns follow-up tasks.
///
/// `trigger_count` only increases; `last_triggered_at` is set iff the
/// trigger has fired at least once. Mutated only by the trigger evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionTrigger {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub trigger_type: TriggerType,
    /// Opaque rule parameters (thresholds, intervals, event names).
    pub conditions: Value,
    /// Opaque description of the task(s) to spawn on fire.
    pub actions: Value,
    pub is_active: bool,
    pub last_triggered_at: Option<String>,
    pub trigger_count: i64,
}

/// Fields for creating a new trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrigger {
    pub name: String,
    pub description: String,
    pub trigger_type: TriggerType,
    pub conditions: Value,
    pub actions: Value,
}

/// A point-in-time quality measurement over a batch of cycles.
/// Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfAssessment {
    pub id: i64,
    pub created_at: String,
    pub assessment_type: String,
    pub overall_score: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub improvement_areas: Vec<String>,
    /// Derived at creation: score below the quality floor, or any weakness.
    pub requires_improvement: bool,
}

/// Fields for recording a new assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAssessment {
    pub assessment_type: String,
    pub overall_score: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub improvement_areas: Vec<String>,
    pub requires_improvement: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_status_roundtrip() {
        for s in &[
            "planning",
            "making",
            "checking",
            "reflecting",
            "optimizing",
            "completed",
            "failed",
        ] {
            let parsed: CycleStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<CycleStatus>().is_err());
    }

    #[test]
    fn test_cycle_status_terminal() {
        assert!(CycleStatus::Completed.is_terminal());
        assert!(CycleStatus::Failed.is_terminal());
        assert!(!CycleStatus::Planning.is_terminal());
        assert!(!CycleStatus::Optimizing.is_terminal());
    }

    #[test]
    fn test_running_status_for_phase() {
        assert_eq!(CycleStatus::running(Phase::Plan), CycleStatus::Planning);
        assert_eq!(CycleStatus::running(Phase::Make), CycleStatus::Making);
        assert_eq!(CycleStatus::running(Phase::Check), CycleStatus::Checking);
        assert_eq!(CycleStatus::running(Phase::Reflect), CycleStatus::Reflecting);
        assert_eq!(CycleStatus::running(Phase::Optimize), CycleStatus::Optimizing);
    }

    #[test]
    fn test_task_status_roundtrip() {
        for s in &["pending", "in_progress", "completed", "failed"] {
            let parsed: TaskStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_trigger_type_roundtrip() {
        for s in &["quality_threshold", "time_based", "event_driven"] {
            let parsed: TriggerType = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<TriggerType>().is_err());
    }

    #[test]
    fn test_serde_produces_lowercase_strings() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&TriggerType::QualityThreshold).unwrap(),
            "\"quality_threshold\""
        );
        assert_eq!(
            serde_json::to_string(&CycleStatus::Reflecting).unwrap(),
            "\"reflecting\""
        );
    }
}
