//! Phase vocabulary for the kaizen cycle engine.
//!
//! This module provides:
//! - [`Phase`] — the five canonical phases in their fixed order
//! - [`PhaseArtifact`] — the structured output of executing one phase
//! - [`CycleContext`] — the accumulated input handed to each phase
//! - [`CycleDigest`] — a read-only summary of a past cycle for Reflect

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// One of the five canonical cycle phases, in fixed order:
/// Plan → Make → Check → Reflect → Optimize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Plan,
    Make,
    Check,
    Reflect,
    Optimize,
}

impl Phase {
    /// All phases in canonical execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Plan,
        Phase::Make,
        Phase::Check,
        Phase::Reflect,
        Phase::Optimize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Make => "make",
            Self::Check => "check",
            Self::Reflect => "reflect",
            Self::Optimize => "optimize",
        }
    }

    /// Zero-based position in the canonical order.
    pub fn index(&self) -> usize {
        match self {
            Self::Plan => 0,
            Self::Make => 1,
            Self::Check => 2,
            Self::Reflect => 3,
            Self::Optimize => 4,
        }
    }

    /// The phase that must run immediately after this one, if any.
    pub fn successor(&self) -> Option<Phase> {
        Phase::ALL.get(self.index() + 1).copied()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(Self::Plan),
            "make" => Ok(Self::Make),
            "check" => Ok(Self::Check),
            "reflect" => Ok(Self::Reflect),
            "optimize" => Ok(Self::Optimize),
            _ => Err(format!("Invalid phase: {}", s)),
        }
    }
}

/// The structured output produced by executing one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseArtifact {
    pub phase: Phase,
    /// Opaque structured payload; shape depends on the phase.
    pub payload: Value,
    /// Phase-local score contribution in [0, 1].
    pub score: f64,
    /// True when the artifact came from the local deterministic estimator
    /// instead of the external capability provider.
    pub used_fallback: bool,
}

impl PhaseArtifact {
    pub fn new(phase: Phase, payload: Value, score: f64, used_fallback: bool) -> Self {
        Self {
            phase,
            payload,
            score: score.clamp(0.0, 1.0),
            used_fallback,
        }
    }
}

/// Read-only summary of a completed cycle, fed to the Reflect phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleDigest {
    pub cycle_id: i64,
    pub success_score: Option<f64>,
    pub lessons_learned: Option<String>,
    pub started_at: String,
}

/// Everything a phase may read: the original goal and parameters, the
/// ordered artifacts of the prior phases in this cycle, and recent
/// completed-cycle history for Reflect.
#[derive(Debug, Clone, Default)]
pub struct CycleContext {
    pub goal: String,
    pub parameters: Value,
    pub prior: Vec<PhaseArtifact>,
    pub history: Vec<CycleDigest>,
}

impl CycleContext {
    pub fn new(goal: &str, parameters: Value) -> Self {
        Self {
            goal: goal.to_string(),
            parameters,
            prior: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Artifact of an already-executed phase in this cycle, if present.
    pub fn artifact(&self, phase: Phase) -> Option<&PhaseArtifact> {
        self.prior.iter().find(|a| a.phase == phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phase_roundtrip() {
        for s in &["plan", "make", "check", "reflect", "optimize"] {
            let parsed: Phase = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_canonical_order() {
        assert_eq!(Phase::Plan.successor(), Some(Phase::Make));
        assert_eq!(Phase::Make.successor(), Some(Phase::Check));
        assert_eq!(Phase::Check.successor(), Some(Phase::Reflect));
        assert_eq!(Phase::Reflect.successor(), Some(Phase::Optimize));
        assert_eq!(Phase::Optimize.successor(), None);
        for (i, p) in Phase::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
    }

    #[test]
    fn test_phase_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Phase::Plan).unwrap(), "\"plan\"");
        assert_eq!(
            serde_json::from_str::<Phase>("\"optimize\"").unwrap(),
            Phase::Optimize
        );
    }

    #[test]
    fn test_artifact_score_clamped() {
        let a = PhaseArtifact::new(Phase::Plan, json!({}), 1.7, false);
        assert_eq!(a.score, 1.0);
        let b = PhaseArtifact::new(Phase::Plan, json!({}), -0.2, true);
        assert_eq!(b.score, 0.0);
        assert!(b.used_fallback);
    }

    #[test]
    fn test_context_artifact_lookup() {
        let mut ctx = CycleContext::new("ship it", json!({}));
        assert!(ctx.artifact(Phase::Plan).is_none());
        ctx.prior
            .push(PhaseArtifact::new(Phase::Plan, json!({"a": 1}), 0.5, false));
        assert_eq!(ctx.artifact(Phase::Plan).unwrap().payload, json!({"a": 1}));
        assert!(ctx.artifact(Phase::Make).is_none());
    }
}
