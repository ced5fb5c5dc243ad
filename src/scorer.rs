//! Quality scoring: aggregates phase-local score contributions into one
//! success score in [0, 100], plus batch self-assessment over recent
//! completed cycles.
//!
//! The strategy is injected; the default [`WeightedStrategy`] weights Check
//! and Optimize highest, since measured quality and forward-looking
//! improvement matter more than raw output volume. Every strategy must be
//! deterministic given identical artifacts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::phase::{Phase, PhaseArtifact};
use crate::predict::{PredictionKind, Predictor};
use crate::store::models::{Cycle, NewAssessment};

/// Per-phase weights for the weighted-sum strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseWeights {
    pub plan: f64,
    pub make: f64,
    pub check: f64,
    pub reflect: f64,
    pub optimize: f64,
}

impl Default for PhaseWeights {
    fn default() -> Self {
        Self {
            plan: 0.15,
            make: 0.15,
            check: 0.30,
            reflect: 0.10,
            optimize: 0.30,
        }
    }
}

impl PhaseWeights {
    pub fn weight(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Plan => self.plan,
            Phase::Make => self.make,
            Phase::Check => self.check,
            Phase::Reflect => self.reflect,
            Phase::Optimize => self.optimize,
        }
    }
}

/// A scoring strategy maps recorded artifacts to a score in [0, 100].
pub trait ScoreStrategy: Send + Sync {
    fn score(&self, artifacts: &[PhaseArtifact]) -> f64;
}

/// Weighted sum of phase-local contributions, normalized over the phases
/// actually present so partial cycles still score sensibly.
#[derive(Debug, Clone, Default)]
pub struct WeightedStrategy {
    weights: PhaseWeights,
}

impl WeightedStrategy {
    pub fn new(weights: PhaseWeights) -> Self {
        Self { weights }
    }
}

impl ScoreStrategy for WeightedStrategy {
    fn score(&self, artifacts: &[PhaseArtifact]) -> f64 {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for artifact in artifacts {
            let w = self.weights.weight(artifact.phase);
            weighted += w * artifact.score;
            total_weight += w;
        }
        if total_weight == 0.0 {
            return 0.0;
        }
        (100.0 * weighted / total_weight).clamp(0.0, 100.0)
    }
}

/// Model-backed strategy: asks the predictor for a success probability over
/// the serialized artifacts, falling back to the weighted sum on any error.
/// Deterministic as long as the predictor is.
pub struct PredictiveStrategy {
    predictor: Arc<dyn Predictor>,
    fallback: WeightedStrategy,
}

impl PredictiveStrategy {
    pub fn new(predictor: Arc<dyn Predictor>, weights: PhaseWeights) -> Self {
        Self {
            predictor,
            fallback: WeightedStrategy::new(weights),
        }
    }
}

impl ScoreStrategy for PredictiveStrategy {
    fn score(&self, artifacts: &[PhaseArtifact]) -> f64 {
        let input = serde_json::to_string(artifacts).unwrap_or_default();
        match self.predictor.predict(PredictionKind::SuccessProbability, &input) {
            Ok(v) => match v.get("probability").and_then(serde_json::Value::as_f64) {
                Some(p) => (p * 100.0).clamp(0.0, 100.0),
                None => self.fallback.score(artifacts),
            },
            Err(e) => {
                warn!(error = %e, "predictive scoring failed, using weighted strategy");
                self.fallback.score(artifacts)
            }
        }
    }
}

/// The scoring component handed to the orchestrator.
pub struct QualityScorer {
    strategy: Arc<dyn ScoreStrategy>,
}

impl QualityScorer {
    pub fn new(strategy: Arc<dyn ScoreStrategy>) -> Self {
        Self { strategy }
    }

    pub fn weighted(weights: PhaseWeights) -> Self {
        Self::new(Arc::new(WeightedStrategy::new(weights)))
    }

    /// Score a cycle's recorded artifacts. Always in [0, 100].
    pub fn score(&self, artifacts: &[PhaseArtifact]) -> f64 {
        self.strategy.score(artifacts).clamp(0.0, 100.0)
    }

    /// Build a point-in-time assessment over a batch of completed cycles.
    ///
    /// Strengths and weaknesses come from average per-phase contributions;
    /// `requires_improvement` is derived: overall below the quality floor,
    /// or any weakness found.
    pub fn assess_batch(&self, cycles: &[Cycle], quality_floor: f64) -> NewAssessment {
        let scores: Vec<f64> = cycles.iter().filter_map(|c| c.success_score).collect();
        let overall = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        let mut strengths = Vec::new();
        let mut weaknesses = Vec::new();
        let mut improvement_areas = Vec::new();
        for phase in Phase::ALL {
            let contributions: Vec<f64> = cycles
                .iter()
                .flat_map(|c| &c.artifacts)
                .filter(|a| a.phase == phase)
                .map(|a| a.score)
                .collect();
            if contributions.is_empty() {
                continue;
            }
            let avg = contributions.iter().sum::<f64>() / contributions.len() as f64;
            if avg >= 0.75 {
                strengths.push(format!("{} phase averaging {:.2}", phase, avg));
            } else if avg < 0.5 {
                weaknesses.push(format!("{} phase averaging {:.2}", phase, avg));
                improvement_areas.push(format!("raise {} phase quality", phase));
            }
        }

        let requires_improvement = overall < quality_floor || !weaknesses.is_empty();
        NewAssessment {
            assessment_type: "batch".to_string(),
            overall_score: overall,
            strengths,
            weaknesses,
            improvement_areas,
            requires_improvement,
        }
    }
}
