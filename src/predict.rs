//! Optional predictive capability for scoring and recommendations.
//!
//! The engine works without any predictor; everything here is a static
//! heuristic that callers may swap for a real model service. Absence or
//! failure always degrades to rule-based defaults, never to a hard error.

use anyhow::Result;
use serde_json::{json, Value};

/// What a prediction request is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionKind {
    TaskType,
    SuccessProbability,
    ToolRecommendation,
}

/// A pluggable prediction service. Implementations must be deterministic
/// for a given input; reproducible scoring depends on it.
pub trait Predictor: Send + Sync {
    fn predict(&self, kind: PredictionKind, input: &str) -> Result<Value>;
}

/// Keyword-based static heuristic, the default predictor.
#[derive(Debug, Clone, Default)]
pub struct HeuristicPredictor;

impl HeuristicPredictor {
    /// Classify a task description into a coarse work category.
    fn classify(input: &str) -> &'static str {
        let lower = input.to_lowercase();
        if lower.contains("fix") || lower.contains("bug") || lower.contains("regression") {
            "fix"
        } else if lower.contains("test") || lower.contains("verify") || lower.contains("check") {
            "verify"
        } else if lower.contains("refactor") || lower.contains("cleanup") || lower.contains("optimi")
        {
            "improve"
        } else if lower.contains("doc") || lower.contains("readme") {
            "document"
        } else {
            "implement"
        }
    }

    /// Crude likelihood estimate: longer, vaguer goals are riskier.
    fn success_probability(input: &str) -> f64 {
        let words = input.split_whitespace().count() as f64;
        (0.9 - (words / 400.0)).clamp(0.3, 0.9)
    }

    fn recommend_tools(input: &str) -> Vec<&'static str> {
        match Self::classify(input) {
            "fix" => vec!["diagnose", "patch", "verify"],
            "verify" => vec!["inspect", "verify"],
            "improve" => vec!["profile", "restructure", "verify"],
            "document" => vec!["summarize", "draft"],
            _ => vec!["draft", "apply", "verify"],
        }
    }
}

impl Predictor for HeuristicPredictor {
    fn predict(&self, kind: PredictionKind, input: &str) -> Result<Value> {
        let value = match kind {
            PredictionKind::TaskType => json!({ "task_type": Self::classify(input) }),
            PredictionKind::SuccessProbability => {
                json!({ "probability": Self::success_probability(input) })
            }
            PredictionKind::ToolRecommendation => {
                json!({ "tools": Self::recommend_tools(input) })
            }
        };
        Ok(value)
    }
}
