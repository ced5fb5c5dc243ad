//! Deterministic local estimation, used whenever the external capability
//! provider is unavailable. Pure functions of the cycle context: the same
//! context always yields the same artifact, which keeps degraded cycles
//! reproducible and auditable.

use serde_json::{json, Value};

use crate::phase::{CycleContext, Phase, PhaseArtifact};
use crate::predict::{PredictionKind, Predictor};

/// Words-per-unit used to turn free text into a rough complexity figure.
const COMPLEXITY_WORDS: f64 = 120.0;

/// Estimated complexity of a free-text goal, in [0, 1].
fn complexity(text: &str) -> f64 {
    (text.split_whitespace().count() as f64 / COMPLEXITY_WORDS).min(1.0)
}

/// Build the fallback artifact for one phase. `predictor`, when present,
/// only refines recommendations; it never changes the artifact shape.
pub(crate) fn estimate(
    phase: Phase,
    ctx: &CycleContext,
    predictor: Option<&dyn Predictor>,
) -> PhaseArtifact {
    match phase {
        Phase::Plan => plan(ctx, predictor),
        Phase::Make => make(ctx),
        Phase::Check => check(ctx),
        Phase::Reflect => reflect(ctx),
        Phase::Optimize => optimize(ctx, predictor),
    }
}

fn plan(ctx: &CycleContext, predictor: Option<&dyn Predictor>) -> PhaseArtifact {
    let c = complexity(&ctx.goal);
    let steps: Vec<String> = ctx
        .goal
        .split(['.', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("Address: {}", s))
        .collect();
    let task_type = predictor
        .and_then(|p| p.predict(PredictionKind::TaskType, &ctx.goal).ok())
        .and_then(|v| v.get("task_type").cloned())
        .unwrap_or(Value::Null);
    let payload = json!({
        "approach": steps,
        "estimated_complexity": c,
        "task_type": task_type,
    });
    PhaseArtifact::new(Phase::Plan, payload, 1.0 - 0.4 * c, true)
}

fn make(ctx: &CycleContext) -> PhaseArtifact {
    let c = ctx
        .artifact(Phase::Plan)
        .and_then(|a| a.payload.get("estimated_complexity"))
        .and_then(Value::as_f64)
        .unwrap_or_else(|| complexity(&ctx.goal));
    let changes: Vec<Value> = ctx
        .artifact(Phase::Plan)
        .and_then(|a| a.payload.get("approach"))
        .and_then(Value::as_array)
        .map(|steps| {
            steps
                .iter()
                .filter_map(Value::as_str)
                .map(|step| json!({"action": "draft", "target": step}))
                .collect()
        })
        .unwrap_or_default();
    let success_likelihood = (1.0 - 0.5 * c).clamp(0.0, 1.0);
    let payload = json!({
        "changes": changes,
        "success_likelihood": success_likelihood,
    });
    PhaseArtifact::new(Phase::Make, payload, success_likelihood, true)
}

fn check(ctx: &CycleContext) -> PhaseArtifact {
    let make = ctx.artifact(Phase::Make);
    let likelihood = make
        .and_then(|a| a.payload.get("success_likelihood"))
        .and_then(Value::as_f64)
        .unwrap_or(0.5);
    let change_count = make
        .and_then(|a| a.payload.get("changes"))
        .and_then(Value::as_array)
        .map(|c| c.len())
        .unwrap_or(0);
    let mut issues: Vec<String> = Vec::new();
    if change_count == 0 {
        issues.push("make phase produced no change descriptors".to_string());
    }
    let quality = if issues.is_empty() {
        likelihood
    } else {
        likelihood * 0.5
    };
    let payload = json!({
        "issues": issues,
        "quality": quality,
    });
    PhaseArtifact::new(Phase::Check, payload, quality, true)
}

fn reflect(ctx: &CycleContext) -> PhaseArtifact {
    let scores: Vec<f64> = ctx
        .history
        .iter()
        .filter_map(|d| d.success_score)
        .collect();
    let avg = if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    };
    let mut insights = vec![format!(
        "Observed {} prior completed cycle(s)",
        ctx.history.len()
    )];
    let mut recommendations: Vec<String> = Vec::new();
    if let Some(avg) = avg {
        insights.push(format!("Average success score of recent cycles: {:.1}", avg));
        if avg < 70.0 {
            recommendations.push("Tighten check criteria before the next cycle".to_string());
            recommendations.push("Reduce the scope of individual make steps".to_string());
        }
    }
    let score = avg.map(|a| a / 100.0).unwrap_or(0.5);
    let payload = json!({
        "insights": insights,
        "recommendations": recommendations,
    });
    PhaseArtifact::new(Phase::Reflect, payload, score, true)
}

fn optimize(ctx: &CycleContext, predictor: Option<&dyn Predictor>) -> PhaseArtifact {
    let prior_scores: Vec<f64> = ctx.prior.iter().map(|a| a.score).collect();
    let mean = if prior_scores.is_empty() {
        0.5
    } else {
        prior_scores.iter().sum::<f64>() / prior_scores.len() as f64
    };
    let tools = predictor
        .and_then(|p| p.predict(PredictionKind::ToolRecommendation, &ctx.goal).ok())
        .and_then(|v| v.get("tools").cloned())
        .unwrap_or_else(|| json!(["draft", "apply", "verify"]));
    let payload = json!({
        "tool_recommendations": tools,
        "predicted_quality": mean * 100.0,
    });
    PhaseArtifact::new(Phase::Optimize, payload, mean, true)
}
