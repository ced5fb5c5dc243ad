//! Phase execution against the external capability provider.
//!
//! [`ToolProvider`] is the "invoke named tool with parameters" boundary.
//! [`PhaseExecutor`] runs exactly one phase per call: it asks the provider
//! for the phase's tool and, if the provider errors in any way, answers
//! with the deterministic local fallback so a cycle always completes in
//! degraded mode rather than aborting. Fallback artifacts carry
//! `used_fallback = true`.

mod fallback;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::ToolError;
use crate::phase::{CycleContext, Phase, PhaseArtifact};
use crate::predict::Predictor;

/// The external capability boundary. "Unavailable" is a first-class
/// outcome here, not an exception path.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn invoke(&self, tool: &str, params: Value) -> Result<Value, ToolError>;
}

/// Provider for offline operation: every invocation reports unavailable,
/// so every phase runs on the local estimator.
#[derive(Debug, Clone, Default)]
pub struct NullToolProvider;

#[async_trait]
impl ToolProvider for NullToolProvider {
    async fn invoke(&self, tool: &str, _params: Value) -> Result<Value, ToolError> {
        Err(ToolError::Unavailable {
            tool: tool.to_string(),
            reason: "no capability provider configured".to_string(),
        })
    }
}

/// Executes a single named phase. Stateless between calls.
pub struct PhaseExecutor {
    tools: Arc<dyn ToolProvider>,
    predictor: Option<Arc<dyn Predictor>>,
}

impl PhaseExecutor {
    pub fn new(tools: Arc<dyn ToolProvider>, predictor: Option<Arc<dyn Predictor>>) -> Self {
        Self { tools, predictor }
    }

    /// Run one phase given the cycle's accumulated context.
    ///
    /// Never fails: provider errors are absorbed by the fallback path.
    pub async fn execute(&self, phase: Phase, ctx: &CycleContext) -> PhaseArtifact {
        let params = Self::request_params(phase, ctx);
        match self.tools.invoke(phase.as_str(), params).await {
            Ok(payload) => {
                debug!(phase = %phase, "capability provider answered");
                Self::artifact_from_payload(phase, payload)
            }
            Err(e) => {
                warn!(phase = %phase, error = %e, "capability unavailable, using local estimator");
                fallback::estimate(phase, ctx, self.predictor.as_deref())
            }
        }
    }

    /// Parameters handed to the provider: the goal, the original task
    /// parameters, and the payloads of all prior phases in order.
    fn request_params(phase: Phase, ctx: &CycleContext) -> Value {
        let prior: Vec<Value> = ctx
            .prior
            .iter()
            .map(|a| json!({"phase": a.phase.as_str(), "payload": a.payload}))
            .collect();
        let mut params = json!({
            "goal": ctx.goal,
            "parameters": ctx.parameters,
            "prior": prior,
        });
        if phase == Phase::Reflect {
            params["history"] = serde_json::to_value(&ctx.history).unwrap_or(Value::Null);
        }
        params
    }

    /// A provider payload may carry its own score contribution under
    /// "score"; otherwise a neutral 0.5 is assumed.
    fn artifact_from_payload(phase: Phase, payload: Value) -> PhaseArtifact {
        let score = payload
            .get("score")
            .and_then(Value::as_f64)
            .unwrap_or(0.5);
        PhaseArtifact::new(phase, payload, score, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::HeuristicPredictor;

    /// Provider that answers every tool with a fixed payload.
    struct FixedProvider(Value);

    #[async_trait]
    impl ToolProvider for FixedProvider {
        async fn invoke(&self, _tool: &str, _params: Value) -> Result<Value, ToolError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_provider_payload_becomes_artifact() {
        let executor = PhaseExecutor::new(
            Arc::new(FixedProvider(json!({"approach": ["x"], "score": 0.9}))),
            None,
        );
        let ctx = CycleContext::new("goal", json!({}));
        let artifact = executor.execute(Phase::Plan, &ctx).await;
        assert!(!artifact.used_fallback);
        assert_eq!(artifact.score, 0.9);
        assert_eq!(artifact.payload["approach"], json!(["x"]));
    }

    #[tokio::test]
    async fn test_missing_score_defaults_to_neutral() {
        let executor = PhaseExecutor::new(Arc::new(FixedProvider(json!({"only": "payload"}))), None);
        let ctx = CycleContext::new("goal", json!({}));
        let artifact = executor.execute(Phase::Make, &ctx).await;
        assert_eq!(artifact.score, 0.5);
    }

    #[tokio::test]
    async fn test_unavailable_provider_falls_back() {
        let executor = PhaseExecutor::new(
            Arc::new(NullToolProvider),
            Some(Arc::new(HeuristicPredictor)),
        );
        let ctx = CycleContext::new("Fix the bug. Add a test.", json!({}));
        let artifact = executor.execute(Phase::Plan, &ctx).await;
        assert!(artifact.used_fallback);
        assert!(artifact.payload.get("approach").is_some());
        assert!(artifact.score > 0.0);
    }

    #[tokio::test]
    async fn test_fallback_is_deterministic_across_calls() {
        let executor = PhaseExecutor::new(Arc::new(NullToolProvider), None);
        let ctx = CycleContext::new("Same goal text", json!({"k": "v"}));
        let a = executor.execute(Phase::Plan, &ctx).await;
        let b = executor.execute(Phase::Plan, &ctx).await;
        assert_eq!(a, b);
    }
}
