//! Typed error hierarchy for the kaizen engine.
//!
//! Three top-level enums cover the three subsystems:
//! - `StoreError` — persistence-layer failures, including ordering violations
//! - `CycleError` — failures that terminate a single cycle attempt
//! - `ToolError` — capability-provider failures, always recoverable by the
//!   phase executor's local fallback

use thiserror::Error;

/// Errors from the persistence layer.
///
/// `InvalidTransition` and `TerminalCycle` are structural: the caller must
/// fail the cycle attempt rather than retry in place.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cycle {id} not found")]
    CycleNotFound { id: i64 },

    #[error("Task {id} not found")]
    TaskNotFound { id: i64 },

    #[error("Trigger {id} not found")]
    TriggerNotFound { id: i64 },

    #[error("Cycle {cycle_id}: cannot record phase '{got}', expected '{expected}'")]
    InvalidTransition {
        cycle_id: i64,
        expected: String,
        got: String,
    },

    #[error("Cycle {id} is terminal ({status}) and cannot be mutated")]
    TerminalCycle { id: i64, status: String },

    #[error("Cycle {id} cannot complete with {recorded} of 5 phase artifacts")]
    IncompleteCycle { id: i64, recorded: usize },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(anyhow::Error::new(e))
    }
}

/// Errors that are fatal to a single cycle attempt.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Phase '{phase}' timed out after {seconds}s")]
    PhaseTimeout { phase: String, seconds: u64 },

    #[error("Shutdown requested before phase '{phase}'")]
    Cancelled { phase: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the external capability provider.
///
/// Every variant is recoverable: the phase executor answers any `ToolError`
/// with its deterministic local fallback and flags the artifact.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool '{tool}' is unavailable: {reason}")]
    Unavailable { tool: String, reason: String },

    #[error("Tool '{tool}' returned a malformed result: {reason}")]
    Malformed { tool: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_invalid_transition_carries_phases() {
        let err = StoreError::InvalidTransition {
            cycle_id: 7,
            expected: "make".into(),
            got: "check".into(),
        };
        match &err {
            StoreError::InvalidTransition {
                cycle_id,
                expected,
                got,
            } => {
                assert_eq!(*cycle_id, 7);
                assert_eq!(expected, "make");
                assert_eq!(got, "check");
            }
            _ => panic!("Expected InvalidTransition"),
        }
        assert!(err.to_string().contains("check"));
    }

    #[test]
    fn store_error_terminal_cycle_is_matchable() {
        let err = StoreError::TerminalCycle {
            id: 3,
            status: "completed".into(),
        };
        assert!(matches!(err, StoreError::TerminalCycle { .. }));
    }

    #[test]
    fn store_error_incomplete_cycle_names_the_count() {
        let err = StoreError::IncompleteCycle { id: 4, recorded: 2 };
        assert!(matches!(err, StoreError::IncompleteCycle { recorded: 2, .. }));
        assert!(err.to_string().contains("2 of 5"));
    }

    #[test]
    fn cycle_error_converts_from_store_error() {
        let inner = StoreError::CycleNotFound { id: 11 };
        let err: CycleError = inner.into();
        match &err {
            CycleError::Store(StoreError::CycleNotFound { id }) => assert_eq!(*id, 11),
            _ => panic!("Expected CycleError::Store(CycleNotFound)"),
        }
    }

    #[test]
    fn cycle_error_timeout_carries_phase_and_seconds() {
        let err = CycleError::PhaseTimeout {
            phase: "reflect".into(),
            seconds: 120,
        };
        assert!(err.to_string().contains("reflect"));
        assert!(err.to_string().contains("120"));
    }

    #[test]
    fn tool_error_variants_are_distinct() {
        let unavailable = ToolError::Unavailable {
            tool: "planner".into(),
            reason: "connection refused".into(),
        };
        let malformed = ToolError::Malformed {
            tool: "planner".into(),
            reason: "not JSON".into(),
        };
        assert!(matches!(unavailable, ToolError::Unavailable { .. }));
        assert!(matches!(malformed, ToolError::Malformed { .. }));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&StoreError::LockPoisoned);
        assert_std_error(&CycleError::Cancelled {
            phase: "plan".into(),
        });
        assert_std_error(&ToolError::Unavailable {
            tool: "x".into(),
            reason: "y".into(),
        });
    }
}
