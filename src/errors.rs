//! Typed error hierarchy for the workflow engine.
//!
//! Three enums cover the three failure surfaces:
//! - `TemplateError` — template lookup and step-graph validation failures
//! - `StepError` — per-step invocation failures
//! - `EngineError` — run-level failures surfaced by `WorkflowEngine::execute`
//!
//! Non-fatal conditions (retrieval degradation, malformed step output) are
//! deliberately absent: they are absorbed where they occur and never become
//! errors.

use thiserror::Error;

/// Errors from template lookup and step-graph validation. All of these are
/// fatal to a run before any step executes.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Workflow template {id} not found")]
    NotFound { id: String },

    #[error("Duplicate step id: {id}")]
    DuplicateStepId { id: String },

    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },

    #[error("Cycle detected in step dependencies. Involved steps: {steps:?}")]
    DependencyCycle { steps: Vec<String> },

    #[error("Failed to parse template catalog: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("Failed to read template catalog: {0}")]
    Io(#[source] std::io::Error),
}

/// Errors from a single step execution. Malformed-but-present model output
/// is not an error — it degrades to a raw-text output instead.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Step {step} failed: {message}")]
    Invocation { step: String, message: String },
}

/// Run-level errors that bubble to the single `execute` entry point, which
/// writes the failed status and re-raises to its caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error("Failed to persist deliverable: {0}")]
    Persistence(String),

    #[error("Run store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_error_unknown_dependency_names_both_steps() {
        let err = TemplateError::UnknownDependency {
            step: "strategize".to_string(),
            dependency: "research_web".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("strategize"));
        assert!(msg.contains("research_web"));
    }

    #[test]
    fn template_error_cycle_lists_involved_steps() {
        let err = TemplateError::DependencyCycle {
            steps: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains("Cycle"));
        assert!(err.to_string().contains("\"a\""));
    }

    #[test]
    fn step_error_converts_into_engine_error() {
        let inner = StepError::Invocation {
            step: "plan".to_string(),
            message: "backend timeout".to_string(),
        };
        let engine_err: EngineError = inner.into();
        match &engine_err {
            EngineError::Step(StepError::Invocation { step, message }) => {
                assert_eq!(step, "plan");
                assert_eq!(message, "backend timeout");
            }
            _ => panic!("Expected EngineError::Step"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&TemplateError::NotFound { id: "x".into() });
        assert_std_error(&StepError::Invocation {
            step: "x".into(),
            message: "y".into(),
        });
        assert_std_error(&EngineError::Persistence("z".into()));
    }
}
