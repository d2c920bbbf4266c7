//! Error taxonomy for the autopilot.
//!
//! Leaf errors ([`HashingError`], [`CodeEvaluationError`], [`MissingOutputError`])
//! are raised by the component that detects them and carried upward unchanged.
//! The loop wraps whatever stopped it into an [`AutopilotFailure`] together
//! with the report assembled so far.

use std::path::PathBuf;

use thiserror::Error;

use crate::autopilot::report::AutopilotReport;

/// A snapshot image could not be turned into a fingerprint.
#[derive(Debug, Error)]
pub enum HashingError {
    /// The image file could not be read
    #[error("failed to read snapshot {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes were read but are not a decodable image
    #[error("failed to decode snapshot {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// A blocking hash task panicked or was cancelled
    #[error("hash task for algorithm '{algorithm}' did not complete: {message}")]
    Task { algorithm: String, message: String },
}

/// A required tagged section was absent from a model response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("missing required output <{tag}> in model response")]
pub struct MissingOutputError {
    pub tag: String,
}

/// Generated code failed to parse or raised while running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to evaluate generated code: {message}\ncode:\n{code}")]
pub struct CodeEvaluationError {
    pub code: String,
    pub message: String,
}

impl CodeEvaluationError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Failures at the model boundary.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("no response for {0:?}")]
    ActivityTimeout(std::time::Duration),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a single planner call.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    MissingOutput(#[from] MissingOutputError),
}

/// Failures of the framework driver while capturing state.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("snapshot capture failed: {0}")]
    Capture(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures loading or saving the persistent cache file.
#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("cache file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Root causes that end an autopilot run.
#[derive(Debug, Error)]
pub enum AutopilotError {
    #[error("goal not reached after {attempts} attempts")]
    AttemptBudgetExhausted { attempts: usize },

    #[error(transparent)]
    MissingOutput(#[from] MissingOutputError),

    #[error(transparent)]
    CodeEvaluation(#[from] CodeEvaluationError),

    #[error(transparent)]
    Hashing(#[from] HashingError),

    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("driver failed: {0}")]
    Driver(#[from] DriverError),

    #[error("cache store failed: {0}")]
    CacheStore(#[from] CacheStoreError),
}

impl From<PlanningError> for AutopilotError {
    fn from(err: PlanningError) -> Self {
        match err {
            PlanningError::Model(e) => AutopilotError::Model(e),
            PlanningError::MissingOutput(e) => AutopilotError::MissingOutput(e),
        }
    }
}

/// Terminal failure of a run: the root cause plus the work completed before it.
#[derive(Debug, Error)]
#[error("autopilot run for goal '{}' failed after {} step(s): {error}", .report.goal, .report.steps.len())]
pub struct AutopilotFailure {
    pub report: Box<AutopilotReport>,
    #[source]
    pub error: AutopilotError,
}

impl AutopilotFailure {
    pub fn new(report: AutopilotReport, error: AutopilotError) -> Self {
        Self {
            report: Box::new(report),
            error,
        }
    }

    /// True when the run stopped only because the attempt budget ran out
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self.error, AutopilotError::AttemptBudgetExhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_missing_output_names_tag() {
        let err = MissingOutputError { tag: "ACTION".into() };
        assert_eq!(err.to_string(), "missing required output <ACTION> in model response");
    }

    #[test]
    fn test_code_evaluation_error_carries_code() {
        let err = CodeEvaluationError::new("[{\"op\":\"call\"}]", "unknown op");
        let msg = err.to_string();
        assert!(msg.contains("unknown op"));
        assert!(msg.contains("{\"op\":\"call\"}"));
    }

    #[test]
    fn test_failure_exposes_root_cause() {
        let report = AutopilotReport::new("open settings");
        let failure = AutopilotFailure::new(report, AutopilotError::AttemptBudgetExhausted { attempts: 3 });
        assert!(failure.is_budget_exhausted());
        assert!(failure.to_string().contains("open settings"));
        let source = failure.source().map(|s| s.to_string()).unwrap_or_default();
        assert_eq!(source, "goal not reached after 3 attempts");
    }
}
