//! Executes model-generated action scripts.
//!
//! Generated code never runs as host code. It is parsed as a [`Script`] and
//! interpreted against an [`ActionContext`] (the only callable surface) and a
//! [`SharedContext`] that the caller threads through every step of a run.

pub mod context;
pub mod script;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::CodeEvaluationError;

pub use context::{ActionContext, ActionFn, Binding, SharedContext};
pub use script::{Script, Statement};

/// Outcome of one successful execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub code: String,
    pub result: Value,
}

/// Interpreter front-end for action scripts.
///
/// No timeout is applied here; drivers bound their own calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionExecutor;

impl ActionExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Parse and run `code`, reading and mutating `shared`.
    pub async fn execute(
        &self,
        code: &str,
        context: &ActionContext,
        shared: &mut SharedContext,
    ) -> Result<ExecutionResult, CodeEvaluationError> {
        let outcome = match Script::parse(code) {
            Ok(script) => script.run(context, shared).await,
            Err(message) => Err(message),
        };

        match outcome {
            Ok(result) => {
                debug!(result = %result, shared_keys = shared.len(), "executed generated code");
                Ok(ExecutionResult {
                    code: code.to_string(),
                    result,
                })
            }
            Err(message) => {
                error!(%message, %code, "generated code failed");
                Err(CodeEvaluationError::new(code, message))
            }
        }
    }
}
