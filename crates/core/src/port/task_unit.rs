// Task Unit Port
// The isolated computation an execution context runs

use crate::domain::Payload;
use serde_json::Value;
use thiserror::Error;

/// Error returned explicitly by a Task Unit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        TaskError::new(format!("Invalid payload: {}", err))
    }
}

/// Task Unit trait
///
/// A unit sees nothing of its invoker beyond the payload it is given.
/// `compute` runs inside an isolated context and must finish in one of
/// three ways:
/// - `Ok(value)` becomes the result signal
/// - `Err(TaskError)` becomes the error signal
/// - a panic ends the context abnormally
pub trait TaskUnit: Send + Sync {
    /// Registry name of this unit
    fn name(&self) -> &str;

    /// Run the computation
    ///
    /// # Errors
    /// - TaskError when the unit rejects the payload or fails while computing
    fn compute(&self, payload: Payload) -> Result<Value, TaskError>;
}

/// Closure adapter for TaskUnit
pub struct FnTask<F> {
    name: String,
    f: F,
}

impl<F> FnTask<F>
where
    F: Fn(Payload) -> Result<Value, TaskError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> TaskUnit for FnTask<F>
where
    F: Fn(Payload) -> Result<Value, TaskError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, payload: Payload) -> Result<Value, TaskError> {
        (self.f)(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fn_task_delegates() {
        let task = FnTask::new("double", |p: Payload| {
            let n = p
                .as_value()
                .as_i64()
                .ok_or_else(|| TaskError::new("expected a number"))?;
            Ok(json!(n * 2))
        });

        assert_eq!(task.name(), "double");
        assert_eq!(task.compute(Payload::new(json!(21))).unwrap(), json!(42));
        assert_eq!(
            task.compute(Payload::from("x")).unwrap_err().message,
            "expected a number"
        );
    }
}
