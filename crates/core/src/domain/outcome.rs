// Task Outcome (the single terminal result of an invocation)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Task Unit explicitly signaled an error
    ComputationFailure,
    /// Context ended with a non-zero code and no explicit signal
    AbnormalTermination,
    /// Context ended with code 0 without producing a result
    ProtocolViolation,
    /// Context could not be started
    SpawnFailed,
    /// Deadline elapsed before any terminal signal
    TimedOut,
    /// Caller terminated the context explicitly
    Terminated,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::ComputationFailure => write!(f, "COMPUTATION_FAILURE"),
            FailureKind::AbnormalTermination => write!(f, "ABNORMAL_TERMINATION"),
            FailureKind::ProtocolViolation => write!(f, "PROTOCOL_VIOLATION"),
            FailureKind::SpawnFailed => write!(f, "SPAWN_FAILED"),
            FailureKind::TimedOut => write!(f, "TIMED_OUT"),
            FailureKind::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// A rejected outcome, with enough context to tell the kinds apart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
    pub exit_code: Option<i32>,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn computation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ComputationFailure, message)
    }

    /// Non-zero exit without a prior result
    pub fn exit_code(code: i32) -> Self {
        Self {
            kind: FailureKind::AbnormalTermination,
            message: format!("Worker stopped with exit code {}", code),
            exit_code: Some(code),
        }
    }

    /// Zero exit without a prior result
    pub fn protocol_violation() -> Self {
        Self {
            kind: FailureKind::ProtocolViolation,
            message: "Worker exited without producing a result".to_string(),
            exit_code: Some(0),
        }
    }
}

/// Outcome of exactly one task invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        value: Value,
    },
    Failure {
        #[serde(flatten)]
        failure: TaskFailure,
    },
    AbnormalTermination {
        code: i32,
        detail: Option<String>,
    },
}

impl Outcome {
    pub fn success(value: Value) -> Self {
        Outcome::Success { value }
    }

    pub fn failure(failure: TaskFailure) -> Self {
        Outcome::Failure { failure }
    }

    pub fn abnormal(code: i32, detail: Option<String>) -> Self {
        Outcome::AbnormalTermination { code, detail }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Collapse into the caller-visible result.
    ///
    /// Every non-success becomes a rejected result; abnormal termination
    /// carries the code in the message.
    pub fn into_result(self) -> Result<Value, TaskFailure> {
        match self {
            Outcome::Success { value } => Ok(value),
            Outcome::Failure { failure } => Err(failure),
            Outcome::AbnormalTermination { code, .. } => Err(TaskFailure::exit_code(code)),
        }
    }

    /// Failure view without consuming the outcome
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { failure } => Some(failure.kind),
            Outcome::AbnormalTermination { .. } => Some(FailureKind::AbnormalTermination),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success { value } => write!(f, "success: {}", value),
            Outcome::Failure { failure } => write!(f, "failure ({}): {}", failure.kind, failure.message),
            Outcome::AbnormalTermination { code, detail } => match detail {
                Some(d) => write!(f, "Worker stopped with exit code {} ({})", code, d),
                None => write!(f, "Worker stopped with exit code {}", code),
            },
        }
    }
}
