// Task Lifecycle (per-invocation state machine)

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Task ID (UUID v4 in production)
pub type TaskId = String;

/// Which terminal signal resolved the invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionKind {
    Success,
    Failure,
    AbnormalTermination,
}

/// Task State
///
/// `Spawning -> Running -> Resolved(*) -> Terminated`.
/// A spawn failure goes straight from `Spawning` to `Resolved(Failure)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[default]
    Spawning,
    Running,
    Resolved(ResolutionKind),
    Terminated,
}

impl std::fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionKind::Success => write!(f, "SUCCESS"),
            ResolutionKind::Failure => write!(f, "FAILURE"),
            ResolutionKind::AbnormalTermination => write!(f, "ABNORMAL_TERMINATION"),
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Spawning => write!(f, "SPAWNING"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Resolved(kind) => write!(f, "RESOLVED({})", kind),
            TaskState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

impl TaskState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, TaskState::Resolved(_) | TaskState::Terminated)
    }

    /// Transition to Running once the isolated context has started
    pub fn start(&mut self) -> Result<()> {
        self.transition(TaskState::Running)
    }

    /// Transition to Resolved; only one resolution is ever accepted
    pub fn resolve(&mut self, kind: ResolutionKind) -> Result<()> {
        self.transition(TaskState::Resolved(kind))
    }

    /// Transition to the Terminated sink
    pub fn terminate(&mut self) -> Result<()> {
        self.transition(TaskState::Terminated)
    }

    fn transition(&mut self, to: TaskState) -> Result<()> {
        let allowed = match (*self, to) {
            (TaskState::Spawning, TaskState::Running) => true,
            (TaskState::Spawning, TaskState::Resolved(ResolutionKind::Failure)) => true,
            (TaskState::Running, TaskState::Resolved(_)) => true,
            (TaskState::Resolved(_), TaskState::Terminated) => true,
            _ => false,
        };

        if !allowed {
            return Err(DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        *self = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = TaskState::default();
        state.start().unwrap();
        state.resolve(ResolutionKind::Success).unwrap();
        state.terminate().unwrap();
        assert_eq!(state, TaskState::Terminated);
    }

    #[test]
    fn test_only_one_resolution() {
        let mut state = TaskState::Running;
        state.resolve(ResolutionKind::Success).unwrap();

        let err = state.resolve(ResolutionKind::Failure).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        assert_eq!(state, TaskState::Resolved(ResolutionKind::Success));
    }

    #[test]
    fn test_spawn_failure_skips_running() {
        let mut state = TaskState::Spawning;
        state.resolve(ResolutionKind::Failure).unwrap();
        state.terminate().unwrap();

        let mut other = TaskState::Spawning;
        assert!(other.resolve(ResolutionKind::Success).is_err());
    }

    #[test]
    fn test_terminated_is_sink() {
        let mut state = TaskState::Terminated;
        assert!(state.start().is_err());
        assert!(state.terminate().is_err());
        assert!(state.is_resolved());
    }

    #[test]
    fn test_cannot_terminate_while_running() {
        let mut state = TaskState::Running;
        let err = state.terminate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid task state transition: RUNNING -> TERMINATED"
        );
    }
}
