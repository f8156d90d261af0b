// Domain Layer - Pure task offload entities

pub mod error;
pub mod outcome;
pub mod payload;
pub mod task;

// Re-exports
pub use error::DomainError;
pub use outcome::{FailureKind, Outcome, TaskFailure};
pub use payload::Payload;
pub use task::{ResolutionKind, TaskId, TaskState};
