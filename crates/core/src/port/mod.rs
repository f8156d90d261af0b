// Port Layer - Interfaces for external dependencies

pub mod execution_context;
pub mod id_provider; // For deterministic testing
pub mod task_unit;
pub mod time_provider;

// Re-exports
pub use execution_context::{
    signal_channel, ContextGuard, ExecutionContext, ExecutionError, Signal, SignalReceiver,
    SignalSender, TaskSpec,
};
pub use id_provider::IdProvider;
pub use task_unit::{FnTask, TaskError, TaskUnit};
pub use time_provider::TimeProvider;
