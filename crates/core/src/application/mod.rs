// Application Layer - Use Cases

pub mod builtin;
pub mod config;
pub mod coordinator;
pub mod registry;

// Re-exports
pub use config::CoordinatorConfig;
pub use coordinator::{ExecutionCoordinator, TaskHandle, TaskReport, Terminator};
pub use registry::TaskRegistry;
