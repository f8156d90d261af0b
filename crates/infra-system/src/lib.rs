// Offload Infrastructure - System Adapters
// Implements: ExecutionContext (thread, subprocess) and the worker-side protocol loop

pub mod protocol;
pub mod subprocess_context;
pub mod thread_context;
pub mod worker_main;

pub use protocol::{WorkRequest, WorkResponse};
pub use subprocess_context::{SubprocessConfig, SubprocessContext};
pub use thread_context::ThreadContext;
pub use worker_main::{run_worker, run_worker_main};
