// Thread execution context
// One dedicated OS thread per invocation, panic-isolated from the caller
use async_trait::async_trait;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

use offload_core::application::coordinator::constants::{PANIC_EXIT_CODE, TASK_THREAD_STACK_SIZE};
use offload_core::application::coordinator::{execute_guarded, PanicGuardResult};
use offload_core::application::TaskRegistry;
use offload_core::domain::Payload;
use offload_core::port::{
    ContextGuard, ExecutionContext, ExecutionError, SignalSender, TaskSpec, TaskUnit,
};

/// Runs Task Units on dedicated OS threads.
///
/// A real thread rather than the tokio blocking pool: a CPU-bound unit
/// never competes with the runtime. Threads cannot be killed, so
/// termination only detaches the thread.
pub struct ThreadContext {
    registry: TaskRegistry,
    stack_size: usize,
}

impl ThreadContext {
    pub fn new(registry: TaskRegistry) -> Self {
        Self {
            registry,
            stack_size: TASK_THREAD_STACK_SIZE,
        }
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

/// Body of the task thread: exactly one explicit signal (if any), then exit
fn run_unit(unit: Arc<dyn TaskUnit>, payload: Payload, signals: SignalSender, task_id: String) {
    debug!(task_id = %task_id, task = %unit.name(), "Task thread started");

    match execute_guarded(AssertUnwindSafe(|| unit.compute(payload))) {
        PanicGuardResult::Success(Ok(value)) => {
            signals.result(value);
            signals.exit(0, None);
        }
        PanicGuardResult::Success(Err(e)) => {
            signals.error(e.message);
            signals.exit(0, None);
        }
        PanicGuardResult::Panicked(msg) => {
            signals.exit(PANIC_EXIT_CODE, Some(msg));
        }
        PanicGuardResult::Exited(code) => {
            signals.exit(code, None);
        }
    }

    debug!(task_id = %task_id, "Task thread finished");
}

struct ThreadGuard {
    task_id: String,
    handle: Option<JoinHandle<()>>,
}

impl ThreadGuard {
    fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                debug!(task_id = %self.task_id, "Detaching task thread that is still running");
            }
        }
    }
}

#[async_trait]
impl ContextGuard for ThreadGuard {
    fn pid(&self) -> Option<u32> {
        None
    }

    async fn terminate(&mut self) -> Result<(), ExecutionError> {
        warn!(
            task_id = %self.task_id,
            "OS threads cannot be stopped; task thread keeps running detached"
        );
        self.detach();
        Ok(())
    }

    fn release(mut self: Box<Self>) {
        self.detach();
    }
}

#[async_trait]
impl ExecutionContext for ThreadContext {
    async fn launch(
        &self,
        task: &TaskSpec,
        signals: SignalSender,
    ) -> Result<Box<dyn ContextGuard>, ExecutionError> {
        let unit = self
            .registry
            .get(&task.task_name)
            .ok_or_else(|| ExecutionError::UnknownTask(task.task_name.clone()))?;

        let payload = task.payload.clone();
        let task_id = task.id.clone();
        let thread_name = format!("offload-{}", task.id.chars().take(8).collect::<String>());

        let handle = std::thread::Builder::new()
            .name(thread_name)
            .stack_size(self.stack_size)
            .spawn(move || run_unit(unit, payload, signals, task_id))
            .map_err(|e| ExecutionError::SpawnFailed(e.to_string()))?;

        Ok(Box::new(ThreadGuard {
            task_id: task.id.clone(),
            handle: Some(handle),
        }))
    }

    fn kind(&self) -> &'static str {
        "thread"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offload_core::port::{signal_channel, Signal};
    use serde_json::json;

    fn spec(task: &str, payload: Payload) -> TaskSpec {
        TaskSpec {
            id: "t-1".to_string(),
            task_name: task.to_string(),
            payload,
        }
    }

    async fn collect(task: &str, payload: Payload) -> Vec<Signal> {
        let ctx = ThreadContext::new(TaskRegistry::with_builtins());
        let (tx, mut rx) = signal_channel();
        let guard = ctx.launch(&spec(task, payload), tx).await.unwrap();

        let mut signals = Vec::new();
        while let Some(signal) = rx.recv().await {
            signals.push(signal);
        }
        guard.release();
        signals
    }

    #[tokio::test]
    async fn test_result_then_clean_exit() {
        let signals = collect("greet", Payload::from("hello")).await;
        assert_eq!(
            signals,
            vec![
                Signal::Result(json!("hello worker")),
                Signal::Exit { code: 0, detail: None },
            ]
        );
    }

    #[tokio::test]
    async fn test_error_then_clean_exit() {
        let signals = collect("fail", Payload::from("bad input")).await;
        assert_eq!(signals[0], Signal::Error("bad input".to_string()));
        assert_eq!(signals.len(), 2);
    }

    #[tokio::test]
    async fn test_panic_is_abnormal_exit() {
        let signals = collect("panic", Payload::from("kaboom")).await;
        assert_eq!(
            signals,
            vec![Signal::Exit {
                code: PANIC_EXIT_CODE,
                detail: Some("kaboom".to_string())
            }]
        );
    }

    #[tokio::test]
    async fn test_exit_request_reports_code() {
        let signals = collect("exit", Payload::new(json!({"code": 9}))).await;
        assert_eq!(signals, vec![Signal::Exit { code: 9, detail: None }]);
    }

    #[tokio::test]
    async fn test_unknown_task_fails_launch() {
        let ctx = ThreadContext::new(TaskRegistry::new());
        let (tx, _rx) = signal_channel();
        let err = ctx
            .launch(&spec("missing", Payload::default()), tx)
            .await
            .err()
            .unwrap();
        assert_eq!(err, ExecutionError::UnknownTask("missing".to_string()));
    }
}
