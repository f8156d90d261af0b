// Execution Coordinator - spawns one isolated Task Unit per call and resolves one Outcome

pub mod constants;
mod handle;
mod panic_guard;
mod resolver;

pub use handle::{TaskHandle, TaskReport, Terminator};
pub use panic_guard::{
    execute_guarded, panic_message, request_exit, ExitRequest, PanicGuardResult,
};
pub use resolver::Resolver;

use crate::application::config::CoordinatorConfig;
use crate::domain::{FailureKind, Outcome, Payload, TaskFailure, TaskState};
use crate::port::id_provider::UuidProvider;
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{signal_channel, ExecutionContext, IdProvider, TaskSpec, TimeProvider};
use handle::Launch;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Execution Coordinator
///
/// No pooling: every `spawn` / `run` starts a fresh context through the
/// configured `ExecutionContext` and delivers exactly one payload to it.
pub struct ExecutionCoordinator {
    context: Arc<dyn ExecutionContext>,
    config: CoordinatorConfig,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ExecutionCoordinator {
    /// Create a coordinator with production id / time providers
    pub fn new(context: Arc<dyn ExecutionContext>, config: CoordinatorConfig) -> Self {
        Self::with_providers(
            context,
            config,
            Arc::new(UuidProvider),
            Arc::new(SystemTimeProvider),
        )
    }

    /// Create a coordinator with injected providers (deterministic tests)
    pub fn with_providers(
        context: Arc<dyn ExecutionContext>,
        config: CoordinatorConfig,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            context,
            config,
            id_provider,
            time_provider,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run `task` on `payload` and wait for its single outcome
    pub async fn run(&self, task: impl Into<String>, payload: Payload) -> Outcome {
        self.spawn(task, payload).await.outcome().await
    }

    /// Start `task` on `payload` without waiting.
    ///
    /// Never fails: a context that cannot be started yields a handle whose
    /// outcome is already a `SpawnFailed` failure.
    pub async fn spawn(&self, task: impl Into<String>, payload: Payload) -> TaskHandle {
        let spec = TaskSpec {
            id: self.id_provider.generate_id(),
            task_name: task.into(),
            payload,
        };
        let mut state = TaskState::Spawning;

        info!(
            task_id = %spec.id,
            task = %spec.task_name,
            context = self.context.kind(),
            "Spawning task"
        );

        let (signals_tx, signals_rx) = signal_channel();
        let launch = match self.context.launch(&spec, signals_tx).await {
            Ok(guard) => {
                if let Err(e) = state.start() {
                    error!(task_id = %spec.id, error = %e, "Task lifecycle violated");
                }
                debug!(task_id = %spec.id, pid = ?guard.pid(), state = %state, "Task running");
                Launch::Running {
                    signals: signals_rx,
                    guard,
                }
            }
            Err(e) => {
                warn!(task_id = %spec.id, error = %e, "Failed to start execution context");
                Launch::Failed(TaskFailure::new(FailureKind::SpawnFailed, e.to_string()))
            }
        };

        TaskHandle::new(
            spec.id,
            spec.task_name,
            state,
            launch,
            Resolver::new(self.config.exit_grace),
            self.config.timeout,
            Arc::clone(&self.time_provider),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::execution_context::mocks::{ScriptedContext, SilentContext};
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::time_provider::SteppingTimeProvider;
    use crate::port::{ExecutionError, Signal};
    use serde_json::json;
    use std::time::Duration;

    fn coordinator(context: Arc<dyn ExecutionContext>, config: CoordinatorConfig) -> ExecutionCoordinator {
        ExecutionCoordinator::with_providers(
            context,
            config,
            Arc::new(SequentialIdProvider::default()),
            Arc::new(SteppingTimeProvider::new(1000, 5)),
        )
    }

    #[tokio::test]
    async fn test_hello_worker_scenario() {
        let ctx = Arc::new(ScriptedContext::immediate(vec![
            Signal::Result(json!("hello worker")),
            Signal::Exit { code: 0, detail: None },
        ]));
        let coord = coordinator(ctx.clone(), CoordinatorConfig::default());

        let outcome = coord.run("greet", Payload::from("hello")).await;

        assert_eq!(outcome, Outcome::success(json!("hello worker")));
        assert_eq!(ctx.launch_count(), 1);
        assert_eq!(ctx.release_count(), 1);
    }

    #[tokio::test]
    async fn test_each_run_spawns_fresh_context() {
        let ctx = Arc::new(ScriptedContext::immediate(vec![Signal::Result(json!(1))]));
        let coord = coordinator(ctx.clone(), CoordinatorConfig::default());

        for _ in 0..3 {
            assert!(coord.run("any", Payload::default()).await.is_success());
        }
        assert_eq!(ctx.launch_count(), 3);
        assert_eq!(ctx.release_count(), 3);
    }

    #[tokio::test]
    async fn test_report_tracks_lifecycle() {
        let ctx = Arc::new(ScriptedContext::immediate(vec![Signal::Error("nope".into())]));
        let coord = coordinator(ctx, CoordinatorConfig::default());

        let handle = coord.spawn("fail", Payload::default()).await;
        assert_eq!(handle.id(), "task-1");
        assert_eq!(handle.state(), TaskState::Running);

        let report = handle.join().await;
        assert_eq!(report.state, TaskState::Terminated);
        assert_eq!(report.duration_ms, 5);
        assert_eq!(report.outcome.failure_kind(), Some(FailureKind::ComputationFailure));
    }

    #[tokio::test]
    async fn test_spawn_failure_resolves_failure() {
        let ctx = Arc::new(ScriptedContext::failing(ExecutionError::SpawnFailed(
            "no such file".into(),
        )));
        let coord = coordinator(ctx, CoordinatorConfig::default());

        let handle = coord.spawn("greet", Payload::default()).await;
        assert_eq!(handle.state(), TaskState::Spawning);

        let failure = handle.outcome().await.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::SpawnFailed);
        assert!(failure.message.contains("no such file"));
    }

    #[tokio::test]
    async fn test_silent_context_is_protocol_violation() {
        let coord = coordinator(Arc::new(SilentContext), CoordinatorConfig::default());

        let outcome = coord.run("greet", Payload::default()).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::ProtocolViolation));
    }

    #[tokio::test]
    async fn test_timeout_terminates_context() {
        let ctx = Arc::new(ScriptedContext::new(vec![(
            Duration::from_secs(30),
            Signal::Result(json!("too late")),
        )]));
        let config = CoordinatorConfig::default().with_timeout(Duration::from_millis(50));
        let coord = coordinator(ctx.clone(), config);

        let failure = coord
            .run("sleep", Payload::default())
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::TimedOut);
        assert_eq!(failure.message, "Task timed out after 50ms");
        assert_eq!(ctx.terminate_count(), 1);
        assert_eq!(ctx.release_count(), 1);
    }

    #[tokio::test]
    async fn test_terminate_while_awaiting() {
        let ctx = Arc::new(ScriptedContext::new(vec![(
            Duration::from_secs(30),
            Signal::Result(json!("never")),
        )]));
        let coord = coordinator(ctx.clone(), CoordinatorConfig::default());

        let handle = coord.spawn("sleep", Payload::default()).await;
        let terminator = handle.terminator();
        let waiter = tokio::spawn(handle.outcome());

        tokio::time::sleep(Duration::from_millis(20)).await;
        terminator.terminate();

        let outcome = waiter.await.unwrap();
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Terminated));
        assert_eq!(ctx.terminate_count(), 1);
    }

    #[tokio::test]
    async fn test_terminate_after_result_keeps_result() {
        let ctx = Arc::new(ScriptedContext::immediate(vec![Signal::Result(json!("done"))]));
        let coord = coordinator(ctx.clone(), CoordinatorConfig::default());

        let handle = coord.spawn("greet", Payload::default()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.terminate();

        let outcome = handle.outcome().await;
        assert_eq!(outcome, Outcome::success(json!("done")));
        assert_eq!(ctx.terminate_count(), 0);
        assert_eq!(ctx.release_count(), 1);
    }

    #[tokio::test]
    async fn test_exit_then_late_error_prefers_error() {
        let ctx = Arc::new(ScriptedContext::new(vec![
            (Duration::ZERO, Signal::Exit { code: 1, detail: None }),
            (Duration::from_millis(10), Signal::Error("disk full".into())),
        ]));
        let config = CoordinatorConfig::default().with_exit_grace(Duration::from_millis(500));
        let coord = coordinator(ctx, config);

        let failure = coord
            .run("write", Payload::default())
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::ComputationFailure);
        assert_eq!(failure.message, "disk full");
    }
}
