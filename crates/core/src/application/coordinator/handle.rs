// Task Handle - one in-flight invocation

use super::resolver::Resolver;
use crate::domain::{FailureKind, Outcome, ResolutionKind, TaskFailure, TaskId, TaskState};
use crate::port::{ContextGuard, SignalReceiver, TimeProvider};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Requests termination of one in-flight task (like `worker.terminate()`)
#[derive(Clone)]
pub struct Terminator {
    tx: Arc<watch::Sender<bool>>,
}

impl Terminator {
    /// Ask the coordinator to stop the context.
    ///
    /// No effect once the outcome has been resolved.
    pub fn terminate(&self) {
        let _ = self.tx.send(true);
    }
}

/// Termination signal observed by the handle
struct TerminateToken {
    rx: watch::Receiver<bool>,
}

impl TerminateToken {
    /// Resolves only when termination was requested
    async fn wait(&mut self) {
        let requested = self.rx.wait_for(|requested| *requested).await.is_ok();
        if !requested {
            // Sender gone: termination can never be requested
            std::future::pending::<()>().await;
        }
    }
}

fn terminate_channel() -> (Terminator, TerminateToken) {
    let (tx, rx) = watch::channel(false);
    (Terminator { tx: Arc::new(tx) }, TerminateToken { rx })
}

/// Final record of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub task: String,
    pub state: TaskState,
    pub duration_ms: i64,
    pub pid: Option<u32>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

pub(crate) enum Launch {
    /// Context never started
    Failed(TaskFailure),
    Running {
        signals: SignalReceiver,
        guard: Box<dyn ContextGuard>,
    },
}

/// Handle on one in-flight Task Unit
///
/// Awaiting `outcome()` / `join()` consumes the handle, so at most one
/// outcome can ever be observed. Dropping the handle abandons the task;
/// a thread context keeps running until its unit returns.
pub struct TaskHandle {
    id: TaskId,
    task_name: String,
    state: TaskState,
    started_at: i64,
    launch: Launch,
    resolver: Resolver,
    timeout: Option<Duration>,
    terminator: Terminator,
    token: TerminateToken,
    time_provider: Arc<dyn TimeProvider>,
}

impl TaskHandle {
    pub(crate) fn new(
        id: TaskId,
        task_name: String,
        state: TaskState,
        launch: Launch,
        resolver: Resolver,
        timeout: Option<Duration>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let (terminator, token) = terminate_channel();
        Self {
            id,
            task_name,
            state,
            started_at: time_provider.now_millis(),
            launch,
            resolver,
            timeout,
            terminator,
            token,
            time_provider,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// OS process id when running in a child process
    pub fn pid(&self) -> Option<u32> {
        match &self.launch {
            Launch::Running { guard, .. } => guard.pid(),
            Launch::Failed(_) => None,
        }
    }

    /// Cloneable termination trigger, usable while `outcome()` is awaited
    pub fn terminator(&self) -> Terminator {
        self.terminator.clone()
    }

    pub fn terminate(&self) {
        self.terminator.terminate();
    }

    /// Wait for the single outcome
    pub async fn outcome(self) -> Outcome {
        self.join().await.outcome
    }

    /// Wait for the single outcome and the lifecycle record
    pub async fn join(self) -> TaskReport {
        let TaskHandle {
            id,
            task_name,
            mut state,
            started_at,
            launch,
            resolver,
            timeout,
            terminator: _terminator,
            mut token,
            time_provider,
        } = self;

        let (outcome, pid) = match launch {
            Launch::Failed(failure) => (Outcome::failure(failure), None),
            Launch::Running {
                mut signals,
                mut guard,
            } => {
                let pid = guard.pid();
                // Resolver first: a signal already queued beats a pending terminate
                let outcome = tokio::select! {
                    biased;
                    outcome = resolver.resolve(&mut signals) => outcome,
                    _ = token.wait() => {
                        warn!(task_id = %id, "Termination requested by caller");
                        if let Err(e) = guard.terminate().await {
                            warn!(task_id = %id, error = %e, "Failed to stop terminated context");
                        }
                        Outcome::failure(TaskFailure::new(
                            FailureKind::Terminated,
                            "Worker terminated by caller",
                        ))
                    }
                    _ = deadline(timeout) => {
                        let ms = timeout.map(|d| d.as_millis()).unwrap_or_default();
                        warn!(task_id = %id, timeout_ms = %ms, "Task deadline elapsed");
                        if let Err(e) = guard.terminate().await {
                            warn!(task_id = %id, error = %e, "Failed to stop timed out context");
                        }
                        Outcome::failure(TaskFailure::new(
                            FailureKind::TimedOut,
                            format!("Task timed out after {}ms", ms),
                        ))
                    }
                };
                // Anything the context sends from here on is ignored
                drop(signals);
                guard.release();
                (outcome, pid)
            }
        };

        let kind = match &outcome {
            Outcome::Success { .. } => ResolutionKind::Success,
            Outcome::Failure { .. } => ResolutionKind::Failure,
            Outcome::AbnormalTermination { .. } => ResolutionKind::AbnormalTermination,
        };
        if let Err(e) = state.resolve(kind).and_then(|_| state.terminate()) {
            error!(task_id = %id, error = %e, "Task lifecycle violated");
        }

        let duration_ms = time_provider.now_millis() - started_at;
        if outcome.is_success() {
            info!(task_id = %id, task = %task_name, duration_ms = %duration_ms, "Task resolved");
        } else {
            warn!(
                task_id = %id,
                task = %task_name,
                duration_ms = %duration_ms,
                outcome = %outcome,
                "Task resolved with failure"
            );
        }
        debug!(task_id = %id, state = %state, "Execution context released");

        TaskReport {
            id,
            task: task_name,
            state,
            duration_ms,
            pid,
            outcome,
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}
