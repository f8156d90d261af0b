// Execution Context Port
// Abstraction over the isolated context (OS thread or child process) a Task Unit runs in

use crate::domain::{Payload, TaskId};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Terminal signal emitted by an execution context
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Task Unit produced a value
    Result(Value),
    /// Task Unit explicitly reported an error
    Error(String),
    /// Context ended with a status code
    Exit { code: i32, detail: Option<String> },
}

/// Write side of the one-shot signal channel.
///
/// Sending never blocks, so it is safe from plain OS threads. Sends after
/// the coordinator has resolved are silently dropped.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Signal>,
}

/// Read side of the signal channel (owned by the coordinator)
pub type SignalReceiver = mpsc::UnboundedReceiver<Signal>;

/// Create a signal channel
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SignalSender { tx }, rx)
}

impl SignalSender {
    /// Returns false if nobody is listening any more
    pub fn send(&self, signal: Signal) -> bool {
        self.tx.send(signal).is_ok()
    }

    pub fn result(&self, value: Value) -> bool {
        self.send(Signal::Result(value))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(Signal::Error(message.into()))
    }

    pub fn exit(&self, code: i32, detail: Option<String>) -> bool {
        self.send(Signal::Exit { code, detail })
    }

    /// Whether the coordinator has stopped listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Everything a context needs to start one invocation
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: TaskId,
    pub task_name: String,
    pub payload: Payload,
}

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Process killed: {0}")]
    Killed(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::IoError(err.to_string())
    }
}

/// Handle on a launched context, held by the coordinator until resolution
#[async_trait]
pub trait ContextGuard: Send {
    /// OS process id, if the context is a process
    fn pid(&self) -> Option<u32>;

    /// Stop the context on caller request
    ///
    /// # Errors
    /// - ExecutionError::Killed if the context cannot be stopped
    async fn terminate(&mut self) -> Result<(), ExecutionError>;

    /// Release the context after the outcome is resolved
    fn release(self: Box<Self>);
}

/// Execution Context trait
///
/// Implementations:
/// - ThreadContext: dedicated OS thread per invocation
/// - SubprocessContext: child process per invocation
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    /// Start one isolated context and deliver the payload to it
    ///
    /// The context must eventually send at least one terminal signal
    /// through `signals`, or drop every sender.
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the context cannot be started
    /// - ExecutionError::UnknownTask if no unit is registered under the name
    async fn launch(
        &self,
        task: &TaskSpec,
        signals: SignalSender,
    ) -> Result<Box<dyn ContextGuard>, ExecutionError>;

    /// Short name for logs
    fn kind(&self) -> &'static str;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    /// Scripted context: replays a fixed signal sequence with delays
    pub struct ScriptedContext {
        script: Vec<(Duration, Signal)>,
        spawn_error: Option<ExecutionError>,
        launches: Arc<AtomicUsize>,
        terminations: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    impl ScriptedContext {
        /// Each entry waits its delay, then sends its signal
        pub fn new(script: Vec<(Duration, Signal)>) -> Self {
            Self {
                script,
                spawn_error: None,
                launches: Arc::new(AtomicUsize::new(0)),
                terminations: Arc::new(AtomicUsize::new(0)),
                releases: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Sends every signal immediately, in order
        pub fn immediate(signals: Vec<Signal>) -> Self {
            Self::new(signals.into_iter().map(|s| (Duration::ZERO, s)).collect())
        }

        pub fn failing(error: ExecutionError) -> Self {
            let mut ctx = Self::new(vec![]);
            ctx.spawn_error = Some(error);
            ctx
        }

        pub fn launch_count(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }

        pub fn terminate_count(&self) -> usize {
            self.terminations.load(Ordering::SeqCst)
        }

        pub fn release_count(&self) -> usize {
            self.releases.load(Ordering::SeqCst)
        }
    }

    struct ScriptedGuard {
        player: JoinHandle<()>,
        terminations: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ContextGuard for ScriptedGuard {
        fn pid(&self) -> Option<u32> {
            None
        }

        async fn terminate(&mut self) -> Result<(), ExecutionError> {
            self.terminations.fetch_add(1, Ordering::SeqCst);
            self.player.abort();
            Ok(())
        }

        fn release(self: Box<Self>) {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.player.abort();
        }
    }

    #[async_trait]
    impl ExecutionContext for ScriptedContext {
        async fn launch(
            &self,
            _task: &TaskSpec,
            signals: SignalSender,
        ) -> Result<Box<dyn ContextGuard>, ExecutionError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.spawn_error {
                return Err(err.clone());
            }

            let script = self.script.clone();
            let player = tokio::spawn(async move {
                for (delay, signal) in script {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    signals.send(signal);
                }
                // Keep the channel open like a context that never exits
                std::future::pending::<()>().await;
            });

            Ok(Box::new(ScriptedGuard {
                player,
                terminations: Arc::clone(&self.terminations),
                releases: Arc::clone(&self.releases),
            }))
        }

        fn kind(&self) -> &'static str {
            "scripted"
        }
    }

    /// Context that drops its sender without sending anything
    pub struct SilentContext;

    struct NoopGuard;

    #[async_trait]
    impl ContextGuard for NoopGuard {
        fn pid(&self) -> Option<u32> {
            None
        }

        async fn terminate(&mut self) -> Result<(), ExecutionError> {
            Ok(())
        }

        fn release(self: Box<Self>) {}
    }

    #[async_trait]
    impl ExecutionContext for SilentContext {
        async fn launch(
            &self,
            _task: &TaskSpec,
            signals: SignalSender,
        ) -> Result<Box<dyn ContextGuard>, ExecutionError> {
            drop(signals);
            Ok(Box::new(NoopGuard))
        }

        fn kind(&self) -> &'static str {
            "silent"
        }
    }
}
