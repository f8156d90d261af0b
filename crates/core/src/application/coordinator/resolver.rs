// Signal resolution: turns the first terminal signal(s) into exactly one Outcome
use crate::domain::{Outcome, TaskFailure};
use crate::port::{Signal, SignalReceiver};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Resolves a signal stream into a single Outcome
///
/// Precedence:
/// - `Result` / `Error` resolve immediately
/// - `Exit` opens a grace window; a `Result` / `Error` arriving inside it wins
/// - after the window, a non-zero code is an abnormal termination and
///   code 0 is a protocol violation
/// - a channel closed without any signal is a protocol violation
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    exit_grace: Duration,
}

impl Resolver {
    pub fn new(exit_grace: Duration) -> Self {
        Self { exit_grace }
    }

    /// Wait for the outcome. Signals left in the channel afterwards are
    /// never read.
    pub async fn resolve(&self, signals: &mut SignalReceiver) -> Outcome {
        match signals.recv().await {
            Some(Signal::Result(value)) => Outcome::success(value),
            Some(Signal::Error(message)) => Outcome::failure(TaskFailure::computation(message)),
            Some(Signal::Exit { code, detail }) => self.resolve_after_exit(signals, code, detail).await,
            None => {
                debug!("Signal channel closed without any terminal signal");
                Outcome::failure(TaskFailure::protocol_violation())
            }
        }
    }

    async fn resolve_after_exit(
        &self,
        signals: &mut SignalReceiver,
        code: i32,
        detail: Option<String>,
    ) -> Outcome {
        if let Ok(Some(outcome)) = timeout(self.exit_grace, next_explicit(signals)).await {
            debug!(code = code, "Explicit signal arrived inside exit grace window");
            return outcome;
        }
        Self::from_exit(code, detail)
    }

    /// Outcome for an exit with no explicit signal
    pub fn from_exit(code: i32, detail: Option<String>) -> Outcome {
        if code == 0 {
            Outcome::failure(TaskFailure::protocol_violation())
        } else {
            Outcome::abnormal(code, detail)
        }
    }
}

/// Next `Result` / `Error`, skipping duplicate exits
async fn next_explicit(signals: &mut SignalReceiver) -> Option<Outcome> {
    while let Some(signal) = signals.recv().await {
        match signal {
            Signal::Result(value) => return Some(Outcome::success(value)),
            Signal::Error(message) => {
                return Some(Outcome::failure(TaskFailure::computation(message)))
            }
            Signal::Exit { .. } => continue,
        }
    }
    None
}
