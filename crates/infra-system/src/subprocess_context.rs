// Subprocess execution context
// reason: tokio::process for async child management, nix for SIGTERM on unix
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{WorkRequest, WorkResponse};
use offload_core::application::coordinator::constants::{
    GRACEFUL_KILL_TIMEOUT, PANIC_EXIT_CODE, SIGNAL_EXIT_BASE, STDOUT_DRAIN_TIMEOUT,
};
use offload_core::port::{ContextGuard, ExecutionContext, ExecutionError, SignalSender, TaskSpec};

/// Environment variables passed to children by default
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "USER", "RUST_LOG", "OFFLOAD_LOG_FORMAT"];

/// How to start a worker process
#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Only these parent variables reach the child
    pub env_allowlist: Vec<String>,
    /// SIGTERM -> SIGKILL escalation delay
    pub graceful_kill_timeout: Duration,
}

impl SubprocessConfig {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: PathBuf::from("."),
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            graceful_kill_timeout: GRACEFUL_KILL_TIMEOUT,
        }
    }

    /// Re-run the current executable with `args` (e.g. its hidden worker subcommand)
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the current executable cannot be located
    pub fn current_exe(args: Vec<String>) -> Result<Self, ExecutionError> {
        let exe = std::env::current_exe().map_err(|e| {
            ExecutionError::SpawnFailed(format!("Failed to get current executable: {}", e))
        })?;
        Ok(Self::new(exe, args))
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_env_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.env_allowlist = allowlist;
        self
    }

    pub fn with_graceful_kill_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_kill_timeout = timeout;
        self
    }
}

/// Subprocess context
/// Spawns one isolated child process per invocation with environment allowlisting
pub struct SubprocessContext {
    config: SubprocessConfig,
}

impl SubprocessContext {
    pub fn new(config: SubprocessConfig) -> Self {
        Self { config }
    }

    /// Filter environment variables to allowlist only
    fn filter_env(&self, env: &HashMap<String, String>) -> HashMap<String, String> {
        env.iter()
            .filter(|(k, _)| self.config.env_allowlist.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn spawn_child(&self) -> Result<Child, ExecutionError> {
        let parent_env: HashMap<String, String> = std::env::vars().collect();
        let filtered_env = self.filter_env(&parent_env);

        Command::new(&self.config.program)
            .args(&self.config.args)
            .env_clear()
            .envs(&filtered_env)
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Worker logs go to parent's stderr
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutionError::SpawnFailed(format!("{}: {}", self.config.program.display(), e))
            })
    }
}

/// Exit code for a finished child; signal deaths map to 128 + N
fn exit_code(status: ExitStatus) -> (i32, Option<String>) {
    if let Some(code) = status.code() {
        return (code, None);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return (
                SIGNAL_EXIT_BASE + signal,
                Some(format!("killed by signal {}", signal)),
            );
        }
    }

    (PANIC_EXIT_CODE, Some(format!("unknown exit status: {}", status)))
}

/// Deliver the request line, then close stdin so the worker sees EOF
async fn deliver_request(mut stdin: ChildStdin, line: String, task_id: String) {
    if let Err(e) = stdin.write_all(line.as_bytes()).await {
        // Child exited without reading; its exit code tells the story
        debug!(task_id = %task_id, error = %e, "Failed to deliver request");
        return;
    }
    if let Err(e) = stdin.shutdown().await {
        debug!(task_id = %task_id, error = %e, "Failed to close worker stdin");
    }
}

/// Forward the first protocol response on stdout as a signal, drain the rest
///
/// Lines are read as raw bytes; anything that is not a protocol response
/// (including invalid UTF-8) is skipped.
async fn forward_responses(stdout: ChildStdout, signals: SignalSender, task_id: String) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    let mut delivered = false;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if line.trim().is_empty() {
                    continue;
                }
                match WorkResponse::from_line(&line) {
                    Ok(response) if !delivered => {
                        delivered = true;
                        match response {
                            WorkResponse::Result { value } => signals.result(value),
                            WorkResponse::Error { message } => signals.error(message),
                        };
                    }
                    Ok(_) => debug!(task_id = %task_id, "Ignoring extra worker response"),
                    Err(_) => debug!(task_id = %task_id, line = %line.trim_end(), "Ignoring non-protocol output"),
                }
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Failed to read worker stdout");
                break;
            }
        }
    }
}

/// Kill process with SIGTERM first, then SIGKILL if needed
async fn kill_graceful(child: &mut Child, graceful_timeout: Duration) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            info!(pid = %pid, "Sending SIGTERM for graceful shutdown");
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => match tokio::time::timeout(graceful_timeout, child.wait()).await {
                    Ok(status) => return status,
                    Err(_) => warn!(pid = %pid, "Process did not exit after SIGTERM, sending SIGKILL"),
                },
                Err(e) => warn!(pid = %pid, error = %e, "SIGTERM failed, sending SIGKILL"),
            }
        }
    }

    child.start_kill()?;
    child.wait().await
}

/// Waits for the child (or a kill request), then reports its exit
async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    mut reader: JoinHandle<()>,
    signals: SignalSender,
    graceful_timeout: Duration,
    task_id: String,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = kill_rx => kill_graceful(&mut child, graceful_timeout).await,
    };

    // Let a result written just before exit reach the channel first
    if tokio::time::timeout(STDOUT_DRAIN_TIMEOUT, &mut reader).await.is_err() {
        debug!(task_id = %task_id, "Worker stdout still open after exit");
        reader.abort();
    }

    match status {
        Ok(status) => {
            let (code, detail) = exit_code(status);
            debug!(task_id = %task_id, code = code, "Worker process exited");
            signals.exit(code, detail);
        }
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "Failed to wait for worker process");
            signals.exit(PANIC_EXIT_CODE, Some(e.to_string()));
        }
    }
}

struct ProcessGuard {
    task_id: String,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    supervisor: Option<JoinHandle<()>>,
    graceful_timeout: Duration,
}

impl ProcessGuard {
    fn request_kill(&mut self) -> bool {
        match self.kill_tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl ContextGuard for ProcessGuard {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn terminate(&mut self) -> Result<(), ExecutionError> {
        if !self.request_kill() {
            return Ok(()); // Already exited
        }
        if let Some(supervisor) = self.supervisor.take() {
            let limit = self.graceful_timeout + STDOUT_DRAIN_TIMEOUT + Duration::from_secs(1);
            tokio::time::timeout(limit, supervisor)
                .await
                .map_err(|_| ExecutionError::Killed(format!("pid {:?} did not exit", self.pid)))?
                .map_err(|e| ExecutionError::Killed(e.to_string()))?;
        }
        info!(task_id = %self.task_id, pid = ?self.pid, "Worker process terminated");
        Ok(())
    }

    fn release(mut self: Box<Self>) {
        let still_running = self
            .supervisor
            .as_ref()
            .is_some_and(|supervisor| !supervisor.is_finished());
        if still_running && self.request_kill() {
            debug!(task_id = %self.task_id, pid = ?self.pid, "Stopping worker process on release");
        }
    }
}

#[async_trait]
impl ExecutionContext for SubprocessContext {
    async fn launch(
        &self,
        task: &TaskSpec,
        signals: SignalSender,
    ) -> Result<Box<dyn ContextGuard>, ExecutionError> {
        let line = WorkRequest::run(task.id.clone(), task.task_name.clone(), task.payload.clone())
            .to_line()
            .map_err(|e| ExecutionError::Protocol(e.to_string()))?;

        let mut child = self.spawn_child()?;
        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecutionError::SpawnFailed("Child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::SpawnFailed("Child stdout not captured".into()))?;

        info!(
            task_id = %task.id,
            task = %task.task_name,
            program = %self.config.program.display(),
            pid = ?pid,
            "Worker process started"
        );

        tokio::spawn(deliver_request(stdin, line, task.id.clone()));
        let reader = tokio::spawn(forward_responses(stdout, signals.clone(), task.id.clone()));

        let (kill_tx, kill_rx) = oneshot::channel();
        let supervisor = tokio::spawn(supervise(
            child,
            kill_rx,
            reader,
            signals,
            self.config.graceful_kill_timeout,
            task.id.clone(),
        ));

        Ok(Box::new(ProcessGuard {
            task_id: task.id.clone(),
            pid,
            kill_tx: Some(kill_tx),
            supervisor: Some(supervisor),
            graceful_timeout: self.config.graceful_kill_timeout,
        }))
    }

    fn kind(&self) -> &'static str {
        "process"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use offload_core::domain::Payload;
    use offload_core::port::{signal_channel, Signal};
    use serde_json::json;

    fn sh(script: &str) -> SubprocessContext {
        SubprocessContext::new(SubprocessConfig::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
        ))
    }

    fn spec() -> TaskSpec {
        TaskSpec {
            id: "t-1".to_string(),
            task_name: "greet".to_string(),
            payload: Payload::from("hello"),
        }
    }

    async fn collect(ctx: &SubprocessContext) -> Vec<Signal> {
        let (tx, mut rx) = signal_channel();
        let guard = ctx.launch(&spec(), tx).await.unwrap();
        let mut signals = Vec::new();
        while let Some(signal) = rx.recv().await {
            signals.push(signal);
        }
        guard.release();
        signals
    }

    #[tokio::test]
    async fn test_child_receives_request_and_answers() {
        let ctx = sh(r#"read req; case "$req" in *greet*) echo '{"type":"result","value":"ok"}';; esac"#);
        let signals = collect(&ctx).await;
        assert_eq!(
            signals,
            vec![
                Signal::Result(json!("ok")),
                Signal::Exit { code: 0, detail: None },
            ]
        );
    }

    #[tokio::test]
    async fn test_non_protocol_output_is_ignored() {
        let ctx = sh(r#"echo starting; echo '{"type":"error","message":"nope"}'; echo '{"type":"result","value":1}'"#);
        let signals = collect(&ctx).await;
        assert_eq!(signals[0], Signal::Error("nope".to_string()));
        assert_eq!(signals.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_hide_result() {
        let ctx = sh(r#"printf '\377\376 debug\n'; echo '{"type":"result","value":1}'"#);
        let signals = collect(&ctx).await;
        assert_eq!(
            signals,
            vec![
                Signal::Result(json!(1)),
                Signal::Exit { code: 0, detail: None },
            ]
        );
    }

    #[tokio::test]
    async fn test_open_stdout_after_exit_does_not_block_exit_signal() {
        // The backgrounded sleep inherits stdout and keeps it open
        let ctx = sh("sleep 5 & exit 4");
        let started = std::time::Instant::now();
        let (tx, mut rx) = signal_channel();
        let guard = ctx.launch(&spec(), tx).await.unwrap();

        match rx.recv().await {
            Some(Signal::Exit { code, .. }) => assert_eq!(code, 4),
            other => panic!("expected exit signal, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(3));
        guard.release();
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() {
        let signals = collect(&sh("exit 3")).await;
        assert_eq!(signals, vec![Signal::Exit { code: 3, detail: None }]);
    }

    #[tokio::test]
    async fn test_killed_by_signal_maps_to_128_plus_n() {
        let signals = collect(&sh("kill -9 $$")).await;
        assert_eq!(
            signals,
            vec![Signal::Exit {
                code: 137,
                detail: Some("killed by signal 9".to_string())
            }]
        );
    }

    #[tokio::test]
    async fn test_terminate_stops_child() {
        let ctx = sh("exec sleep 30");
        let (tx, mut rx) = signal_channel();
        let mut guard = ctx.launch(&spec(), tx).await.unwrap();
        assert!(guard.pid().is_some());

        guard.terminate().await.unwrap();

        // SIGTERM: 128 + 15
        match rx.recv().await {
            Some(Signal::Exit { code, .. }) => assert_eq!(code, 143),
            other => panic!("expected exit signal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_fails_spawn() {
        let ctx = SubprocessContext::new(SubprocessConfig::new(
            "/nonexistent/offload-worker",
            vec![],
        ));
        let (tx, _rx) = signal_channel();
        let err = ctx.launch(&spec(), tx).await.err().unwrap();
        assert!(matches!(err, ExecutionError::SpawnFailed(_)));
    }

    #[test]
    fn test_env_filtering() {
        let ctx = SubprocessContext::new(
            SubprocessConfig::new("true", vec![])
                .with_env_allowlist(vec!["ALLOWED_VAR".to_string()]),
        );

        let mut env = HashMap::new();
        env.insert("ALLOWED_VAR".to_string(), "value1".to_string());
        env.insert("BLOCKED_VAR".to_string(), "value2".to_string());

        let filtered = ctx.filter_env(&env);

        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("ALLOWED_VAR"));
        assert!(!filtered.contains_key("BLOCKED_VAR"));
    }
}
