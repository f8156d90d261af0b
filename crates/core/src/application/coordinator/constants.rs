// Coordinator constants (no magic values)
use std::time::Duration;

/// Time to wait after an exit signal for a late result/error (50ms)
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_millis(50);

/// Exit code reported when a Task Unit panics inside a thread context
pub const PANIC_EXIT_CODE: i32 = 1;

/// Largest status a process can report; exit requests above it are invalid
pub const MAX_EXIT_CODE: i32 = 255;

/// Exit code reported for a child killed by signal N is SIGNAL_EXIT_BASE + N
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// Graceful process shutdown timeout before SIGKILL (5 seconds)
pub const GRACEFUL_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit code of a worker process that could not read its request
pub const BAD_REQUEST_EXIT_CODE: i32 = 2;

/// How long a finished child's stdout may take to drain (500ms)
pub const STDOUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Stack size for dedicated task threads (8 MiB)
pub const TASK_THREAD_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Environment variable overriding the exit grace window (ms)
pub const ENV_EXIT_GRACE_MS: &str = "OFFLOAD_EXIT_GRACE_MS";

/// Environment variable setting the task timeout (ms)
pub const ENV_TIMEOUT_MS: &str = "OFFLOAD_TIMEOUT_MS";
