// Worker process entry point
// Runs inside the child spawned by SubprocessContext: one request in, one response out

use crate::protocol::{WorkRequest, WorkResponse};
use offload_core::application::coordinator::constants::{BAD_REQUEST_EXIT_CODE, PANIC_EXIT_CODE};
use offload_core::application::coordinator::{execute_guarded, PanicGuardResult};
use offload_core::application::TaskRegistry;
use std::io::{self, BufRead, Write};
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info};

/// Serve exactly one request from `input`, answer on `output`.
///
/// Returns the process exit code:
/// - `0` after a result or error response
/// - `1` if the Task Unit panicked (no response is written)
/// - `2` if the request could not be read
/// - the requested code if the unit asked to exit
pub fn run_worker<R: BufRead, W: Write>(registry: &TaskRegistry, mut input: R, mut output: W) -> i32 {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => {
            error!("Worker stdin closed before a request arrived");
            return BAD_REQUEST_EXIT_CODE;
        }
        Ok(_) => {}
        Err(e) => {
            error!(error = %e, "Failed to read worker request");
            return BAD_REQUEST_EXIT_CODE;
        }
    }

    let WorkRequest::Run { id, task, payload } = match WorkRequest::from_line(&line) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Invalid worker request");
            return BAD_REQUEST_EXIT_CODE;
        }
    };

    info!(task_id = %id, task = %task, "Worker received task");

    let response = match registry.get(&task) {
        None => WorkResponse::error(format!("Unknown task: {}", task)),
        Some(unit) => match execute_guarded(AssertUnwindSafe(|| unit.compute(payload))) {
            PanicGuardResult::Success(Ok(value)) => WorkResponse::result(value),
            PanicGuardResult::Success(Err(e)) => WorkResponse::error(e.message),
            PanicGuardResult::Panicked(_) => return PANIC_EXIT_CODE,
            PanicGuardResult::Exited(code) => {
                debug!(task_id = %id, code = code, "Task requested exit");
                return code;
            }
        },
    };

    match write_response(&mut output, &response) {
        Ok(()) => 0,
        Err(e) => {
            error!(task_id = %id, error = %e, "Failed to write worker response");
            PANIC_EXIT_CODE
        }
    }
}

fn write_response<W: Write>(output: &mut W, response: &WorkResponse) -> io::Result<()> {
    let line = response.to_line().map_err(io::Error::other)?;
    output.write_all(line.as_bytes())?;
    output.flush()
}

/// Serve one request on the process's stdin/stdout
pub fn run_worker_main(registry: &TaskRegistry) -> i32 {
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_worker(registry, stdin.lock(), stdout.lock())
}
