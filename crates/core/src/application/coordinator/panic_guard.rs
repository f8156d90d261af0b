// Panic isolation for Task Units
use super::constants::{MAX_EXIT_CODE, PANIC_EXIT_CODE};
use std::any::Any;
use std::panic::{catch_unwind, panic_any, UnwindSafe};
use std::sync::Once;
use tracing::{error, warn};

/// Panic payload used by a Task Unit to end its context with a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRequest(pub i32);

/// End the current context with `code` without producing a result.
///
/// Unwinds to the nearest `execute_guarded`, which reports it as
/// `PanicGuardResult::Exited`.
pub fn request_exit(code: i32) -> ! {
    install_exit_hook();
    panic_any(ExitRequest(code))
}

static EXIT_HOOK: Once = Once::new();

/// Keep the panic hook from reporting exit requests as panics
fn install_exit_hook() {
    EXIT_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<ExitRequest>().is_none() {
                previous(info);
            }
        }));
    });
}

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed
    Success(T),
    /// Execution panicked
    Panicked(String),
    /// Execution asked to end the context with a status code
    Exited(i32),
}

/// Extract a readable message from a panic payload
pub fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Execute a closure with panic isolation
///
/// If the closure panics, the panic is caught and returned as PanicGuardResult::Panicked.
/// A panic carrying an `ExitRequest` is returned as PanicGuardResult::Exited.
///
/// # Example
/// ```text
/// let result = execute_guarded(|| {
///     panic!("test panic");
/// });
///
/// match result {
///     PanicGuardResult::Panicked(msg) => {
///         println!("Caught panic: {}", msg);
///     }
///     _ => {}
/// }
/// ```
pub fn execute_guarded<F, T>(f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T + UnwindSafe,
{
    match catch_unwind(f) {
        Ok(result) => PanicGuardResult::Success(result),
        Err(panic_info) => {
            if let Some(&ExitRequest(code)) = panic_info.downcast_ref::<ExitRequest>() {
                if !(0..=MAX_EXIT_CODE).contains(&code) {
                    warn!(code = code, "Exit code out of range, reporting {}", PANIC_EXIT_CODE);
                    return PanicGuardResult::Exited(PANIC_EXIT_CODE);
                }
                return PanicGuardResult::Exited(code);
            }
            let panic_msg = panic_message(panic_info.as_ref());
            error!(panic_msg = %panic_msg, "Task unit panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}
