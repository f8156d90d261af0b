// Built-in Task Units

use super::coordinator::constants::MAX_EXIT_CODE;
use super::coordinator::request_exit;
use crate::domain::Payload;
use crate::port::{TaskError, TaskUnit};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Every built-in unit
pub fn all() -> Vec<Arc<dyn TaskUnit>> {
    vec![
        Arc::new(Greet),
        Arc::new(Fail),
        Arc::new(Panic),
        Arc::new(Sleep),
        Arc::new(Exit),
        Arc::new(Sum),
    ]
}

fn text(payload: &Payload) -> String {
    match payload.as_value() {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `"hello"` -> `"hello worker"`
pub struct Greet;

impl TaskUnit for Greet {
    fn name(&self) -> &str {
        "greet"
    }

    fn compute(&self, payload: Payload) -> Result<Value, TaskError> {
        let input = payload
            .as_str()
            .ok_or_else(|| TaskError::new("greet expects a string payload"))?;
        Ok(Value::String(format!("{} worker", input)))
    }
}

/// Always fails with the payload text
pub struct Fail;

impl TaskUnit for Fail {
    fn name(&self) -> &str {
        "fail"
    }

    fn compute(&self, payload: Payload) -> Result<Value, TaskError> {
        let message = text(&payload);
        if message.is_empty() {
            return Err(TaskError::new("task failed"));
        }
        Err(TaskError::new(message))
    }
}

/// Panics with the payload text
pub struct Panic;

impl TaskUnit for Panic {
    fn name(&self) -> &str {
        "panic"
    }

    fn compute(&self, payload: Payload) -> Result<Value, TaskError> {
        panic!("{}", text(&payload))
    }
}

#[derive(Deserialize)]
struct SleepArgs {
    ms: u64,
}

/// `{"ms": n}` -> sleeps n ms, returns n
pub struct Sleep;

impl TaskUnit for Sleep {
    fn name(&self) -> &str {
        "sleep"
    }

    fn compute(&self, payload: Payload) -> Result<Value, TaskError> {
        let args: SleepArgs = serde_json::from_value(payload.into_value())?;
        std::thread::sleep(Duration::from_millis(args.ms));
        Ok(json!(args.ms))
    }
}

#[derive(Deserialize)]
struct ExitArgs {
    code: i32,
}

/// `{"code": n}` -> ends the context with code n, no result
pub struct Exit;

impl TaskUnit for Exit {
    fn name(&self) -> &str {
        "exit"
    }

    fn compute(&self, payload: Payload) -> Result<Value, TaskError> {
        let args: ExitArgs = serde_json::from_value(payload.into_value())?;
        if !(0..=MAX_EXIT_CODE).contains(&args.code) {
            return Err(TaskError::new(format!(
                "Exit code must be between 0 and {}, got {}",
                MAX_EXIT_CODE, args.code
            )));
        }
        request_exit(args.code)
    }
}

/// `[1, 2.5, 3]` -> 6.5
pub struct Sum;

impl TaskUnit for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn compute(&self, payload: Payload) -> Result<Value, TaskError> {
        let numbers: Vec<f64> = serde_json::from_value(payload.into_value())?;
        Ok(json!(numbers.iter().sum::<f64>()))
    }
}
