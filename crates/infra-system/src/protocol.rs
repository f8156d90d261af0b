// Worker wire protocol
// Newline-delimited JSON between the coordinator and a child process

use offload_core::domain::{Payload, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request from parent to worker (exactly one per child)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkRequest {
    /// Run one task on one payload
    #[serde(rename = "run")]
    Run {
        id: TaskId,
        task: String,
        payload: Payload,
    },
}

/// Response from worker to parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkResponse {
    /// Task Unit produced a value
    #[serde(rename = "result")]
    Result { value: Value },

    /// Task Unit reported an error
    #[serde(rename = "error")]
    Error { message: String },
}

impl WorkRequest {
    pub fn run(id: impl Into<String>, task: impl Into<String>, payload: Payload) -> Self {
        Self::Run {
            id: id.into(),
            task: task.into(),
            payload,
        }
    }

    /// Serialize to JSON line (with newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from JSON line
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

impl WorkResponse {
    pub fn result(value: Value) -> Self {
        Self::Result { value }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize to JSON line (with newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from JSON line
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
