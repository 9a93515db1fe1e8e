//! Error taxonomy for the orchestration core.
//!
//! Agent failures never cross the agent boundary as errors: an
//! [`AgentError`] is always folded into a failure
//! [`AgentResponse`](crate::messages::AgentResponse) tagged with its
//! [`ErrorKind`].

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::messages::Payload;

/// Failure class carried on every failure response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid input reported by the agent itself.
    Validation,
    /// The target agent is not registered.
    Lookup,
    /// The agent raised (errored or panicked) while running.
    Execution,
    /// The worker pool could not run or join the task.
    Pool,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Lookup => "lookup",
            ErrorKind::Execution => "execution",
            ErrorKind::Pool => "pool",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors an agent reports from `setup` or `execute`.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Required input is missing or malformed. The message is surfaced verbatim.
    #[error("{0}")]
    Validation(String),

    /// The agent's own logic failed.
    #[error("{0}")]
    Execution(String),

    /// An external collaborator (analytics, text generation, ...) failed.
    #[error("{0:#}")]
    Collaborator(#[from] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AgentError::Validation(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        AgentError::Execution(msg.into())
    }

    /// The response-level class this error maps to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Validation(_) => ErrorKind::Validation,
            AgentError::Execution(_)
            | AgentError::Collaborator(_)
            | AgentError::Serialization(_) => ErrorKind::Execution,
        }
    }
}

/// Errors from loading runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },
}

/// Errors produced while running a workflow template.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    /// A required step returned a failure response; the run stopped there.
    #[error("{message}")]
    StepFailed {
        message: String,
        details: Option<String>,
        kind: Option<ErrorKind>,
    },

    #[error("template {template} is missing seed value {key}")]
    MissingSeed { template: String, key: String },

    #[error("invalid workflow template: {0}")]
    InvalidTemplate(String),
}

impl WorkflowError {
    /// Render as the `{"error": ..., "details": ...}` map returned to callers.
    pub fn to_payload(&self) -> Payload {
        let details = match self {
            WorkflowError::StepFailed { details, .. } => json!(details),
            _ => serde_json::Value::Null,
        };
        let mut map = Payload::new();
        map.insert("error".to_string(), json!(self.to_string()));
        map.insert("details".to_string(), details);
        map
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked with a non-string payload".to_string()
    }
}
