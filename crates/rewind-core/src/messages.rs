//! Request/response contract between the orchestrator and agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ErrorKind;

/// Key/value payload carried by requests, responses, events and context updates.
pub type Payload = Map<String, Value>;

/// Coerce a JSON value into a [`Payload`].
///
/// Objects are used as-is, `null` becomes an empty payload, and any other
/// value is wrapped as `{"value": v}`.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        Value::Null => Payload::new(),
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// A single task addressed to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Unique per call.
    pub request_id: String,
    pub agent_name: String,
    /// Free-form label; routing beyond agent selection is up to the agent.
    pub task: String,
    pub input_data: Payload,
    /// Context keys read and merged into `input_data` before execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_keys: Option<Vec<String>>,
    /// Keys the caller expects the agent to write. Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_keys: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl AgentRequest {
    pub fn new(agent_name: impl Into<String>, task: impl Into<String>, input_data: Payload) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            agent_name: agent_name.into(),
            task: task.into(),
            input_data,
            context_keys: None,
            output_keys: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_context_keys(mut self, keys: Option<Vec<String>>) -> Self {
        self.context_keys = keys;
        self
    }

    pub fn with_output_keys(mut self, keys: Option<Vec<String>>) -> Self {
        self.output_keys = keys;
        self
    }

    /// Look up a non-null input field.
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.input_data.get(key).filter(|v| !v.is_null())
    }

    /// Look up a string input field.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.input(key).and_then(Value::as_str)
    }
}

/// What an agent produces on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutput {
    pub result: Option<Payload>,
    /// Merged into the shared context after a successful run.
    pub context_updates: Option<Payload>,
}

impl AgentOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, result: Payload) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_context_updates(mut self, updates: Payload) -> Self {
        self.context_updates = Some(updates);
        self
    }
}

/// Exactly one of these is produced for every delegation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Echoes the request id; empty when no request was ever built.
    pub request_id: String,
    pub agent_name: String,
    pub task: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_updates: Option<Payload>,
    pub timestamp: DateTime<Utc>,
}

impl AgentResponse {
    pub fn succeeded(request: &AgentRequest, output: AgentOutput) -> Self {
        Self {
            request_id: request.request_id.clone(),
            agent_name: request.agent_name.clone(),
            task: request.task.clone(),
            success: true,
            result: output.result,
            error: None,
            error_kind: None,
            context_updates: output.context_updates,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(request: &AgentRequest, kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            request_id: request.request_id.clone(),
            ..Self::detached(&request.agent_name, &request.task, kind, error)
        }
    }

    /// Response for a delegation whose agent is not registered.
    pub fn not_found(agent_name: &str, task: &str) -> Self {
        Self::detached(
            agent_name,
            task,
            ErrorKind::Lookup,
            format!("Agent '{agent_name}' not found in registry"),
        )
    }

    /// Response for a pooled task that could not be run or joined.
    pub fn pool_failure(agent_name: &str, task: &str, error: impl Into<String>) -> Self {
        Self::detached(agent_name, task, ErrorKind::Pool, error)
    }

    fn detached(agent_name: &str, task: &str, kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            request_id: String::new(),
            agent_name: agent_name.to_string(),
            task: task.to_string(),
            success: false,
            result: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            context_updates: None,
            timestamp: Utc::now(),
        }
    }
}
