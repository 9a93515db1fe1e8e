//! The `handle_request` boundary: context merge, write-back and containment.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rewind_core::{
    payload, Agent, AgentError, AgentEvent, AgentHandle, AgentOutput, AgentRequest, ErrorKind,
    EventKind, SharedState,
};
use serde_json::json;

/// Echoes its input back and writes `updates` to the context.
struct Echo {
    updates: serde_json::Value,
}

#[async_trait]
impl Agent for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(
        &self,
        request: &AgentRequest,
        _shared: &SharedState,
    ) -> Result<AgentOutput, AgentError> {
        Ok(AgentOutput::new()
            .with_result(request.input_data.clone())
            .with_context_updates(payload(self.updates.clone())))
    }
}

enum Failure {
    Error,
    Panic,
    Collaborator,
}

struct Faulty(Failure);

#[async_trait]
impl Agent for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn execute(
        &self,
        _request: &AgentRequest,
        _shared: &SharedState,
    ) -> Result<AgentOutput, AgentError> {
        match self.0 {
            Failure::Error => Err(AgentError::execution("division by zero")),
            Failure::Panic => panic!("index out of bounds"),
            Failure::Collaborator => {
                Err(anyhow::anyhow!("model throttled").context("text generation failed").into())
            }
        }
    }
}

fn failure_counter(shared: &SharedState) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    shared
        .events()
        .subscribe(EventKind::AgentFailed, move |_: &AgentEvent| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    count
}

#[tokio::test]
async fn test_context_updates_are_readable_after_success() {
    let shared = SharedState::default();
    let handle = AgentHandle::new(
        Echo {
            updates: json!({"match_analysis": {"kda": 2.5}, "match_count": 20}),
        },
        shared.clone(),
    );

    let response = handle
        .handle_request(AgentRequest::new("echo", "analyze", payload(json!({"puuid": "p1"}))))
        .await;

    assert!(response.success);
    assert_eq!(shared.context().get("match_analysis"), Some(json!({"kda": 2.5})));
    assert_eq!(shared.context().get("match_count"), Some(json!(20)));
    assert_eq!(shared.context().get_version(), 1);

    let history = shared.context().get_history();
    assert_eq!(history[0].writer.as_deref(), Some("echo"));

    let kinds: Vec<EventKind> = shared.events().get_history().iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec![EventKind::ContextUpdated, EventKind::AgentCompleted]);
}

#[tokio::test]
async fn test_context_values_override_input_fields() {
    let shared = SharedState::default();
    shared.context().set("puuid", json!("from-context"), None);
    let handle = AgentHandle::new(Echo { updates: json!({}) }, shared.clone());

    let request = AgentRequest::new("echo", "t", payload(json!({"puuid": "from-input", "x": 1})))
        .with_context_keys(Some(vec!["puuid".to_string()]));
    let response = handle.handle_request(request).await;

    let result = response.result.unwrap();
    assert_eq!(result["puuid"], "from-context");
    assert_eq!(result["x"], 1);
    // Empty updates are not written back.
    assert_eq!(shared.context().get_version(), 1);
}

#[tokio::test]
async fn test_execution_error_becomes_failure_response() {
    let shared = SharedState::default();
    let failures = failure_counter(&shared);
    let handle = AgentHandle::new(Faulty(Failure::Error), shared.clone());

    let request = AgentRequest::new("faulty", "t", Default::default());
    let request_id = request.request_id.clone();
    let response = handle.handle_request(request).await;

    assert!(!response.success);
    assert_eq!(response.request_id, request_id);
    assert_eq!(response.error.as_deref(), Some("division by zero"));
    assert_eq!(response.error_kind, Some(ErrorKind::Execution));
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(shared.context().get_version(), 0);
}

#[tokio::test]
async fn test_panic_is_contained() {
    let shared = SharedState::default();
    let failures = failure_counter(&shared);
    let handle = AgentHandle::new(Faulty(Failure::Panic), shared.clone());

    let response = handle
        .handle_request(AgentRequest::new("faulty", "t", Default::default()))
        .await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("index out of bounds"));
    assert_eq!(failures.load(Ordering::SeqCst), 1);

    // The handle stays usable after a contained panic.
    let again = handle
        .handle_request(AgentRequest::new("faulty", "t", Default::default()))
        .await;
    assert!(!again.success);
    assert_eq!(failures.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_collaborator_error_chain_is_reported() {
    let shared = SharedState::default();
    let handle = AgentHandle::new(Faulty(Failure::Collaborator), shared);

    let response = handle
        .handle_request(AgentRequest::new("faulty", "t", Default::default()))
        .await;

    let error = response.error.unwrap();
    assert!(error.contains("text generation failed"));
    assert!(error.contains("model throttled"));
}

#[tokio::test]
async fn test_failed_event_names_agent_and_task() {
    let shared = SharedState::default();
    let handle = AgentHandle::new(Faulty(Failure::Error), shared.clone());
    handle
        .handle_request(AgentRequest::new("faulty", "crunch", Default::default()))
        .await;

    let history = shared.events().get_history();
    let failed = history
        .iter()
        .find(|e| e.kind() == EventKind::AgentFailed)
        .expect("agent_failed event");
    assert_eq!(failed.source(), "faulty");
    assert_eq!(failed.data()["task"], "crunch");
    assert_eq!(failed.data()["error"], "division by zero");
}
