//! The agent contract.
//!
//! Domain logic implements [`Agent`]. The runtime wraps each agent in an
//! [`AgentHandle`], which owns the one-time initialization guard and the
//! `handle_request` boundary: context read, execute, context write, and an
//! unconditional completion/failure event. Nothing an agent does (error or
//! panic) escapes `handle_request`; it always returns an [`AgentResponse`].

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::json;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{debug, warn, Instrument, Span};

use crate::config::RuntimeConfig;
use crate::context::ContextStore;
use crate::error::{panic_message, AgentError, ErrorKind};
use crate::events::{AgentEvent, EventBus, EventKind};
use crate::messages::{AgentOutput, AgentRequest, AgentResponse, Payload};
use crate::obs::emit_agent_finished;

/// Session-wide objects every agent sees. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SharedState {
    context: Arc<ContextStore>,
    events: Arc<EventBus>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(Arc::new(ContextStore::new()), Arc::new(EventBus::new()))
    }
}

impl SharedState {
    pub fn new(context: Arc<ContextStore>, events: Arc<EventBus>) -> Self {
        Self { context, events }
    }

    /// Build a fresh context and bus sized by `config`.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            Arc::new(ContextStore::with_history_cap(config.context_history_cap)),
            Arc::new(EventBus::with_history_cap(config.event_history_cap)),
        )
    }

    pub fn context(&self) -> &Arc<ContextStore> {
        &self.context
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}

/// A named unit of domain logic.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// One-time preparation, run by [`AgentHandle::initialize`].
    async fn setup(&self, _shared: &SharedState) -> Result<(), AgentError> {
        Ok(())
    }

    /// Perform the task. `request.input_data` already includes any requested
    /// context keys.
    ///
    /// Runs on tokio's blocking pool, so it may call synchronous
    /// collaborators directly.
    async fn execute(
        &self,
        request: &AgentRequest,
        shared: &SharedState,
    ) -> Result<AgentOutput, AgentError>;
}

/// Runtime wrapper binding an agent to the session's shared state.
pub struct AgentHandle {
    agent: Arc<dyn Agent>,
    shared: SharedState,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("name", &self.name())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl AgentHandle {
    pub fn new<A>(agent: A, shared: SharedState) -> Self
    where
        A: Agent + 'static,
    {
        Self::from_arc(Arc::new(agent), shared)
    }

    pub fn from_arc(agent: Arc<dyn Agent>, shared: SharedState) -> Self {
        Self {
            agent,
            shared,
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        self.agent.name()
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Run `setup` once. Later calls are no-ops once it has succeeded; a
    /// failed setup leaves the agent uninitialized so it can be retried.
    pub async fn initialize(&self) -> Result<(), AgentError> {
        if self.is_initialized() {
            return Ok(());
        }
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        match AssertUnwindSafe(self.agent.setup(&self.shared))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(panic) => return Err(AgentError::execution(panic_message(panic.as_ref()))),
        }

        self.initialized.store(true, Ordering::SeqCst);
        debug!(agent = %self.name(), "agent initialized");
        self.publish(EventKind::AgentStarted, json!({ "agent": self.name() }));
        Ok(())
    }

    /// Read `keys` from the shared context. Missing keys are left out.
    pub fn read_from_context(&self, keys: &[String]) -> Payload {
        let context = self.shared.context();
        keys.iter()
            .filter_map(|key| context.get(key).map(|value| (key.clone(), value)))
            .collect()
    }

    /// Merge `updates` into the shared context and announce the touched keys.
    pub fn write_to_context(&self, updates: Payload) {
        let keys: Vec<String> = updates.keys().cloned().collect();
        self.shared.context().update(updates, Some(self.name()));
        self.publish(
            EventKind::ContextUpdated,
            json!({ "agent": self.name(), "keys": keys }),
        );
    }

    /// Run one request through the full contract. Never fails.
    pub async fn handle_request(&self, mut request: AgentRequest) -> AgentResponse {
        let started = Instant::now();

        if let Some(keys) = request.context_keys.as_deref() {
            let from_context = self.read_from_context(keys);
            // Context wins over same-named input fields.
            request.input_data.extend(from_context);
        }

        let outcome = self.execute_off_runtime(&request).await;

        let response = match outcome {
            Ok(Ok(output)) => {
                let response = AgentResponse::succeeded(&request, output);
                if let Some(updates) = response.context_updates.as_ref() {
                    if !updates.is_empty() {
                        self.write_to_context(updates.clone());
                    }
                }
                response
            }
            Ok(Err(e)) => AgentResponse::failed(&request, e.kind(), e.to_string()),
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic().as_ref())
                } else {
                    format!("agent task was cancelled: {join_err}")
                };
                AgentResponse::failed(&request, ErrorKind::Execution, message)
            }
        };

        // Validation failures are ordinary (completed) outcomes; anything the
        // agent raised is reported as a failure.
        if response.error_kind == Some(ErrorKind::Execution) {
            warn!(
                agent = %self.name(),
                task = %request.task,
                error = response.error.as_deref().unwrap_or_default(),
                "agent execution failed"
            );
            self.publish(
                EventKind::AgentFailed,
                json!({
                    "agent": self.name(),
                    "task": request.task,
                    "request_id": request.request_id,
                    "error": response.error,
                }),
            );
        } else {
            self.publish(
                EventKind::AgentCompleted,
                json!({
                    "agent": self.name(),
                    "task": request.task,
                    "request_id": request.request_id,
                    "success": response.success,
                }),
            );
        }

        emit_agent_finished(
            self.name(),
            &request.task,
            response.success,
            started.elapsed().as_millis() as u64,
        );
        response
    }

    /// Run `execute` on the blocking pool, driven by the current runtime.
    ///
    /// Agents may call synchronous collaborators, so `execute` must not
    /// occupy a runtime worker thread. Concurrency is bounded by the
    /// caller (the orchestrator's worker pool), not by the runtime size.
    async fn execute_off_runtime(
        &self,
        request: &AgentRequest,
    ) -> Result<Result<AgentOutput, AgentError>, JoinError> {
        let agent = Arc::clone(&self.agent);
        let shared = self.shared.clone();
        let request = request.clone();
        let runtime = Handle::current();
        let span = Span::current();
        tokio::task::spawn_blocking(move || {
            runtime.block_on(
                async move { agent.execute(&request, &shared).await }.instrument(span),
            )
        })
        .await
    }

    fn publish(&self, kind: EventKind, data: serde_json::Value) {
        self.shared
            .events()
            .publish(AgentEvent::new(kind, self.name(), crate::messages::payload(data)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::payload;

    struct Doubler;

    #[async_trait]
    impl Agent for Doubler {
        fn name(&self) -> &str {
            "doubler"
        }

        async fn execute(
            &self,
            request: &AgentRequest,
            _shared: &SharedState,
        ) -> Result<AgentOutput, AgentError> {
            let n = request
                .input("n")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| AgentError::validation("Missing required input: n"))?;
            Ok(AgentOutput::new()
                .with_result(payload(json!({ "doubled": n * 2 })))
                .with_context_updates(payload(json!({ "doubled": n * 2 }))))
        }
    }

    #[tokio::test]
    async fn test_context_overrides_input() {
        let shared = SharedState::default();
        shared.context().set("n", json!(21), None);
        let handle = AgentHandle::new(Doubler, shared.clone());

        let request = AgentRequest::new("doubler", "double", payload(json!({ "n": 1 })))
            .with_context_keys(Some(vec!["n".to_string(), "absent".to_string()]));
        let response = handle.handle_request(request).await;

        assert!(response.success);
        assert_eq!(response.result.unwrap()["doubled"], 42);
        assert_eq!(shared.context().get("doubled"), Some(json!(42)));
    }

    #[tokio::test]
    async fn test_validation_failure_is_completed_not_failed() {
        let shared = SharedState::default();
        let handle = AgentHandle::new(Doubler, shared.clone());

        let response = handle
            .handle_request(AgentRequest::new("doubler", "double", Payload::new()))
            .await;

        assert!(!response.success);
        assert_eq!(response.error_kind, Some(ErrorKind::Validation));
        assert_eq!(response.error.as_deref(), Some("Missing required input: n"));
        assert_eq!(shared.context().get_version(), 0);

        let kinds: Vec<EventKind> = shared.events().get_history().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::AgentCompleted]);
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let shared = SharedState::default();
        let handle = AgentHandle::new(Doubler, shared.clone());
        assert!(!handle.is_initialized());

        handle.initialize().await.unwrap();
        handle.initialize().await.unwrap();

        assert!(handle.is_initialized());
        let started = shared
            .events()
            .get_history()
            .iter()
            .filter(|e| e.kind() == EventKind::AgentStarted)
            .count();
        assert_eq!(started, 1);
    }
}
