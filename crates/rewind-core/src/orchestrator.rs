//! Task delegation and workflow execution.
//!
//! Two regimes coexist:
//! - [`Orchestrator::delegate`] and [`Orchestrator::execute_workflow`] run on
//!   the caller's task and return once the agent has answered.
//! - [`Orchestrator::execute_parallel`] fans tasks out over a bounded worker
//!   pool (a semaphore sized by `max_workers`) and joins on all of them.
//!
//! Workflow templates reset the shared context before running. They take an
//! orchestrator-wide lock, so templates on one orchestrator run one at a
//! time. Independent workflows that must run concurrently need separate
//! orchestrators, each with its own [`SharedState`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinError;
use tracing::{info, instrument, warn, Instrument};

use crate::agent::SharedState;
use crate::config::RuntimeConfig;
use crate::context::ContextStore;
use crate::error::{panic_message, ConfigError, WorkflowError};
use crate::events::{AgentEvent, EventBus, EventKind};
use crate::messages::{payload, AgentResponse, Payload};
use crate::metrics::METRICS;
use crate::obs::{
    emit_agent_not_found, emit_step_skipped, emit_task_delegated, emit_workflow_finished,
    workflow_span,
};
use crate::registry::AgentRegistry;
use crate::workflow::{BatchResults, ResultLabeler, TaskSpec, WorkflowStep, WorkflowTemplate};

/// Event source name used for orchestrator-published events and context writes.
pub const ORCHESTRATOR_SOURCE: &str = "orchestrator";

struct Inner {
    shared: SharedState,
    registry: Arc<AgentRegistry>,
    pool: Arc<Semaphore>,
    max_workers: usize,
    shut_down: AtomicBool,
    workflow_lock: Mutex<()>,
}

/// Central coordinator. Cloning yields another handle to the same orchestrator.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("max_workers", &self.inner.max_workers)
            .field("agents", &self.inner.registry.list_agents())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        shared: SharedState,
        registry: Arc<AgentRegistry>,
        config: &RuntimeConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                registry,
                pool: Arc::new(Semaphore::new(config.max_workers)),
                max_workers: config.max_workers,
                shut_down: AtomicBool::new(false),
                workflow_lock: Mutex::new(()),
            }),
        })
    }

    pub fn shared(&self) -> &SharedState {
        &self.inner.shared
    }

    pub fn context(&self) -> &Arc<ContextStore> {
        self.inner.shared.context()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        self.inner.shared.events()
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.inner.registry
    }

    pub fn max_workers(&self) -> usize {
        self.inner.max_workers
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Empty the shared context (bumps its version).
    pub fn reset_context(&self) {
        self.context().clear();
    }

    /// Run one task on its agent and return the agent's response verbatim.
    ///
    /// An unknown agent yields a lookup failure with an empty request id;
    /// no agent code runs and no delegation event is published.
    pub async fn delegate(&self, spec: TaskSpec) -> AgentResponse {
        let Some(agent) = self.inner.registry.get(&spec.agent) else {
            METRICS.inc_lookups_missed();
            emit_agent_not_found(&spec.agent, &spec.task);
            return AgentResponse::not_found(&spec.agent, &spec.task);
        };

        let request = spec.into_request();
        METRICS.inc_delegations();
        emit_task_delegated(&request.request_id, &request.agent_name, &request.task);
        self.publish(
            EventKind::TaskDelegated,
            json!({
                "agent": request.agent_name,
                "task": request.task,
                "request_id": request.request_id,
            }),
        );

        let response = agent.handle_request(request).await;
        if !response.success {
            METRICS.inc_failures();
        }
        response
    }

    /// Run `steps` strictly in order.
    ///
    /// Steps flagged `parallel` are skipped, not executed.
    pub async fn execute_workflow(&self, steps: &[WorkflowStep]) -> BatchResults {
        let mut labeler = ResultLabeler::new();
        let mut results = BatchResults::new();
        for step in steps {
            if step.parallel {
                emit_step_skipped(&step.task.agent, &step.task.task);
                continue;
            }
            let label = labeler.next_label(&step.task);
            let response = self.delegate(step.task.clone()).await;
            results.insert(label, response);
        }
        results
    }

    /// Run every task on the worker pool and wait for all of them.
    ///
    /// At most `max_workers` tasks run at once. A task that cannot be run
    /// or joined becomes a pool failure response; this never returns early
    /// and never propagates a task's failure.
    #[instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub async fn execute_parallel(&self, tasks: Vec<TaskSpec>) -> BatchResults {
        let mut labeler = ResultLabeler::new();
        let mut results = BatchResults::new();

        if self.is_shut_down() {
            for spec in tasks {
                let label = labeler.next_label(&spec);
                results.insert(
                    label,
                    AgentResponse::pool_failure(
                        &spec.agent,
                        &spec.task,
                        "orchestrator has been shut down",
                    ),
                );
            }
            return results;
        }

        METRICS.inc_parallel_batches();
        let mut pending = Vec::with_capacity(tasks.len());
        for spec in tasks {
            let label = labeler.next_label(&spec);
            let (agent, task) = (spec.agent.clone(), spec.task.clone());
            let this = self.clone();
            let pool = Arc::clone(&self.inner.pool);
            let handle = tokio::spawn(async move {
                let _permit = pool
                    .acquire_owned()
                    .await
                    .map_err(|_| "worker pool is closed".to_string())?;
                Ok::<_, String>(this.delegate(spec).await)
            });
            pending.push(async move { (label, agent, task, handle.await) });
        }

        for (label, agent, task, joined) in join_all(pending).await {
            let response = match joined {
                Ok(Ok(response)) => response,
                Ok(Err(reason)) => AgentResponse::pool_failure(&agent, &task, reason),
                Err(e) => AgentResponse::pool_failure(&agent, &task, join_error_message(e)),
            };
            results.insert(label, response);
        }
        results
    }

    /// Run a workflow template.
    ///
    /// Clears the shared context, seeds it from `seed`, runs the steps in
    /// order, and collects the template's fields from the context into the
    /// aggregated result. A failing required step stops the run; context
    /// written by earlier steps is left in place.
    pub async fn run_template(
        &self,
        template: &WorkflowTemplate,
        seed: Payload,
    ) -> Result<Payload, WorkflowError> {
        template.validate()?;
        template.check_seed(&seed)?;

        let _exclusive = self.inner.workflow_lock.lock().await;
        let span = workflow_span(&template.name, &self.context().session_id().to_string());
        self.run_template_locked(template, seed)
            .instrument(span)
            .await
    }

    async fn run_template_locked(
        &self,
        template: &WorkflowTemplate,
        seed: Payload,
    ) -> Result<Payload, WorkflowError> {
        let context = self.context();
        context.clear();
        for (key, value) in seed {
            context.set(key, value, Some(ORCHESTRATOR_SOURCE));
        }

        let mut steps_run = 0;
        for step in &template.steps {
            let response = self.delegate(step.task.clone()).await;
            steps_run += 1;
            if response.success {
                continue;
            }
            if step.required {
                emit_workflow_finished(&template.name, steps_run, false);
                return Err(WorkflowError::StepFailed {
                    message: step.failure_message(),
                    details: response.error,
                    kind: response.error_kind,
                });
            }
            warn!(
                step = %step.task.label(),
                error = response.error.as_deref().unwrap_or_default(),
                "optional step failed; continuing"
            );
        }

        let mut aggregated = Payload::new();
        aggregated.insert("success".to_string(), Value::Bool(true));
        for field in &template.collect {
            aggregated.insert(field.name.clone(), field.resolve(context));
        }

        emit_workflow_finished(&template.name, steps_run, true);
        let fields: Vec<&str> = template.collect.iter().map(|f| f.name.as_str()).collect();
        self.publish(
            EventKind::ResultReady,
            json!({ "template": template.name, "fields": fields }),
        );
        Ok(aggregated)
    }

    /// Stop accepting pooled work and wait for in-flight tasks to finish.
    ///
    /// Outstanding tasks are not cancelled. Later `execute_parallel` calls
    /// return pool failures; `delegate` keeps working.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(max_workers = self.inner.max_workers, "draining worker pool");
        // validate() guarantees max_workers fits in u32.
        let all = self.inner.max_workers as u32;
        if let Ok(permits) = self.inner.pool.acquire_many(all).await {
            drop(permits);
        }
        self.inner.pool.close();
        METRICS.flush();
        info!("orchestrator shut down");
    }

    fn publish(&self, kind: EventKind, data: Value) {
        self.events()
            .publish(AgentEvent::new(kind, ORCHESTRATOR_SOURCE, payload(data)));
    }
}

fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic().as_ref())
    } else {
        format!("task was cancelled: {err}")
    }
}
