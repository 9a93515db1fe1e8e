//! Structured tracing hooks for delegation and workflow lifecycles.
//!
//! Every hook emits one event with an `event = "..."` field so log
//! pipelines can filter on it. Set `RUST_LOG=rewind_core=debug` to see
//! per-request detail.

use tracing::{debug, info, warn};

/// Span covering one workflow template run.
///
/// Attach with `tracing::Instrument` rather than entering it, since the run
/// crosses await points.
pub fn workflow_span(template: &str, session_id: &str) -> tracing::Span {
    tracing::info_span!("rewind.workflow", template = %template, session_id = %session_id)
}

pub fn emit_task_delegated(request_id: &str, agent_name: &str, task: &str) {
    debug!(event = "task.delegated", request_id = %request_id, agent = %agent_name, task = %task);
}

pub fn emit_agent_not_found(agent_name: &str, task: &str) {
    warn!(event = "task.agent_not_found", agent = %agent_name, task = %task);
}

/// Emit event: an agent finished a request (either way).
pub fn emit_agent_finished(agent_name: &str, task: &str, success: bool, duration_ms: u64) {
    info!(
        event = "agent.finished",
        agent = %agent_name,
        task = %task,
        success = success,
        duration_ms = duration_ms,
    );
}

pub fn emit_step_skipped(agent_name: &str, task: &str) {
    warn!(
        event = "workflow.step_skipped",
        agent = %agent_name,
        task = %task,
        "parallel-flagged steps are not run by sequential workflows"
    );
}

pub fn emit_workflow_finished(template: &str, steps_run: usize, success: bool) {
    info!(
        event = "workflow.finished",
        template = %template,
        steps_run = steps_run,
        success = success,
    );
}
