//! Rewind Core Library
//!
//! Orchestration substrate for cooperating analysis agents: a versioned
//! shared context, a synchronous event bus, the agent request/response
//! contract, an agent registry, and the orchestrator that delegates tasks,
//! runs workflows and fans work out over a bounded worker pool.

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod messages;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod registry;
pub mod telemetry;
pub mod workflow;

pub use agent::{Agent, AgentHandle, SharedState};
pub use config::RuntimeConfig;
pub use context::{ContextStore, HistoryAction, HistoryEntry};
pub use error::{AgentError, ConfigError, ErrorKind, WorkflowError};
pub use events::{AgentEvent, EventBus, EventHandler, EventKind, SubscriptionId};
pub use messages::{payload, AgentOutput, AgentRequest, AgentResponse, Payload};
pub use metrics::METRICS;
pub use obs::workflow_span;
pub use orchestrator::{Orchestrator, ORCHESTRATOR_SOURCE};
pub use registry::AgentRegistry;
pub use telemetry::init_tracing;
pub use workflow::{
    BatchResults, CollectField, TaskSpec, TemplateStep, WorkflowStep, WorkflowTemplate,
};

/// Rewind version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
