//! Declarative workflow building blocks.
//!
//! - [`TaskSpec`] - one delegation (agent, task, input, context keys)
//! - [`WorkflowStep`] - a task inside an ad-hoc sequential workflow
//! - [`WorkflowTemplate`] - a named pipeline: seed values, ordered steps whose
//!   data dependencies are expressed as context keys, and the fields to
//!   collect from the context at the end

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ContextStore;
use crate::error::WorkflowError;
use crate::messages::{AgentRequest, AgentResponse, Payload};

/// Responses of a batch, keyed by result label (see [`ResultLabeler`]).
pub type BatchResults = BTreeMap<String, AgentResponse>;

/// Everything needed to delegate one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub agent: String,
    pub task: String,
    #[serde(default)]
    pub input: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_keys: Option<Vec<String>>,
}

impl TaskSpec {
    pub fn new(agent: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            task: task.into(),
            input: Payload::new(),
            context_keys: None,
            output_keys: None,
        }
    }

    pub fn with_input(mut self, input: Payload) -> Self {
        self.input = input;
        self
    }

    pub fn with_input_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    /// Context keys to merge into the input before execution.
    pub fn reading<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Context keys the agent is expected to write.
    pub fn writing<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// `"{agent}_{task}"`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.agent, self.task)
    }

    pub fn into_request(self) -> AgentRequest {
        AgentRequest::new(self.agent, self.task, self.input)
            .with_context_keys(self.context_keys)
            .with_output_keys(self.output_keys)
    }
}

/// A step of an ad-hoc workflow run by `Orchestrator::execute_workflow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(flatten)]
    pub task: TaskSpec,
    /// Steps flagged parallel are skipped by sequential workflows.
    #[serde(default)]
    pub parallel: bool,
}

impl WorkflowStep {
    pub fn sequential(task: TaskSpec) -> Self {
        Self {
            task,
            parallel: false,
        }
    }

    pub fn parallel(task: TaskSpec) -> Self {
        Self {
            task,
            parallel: true,
        }
    }
}

/// Assigns collision-free result labels within one batch.
///
/// The first occurrence of an `(agent, task)` pair gets `"{agent}_{task}"`;
/// repeats get `"{agent}_{task}#{n}"` with the smallest `n >= 1` not already
/// issued in this batch, so a task literally named `t#1` cannot shadow a
/// repeat of `t`.
#[derive(Debug, Default)]
pub struct ResultLabeler {
    repeats: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl ResultLabeler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_label(&mut self, task: &TaskSpec) -> String {
        let base = task.label();
        let mut label = base.clone();
        if self.issued.contains(&label) {
            let n = self.repeats.entry(base.clone()).or_insert(0);
            loop {
                *n += 1;
                label = format!("{base}#{n}");
                if !self.issued.contains(&label) {
                    break;
                }
            }
        }
        self.issued.insert(label.clone());
        label
    }
}

fn default_true() -> bool {
    true
}

/// A step inside a [`WorkflowTemplate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateStep {
    #[serde(flatten)]
    pub task: TaskSpec,
    /// A failing required step stops the run with an error.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Error text used when this step stops the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl TemplateStep {
    pub fn required(task: TaskSpec) -> Self {
        Self {
            task,
            required: true,
            failure_message: None,
        }
    }

    pub fn optional(task: TaskSpec) -> Self {
        Self {
            task,
            required: false,
            failure_message: None,
        }
    }

    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    pub fn failure_message(&self) -> String {
        self.failure_message
            .clone()
            .unwrap_or_else(|| format!("Step {} failed", self.task.label()))
    }
}

/// A value pulled out of the context into the aggregated result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectField {
    /// Name in the aggregated result.
    pub name: String,
    /// Context key to read.
    pub key: String,
    /// Optional JSON pointer into the context value (e.g. `/key_metrics`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    /// Used when the key (or pointer target) is absent.
    #[serde(default)]
    pub default: Value,
}

impl CollectField {
    pub fn new(key: impl Into<String>, default: Value) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            pointer: None,
            default,
        }
    }

    pub fn nested(
        name: impl Into<String>,
        key: impl Into<String>,
        pointer: impl Into<String>,
        default: Value,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            pointer: Some(pointer.into()),
            default,
        }
    }

    pub fn resolve(&self, context: &ContextStore) -> Value {
        let value = context.get(&self.key);
        let target = match (&value, self.pointer.as_deref()) {
            (Some(v), Some(pointer)) => v.pointer(pointer).cloned(),
            (v, None) => v.clone(),
            (None, Some(_)) => None,
        };
        target.unwrap_or_else(|| self.default.clone())
    }
}

/// A named, ordered pipeline of delegations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Keys the caller must supply in the seed payload.
    #[serde(default)]
    pub seed_keys: Vec<String>,
    pub steps: Vec<TemplateStep>,
    #[serde(default)]
    pub collect: Vec<CollectField>,
}

impl WorkflowTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            seed_keys: Vec::new(),
            steps: Vec::new(),
            collect: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn seed(mut self, key: impl Into<String>) -> Self {
        self.seed_keys.push(key.into());
        self
    }

    pub fn step(mut self, step: TemplateStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn collect(mut self, field: CollectField) -> Self {
        self.collect.push(field);
        self
    }

    pub fn from_json(raw: &str) -> Result<Self, WorkflowError> {
        let template: Self = serde_json::from_str(raw)
            .map_err(|e| WorkflowError::InvalidTemplate(e.to_string()))?;
        template.validate()?;
        Ok(template)
    }

    /// Check structure and data dependencies: every context key a step reads
    /// must be seeded or declared as an output of an earlier step.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::InvalidTemplate(
                "template name must not be empty".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(WorkflowError::InvalidTemplate(format!(
                "template {} has no steps",
                self.name
            )));
        }

        let mut available: HashSet<&str> = self.seed_keys.iter().map(String::as_str).collect();
        for (index, step) in self.steps.iter().enumerate() {
            if step.task.agent.trim().is_empty() || step.task.task.trim().is_empty() {
                return Err(WorkflowError::InvalidTemplate(format!(
                    "step {index} of {} needs both an agent and a task",
                    self.name
                )));
            }
            for key in step.task.context_keys.iter().flatten() {
                if !available.contains(key.as_str()) {
                    return Err(WorkflowError::InvalidTemplate(format!(
                        "step {} reads context key {key:?} that no seed or earlier step provides",
                        step.task.label()
                    )));
                }
            }
            available.extend(step.task.output_keys.iter().flatten().map(String::as_str));
        }
        Ok(())
    }

    /// Error if `seed` lacks any declared seed key.
    pub fn check_seed(&self, seed: &Payload) -> Result<(), WorkflowError> {
        match self.seed_keys.iter().find(|key| !seed.contains_key(key.as_str())) {
            Some(key) => Err(WorkflowError::MissingSeed {
                template: self.name.clone(),
                key: key.clone(),
            }),
            None => Ok(()),
        }
    }
}
