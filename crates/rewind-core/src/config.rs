//! Runtime configuration for an orchestration session.
//!
//! Values come from the environment (`REWIND_*` variables) with defaults
//! for anything unset.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default worker pool size for parallel fan-out.
pub const DEFAULT_MAX_WORKERS: usize = 10;
/// Default number of context history records retained.
pub const DEFAULT_CONTEXT_HISTORY_CAP: usize = 1024;
/// Default number of published events retained.
pub const DEFAULT_EVENT_HISTORY_CAP: usize = 1024;

pub const ENV_MAX_WORKERS: &str = "REWIND_MAX_WORKERS";
pub const ENV_CONTEXT_HISTORY_CAP: &str = "REWIND_CONTEXT_HISTORY_CAP";
pub const ENV_EVENT_HISTORY_CAP: &str = "REWIND_EVENT_HISTORY_CAP";

/// Knobs for the worker pool and the retention of history logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum number of concurrently running pooled tasks.
    pub max_workers: usize,
    /// Context history ring buffer capacity.
    pub context_history_cap: usize,
    /// Event history ring buffer capacity.
    pub event_history_cap: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            context_history_cap: DEFAULT_CONTEXT_HISTORY_CAP,
            event_history_cap: DEFAULT_EVENT_HISTORY_CAP,
        }
    }
}

impl RuntimeConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using an arbitrary variable lookup (tests inject a map here).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_workers: parse_var(&lookup, ENV_MAX_WORKERS, defaults.max_workers)?,
            context_history_cap: parse_var(
                &lookup,
                ENV_CONTEXT_HISTORY_CAP,
                defaults.context_history_cap,
            )?,
            event_history_cap: parse_var(
                &lookup,
                ENV_EVENT_HISTORY_CAP,
                defaults.event_history_cap,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                var: ENV_MAX_WORKERS.to_string(),
                value: "0".to_string(),
                reason: "worker pool needs at least one slot".to_string(),
            });
        }
        // Semaphore::acquire_many takes a u32.
        if u32::try_from(self.max_workers).is_err() {
            return Err(ConfigError::InvalidValue {
                var: ENV_MAX_WORKERS.to_string(),
                value: self.max_workers.to_string(),
                reason: "exceeds u32::MAX".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<F>(lookup: &F, var: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|e| ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}
