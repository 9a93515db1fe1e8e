//! Registry of live agents, keyed by name.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{info, warn};

use crate::agent::{Agent, AgentHandle, SharedState};

/// Tracks agent instances and their cached liveness.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<AgentHandle>>>,
    health: Mutex<HashMap<String, bool>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize `handle` and store it, replacing any agent of the same name.
    ///
    /// A failed `setup` is logged and the agent is still stored; it reports
    /// unhealthy until a later `initialize` succeeds.
    pub async fn register(&self, handle: AgentHandle) -> Arc<AgentHandle> {
        let name = handle.name().to_string();
        if let Err(e) = handle.initialize().await {
            warn!(agent = %name, error = %e, "agent setup failed; registering as unhealthy");
        }

        let handle = Arc::new(handle);
        let healthy = handle.is_initialized();
        let replaced = self
            .agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), Arc::clone(&handle))
            .is_some();
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), healthy);

        info!(agent = %name, replaced, healthy, "agent registered");
        handle
    }

    /// Wrap `agent` with `shared` and register it.
    pub async fn register_agent<A>(&self, agent: A, shared: &SharedState) -> Arc<AgentHandle>
    where
        A: Agent + 'static,
    {
        self.register(AgentHandle::new(agent, shared.clone())).await
    }

    pub fn get(&self, name: &str) -> Option<Arc<AgentHandle>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn get_all(&self) -> HashMap<String, Arc<AgentHandle>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registered names, sorted.
    pub fn list_agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Liveness check: reports whether the agent finished initialization.
    /// It does not exercise the agent's logic. The result is cached.
    pub fn health_check(&self, name: &str) -> bool {
        let Some(agent) = self.get(name) else {
            return false;
        };
        let healthy = agent.is_initialized();
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), healthy);
        healthy
    }

    pub fn health_check_all(&self) -> BTreeMap<String, bool> {
        self.list_agents()
            .into_iter()
            .map(|name| {
                let healthy = self.health_check(&name);
                (name, healthy)
            })
            .collect()
    }

    /// Last cached health result; `false` for unknown agents.
    pub fn get_health_status(&self, name: &str) -> bool {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(false)
    }

    /// Remove the agent and its cached health state.
    pub fn unregister(&self, name: &str) -> Option<Arc<AgentHandle>> {
        let removed = self
            .agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if removed.is_some() {
            info!(agent = %name, "agent unregistered");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::messages::{AgentOutput, AgentRequest};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Agent for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(
            &self,
            _request: &AgentRequest,
            _shared: &SharedState,
        ) -> Result<AgentOutput, AgentError> {
            Ok(AgentOutput::new())
        }
    }

    struct BrokenSetup;

    #[async_trait]
    impl Agent for BrokenSetup {
        fn name(&self) -> &str {
            "broken"
        }

        async fn setup(&self, _shared: &SharedState) -> Result<(), AgentError> {
            Err(AgentError::execution("model endpoint not configured"))
        }

        async fn execute(
            &self,
            _request: &AgentRequest,
            _shared: &SharedState,
        ) -> Result<AgentOutput, AgentError> {
            Ok(AgentOutput::new())
        }
    }

    #[tokio::test]
    async fn test_register_initializes_and_lists() {
        let shared = SharedState::default();
        let registry = AgentRegistry::new();
        let handle = registry.register_agent(Named("match_analysis"), &shared).await;

        assert!(handle.is_initialized());
        assert!(registry.is_registered("match_analysis"));
        assert_eq!(registry.list_agents(), vec!["match_analysis"]);
        assert!(registry.health_check("match_analysis"));
        assert!(registry.get_health_status("match_analysis"));
    }

    #[tokio::test]
    async fn test_failed_setup_registers_unhealthy() {
        let shared = SharedState::default();
        let registry = AgentRegistry::new();
        registry.register_agent(BrokenSetup, &shared).await;

        assert!(registry.is_registered("broken"));
        assert!(!registry.health_check("broken"));
        assert!(!registry.get_health_status("broken"));
    }

    #[tokio::test]
    async fn test_reregister_overwrites() {
        let shared = SharedState::default();
        let registry = AgentRegistry::new();
        let first = registry.register_agent(Named("a"), &shared).await;
        let second = registry.register_agent(Named("a"), &shared).await;

        assert_eq!(registry.len(), 1);
        let current = registry.get("a").unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert!(!Arc::ptr_eq(&current, &first));
    }

    #[tokio::test]
    async fn test_unregister_drops_health() {
        let shared = SharedState::default();
        let registry = AgentRegistry::new();
        registry.register_agent(Named("a"), &shared).await;
        registry.register_agent(Named("b"), &shared).await;

        let all = registry.health_check_all();
        assert_eq!(all.len(), 2);
        assert!(all.values().all(|h| *h));

        assert!(registry.unregister("a").is_some());
        assert!(registry.get("a").is_none());
        assert!(!registry.get_health_status("a"));
        assert!(!registry.health_check("a"));
        assert!(registry.unregister("a").is_none());
    }
}
