//! Rewind coaching agents
//!
//! The six specialized agents of the match-coaching product, the
//! collaborator traits they call out to, offline collaborator
//! implementations, and the built-in workflow templates.

pub mod agents;
pub mod collaborators;
pub mod offline;
pub mod templates;

use std::sync::Arc;

use rewind_core::{
    AgentHandle, AgentRegistry, ConfigError, Orchestrator, RuntimeConfig, SharedState,
};

pub use agents::{
    InsightsAgent, MatchAnalysisAgent, PlayerComparisonAgent, SocialContentAgent,
    VisualizationAgent, YearSummaryAgent,
};
pub use collaborators::{
    ChartRenderer, Collaborators, InsightGenerator, MatchAnalyzer, SocialFormatter,
    YearSummarizer,
};
pub use templates::{builtin_templates, find_template};

/// Register all six agents against `shared`.
pub async fn register_default_agents(
    registry: &AgentRegistry,
    shared: &SharedState,
    collaborators: &Collaborators,
) -> Vec<Arc<AgentHandle>> {
    let c = collaborators;
    vec![
        registry
            .register_agent(MatchAnalysisAgent::new(Arc::clone(&c.analyzer)), shared)
            .await,
        registry
            .register_agent(InsightsAgent::new(Arc::clone(&c.writer)), shared)
            .await,
        registry
            .register_agent(VisualizationAgent::new(Arc::clone(&c.charts)), shared)
            .await,
        registry
            .register_agent(SocialContentAgent::new(Arc::clone(&c.social)), shared)
            .await,
        registry
            .register_agent(
                YearSummaryAgent::new(Arc::clone(&c.year_summarizer), Arc::clone(&c.writer)),
                shared,
            )
            .await,
        registry
            .register_agent(
                PlayerComparisonAgent::new(
                    Arc::clone(&c.analyzer),
                    Arc::clone(&c.writer),
                    Arc::clone(&c.social),
                ),
                shared,
            )
            .await,
    ]
}

/// Fresh shared state, a registry holding the default agents, and an
/// orchestrator over both.
pub async fn default_orchestrator(
    config: &RuntimeConfig,
    collaborators: &Collaborators,
) -> Result<Orchestrator, ConfigError> {
    config.validate()?;
    let shared = SharedState::from_config(config);
    let registry = Arc::new(AgentRegistry::new());
    register_default_agents(&registry, &shared, collaborators).await;
    Orchestrator::new(shared, registry, config)
}
