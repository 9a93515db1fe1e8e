use std::sync::Arc;

use async_trait::async_trait;
use rewind_core::{payload, Agent, AgentError, AgentOutput, AgentRequest, SharedState};
use serde_json::{json, Map, Value};
use tracing::warn;

use super::{input_or_context, matches_and_puuid};
use crate::collaborators::ChartRenderer;

/// Renders the chart set for a player.
///
/// Charts are independent: one that fails to render is logged and left out,
/// and the agent still succeeds with the rest.
pub struct VisualizationAgent {
    charts: Arc<dyn ChartRenderer>,
}

impl VisualizationAgent {
    pub const NAME: &'static str = "visualization";

    pub fn new(charts: Arc<dyn ChartRenderer>) -> Self {
        Self { charts }
    }
}

#[async_trait]
impl Agent for VisualizationAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(
        &self,
        request: &AgentRequest,
        shared: &SharedState,
    ) -> Result<AgentOutput, AgentError> {
        let (matches, puuid) = matches_and_puuid(request, shared)?;
        let analysis =
            input_or_context(request, shared, "match_analysis").unwrap_or_else(|| json!({}));
        let champion_stats = analysis.get("champion_stats").cloned().unwrap_or_else(|| json!({}));
        let role_stats = analysis.get("role_stats").cloned().unwrap_or_else(|| json!({}));

        let rendered = [
            ("win_rate_chart", self.charts.win_rate_chart(&matches, &puuid)),
            ("kda_trend", self.charts.kda_trend(&matches, &puuid)),
            ("champion_performance", self.charts.champion_performance(&champion_stats)),
            ("role_performance", self.charts.role_performance(&role_stats)),
        ];

        let mut visualizations = Map::new();
        for (chart, outcome) in rendered {
            match outcome {
                Ok(value) => {
                    visualizations.insert(chart.to_string(), value);
                }
                Err(e) => warn!(chart, error = %format!("{e:#}"), "chart generation failed"),
            }
        }

        let visualizations = Value::Object(visualizations);
        Ok(AgentOutput::new()
            .with_result(payload(json!({ "visualizations": visualizations })))
            .with_context_updates(payload(json!({ "visualizations": visualizations }))))
    }
}
