use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use rewind_core::{payload, Agent, AgentError, AgentOutput, AgentRequest, SharedState};
use serde_json::json;

use super::matches_and_puuid;
use crate::collaborators::MatchAnalyzer;

/// Computes per-player statistics from raw match records.
///
/// Writes `match_analysis`, `match_count` and `puuid` to the context.
pub struct MatchAnalysisAgent {
    analyzer: Arc<dyn MatchAnalyzer>,
}

impl MatchAnalysisAgent {
    pub const NAME: &'static str = "match_analysis";

    pub fn new(analyzer: Arc<dyn MatchAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl Agent for MatchAnalysisAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(
        &self,
        request: &AgentRequest,
        shared: &SharedState,
    ) -> Result<AgentOutput, AgentError> {
        let (matches, puuid) = matches_and_puuid(request, shared)?;
        let analysis = self
            .analyzer
            .analyze(&matches, &puuid)
            .context("Match analysis failed")?;

        Ok(AgentOutput::new()
            .with_result(payload(json!({
                "analysis": analysis,
                "match_count": matches.len(),
            })))
            .with_context_updates(payload(json!({
                "match_analysis": analysis,
                "match_count": matches.len(),
                "puuid": puuid,
            }))))
    }
}
