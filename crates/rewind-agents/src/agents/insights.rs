use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use rewind_core::{payload, Agent, AgentError, AgentOutput, AgentRequest, SharedState};
use serde_json::{json, Value};

use super::input_or_context;
use crate::collaborators::InsightGenerator;

/// Only the most recent games are sent to the text backend.
const MAX_PROMPT_MATCHES: usize = 20;

/// Turns a match analysis into coaching insights.
pub struct InsightsAgent {
    writer: Arc<dyn InsightGenerator>,
}

impl InsightsAgent {
    pub const NAME: &'static str = "insights_generation";

    pub fn new(writer: Arc<dyn InsightGenerator>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl Agent for InsightsAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(
        &self,
        request: &AgentRequest,
        shared: &SharedState,
    ) -> Result<AgentOutput, AgentError> {
        let analysis = input_or_context(request, shared, "match_analysis").ok_or_else(|| {
            AgentError::validation("Match analysis not found in input or context")
        })?;

        let player_matches: &[Value] = request
            .input("player_matches")
            .and_then(Value::as_array)
            .map(|m| &m[..m.len().min(MAX_PROMPT_MATCHES)])
            .unwrap_or_default();
        let key_metrics = analysis.get("key_metrics").cloned().unwrap_or_else(|| json!({}));

        let insights = self
            .writer
            .generate_insights(player_matches, &key_metrics)
            .context("Insights generation failed")?;

        let list = |key: &str| insights.get(key).cloned().unwrap_or_else(|| json!([]));
        let updates = json!({
            "insights": insights,
            "strengths": list("strengths"),
            "weaknesses": list("weaknesses"),
            "unexpected_insights": list("unexpected_insights"),
            "recommendations": list("recommendations"),
        });

        Ok(AgentOutput::new()
            .with_result(payload(json!({ "insights": insights })))
            .with_context_updates(payload(updates)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ThrottledWriter;
    use crate::offline::RuleWriter;

    fn request(input: Value) -> AgentRequest {
        AgentRequest::new(InsightsAgent::NAME, "generate_insights", payload(input))
    }

    #[tokio::test]
    async fn test_missing_analysis_is_a_validation_error() {
        let agent = InsightsAgent::new(Arc::new(RuleWriter));
        let err = agent
            .execute(&request(json!({})), &SharedState::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), rewind_core::ErrorKind::Validation);
        assert_eq!(err.to_string(), "Match analysis not found in input or context");
    }

    #[tokio::test]
    async fn test_falls_back_to_context_analysis() {
        let agent = InsightsAgent::new(Arc::new(RuleWriter));
        let shared = SharedState::default();
        shared.context().set(
            "match_analysis",
            json!({ "key_metrics": { "avg_kda": 4.2, "win_rate": 60.0, "avg_vision_score": 25.0 } }),
            None,
        );

        let output = agent.execute(&request(json!({})), &shared).await.unwrap();
        let updates = output.context_updates.unwrap();
        assert_eq!(updates["strengths"].as_array().unwrap().len(), 2);
        assert_eq!(updates["weaknesses"], json!([]));
        assert_eq!(updates["recommendations"], json!([]));
    }

    #[tokio::test]
    async fn test_text_backend_failure_is_wrapped() {
        let agent = InsightsAgent::new(Arc::new(ThrottledWriter));
        let err = agent
            .execute(
                &request(json!({ "match_analysis": { "key_metrics": {} } })),
                &SharedState::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Insights generation failed: throttled");
    }
}
