use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use rewind_core::{payload, Agent, AgentError, AgentOutput, AgentRequest, SharedState};
use serde_json::json;

use super::input_or_context;
use crate::collaborators::SocialFormatter;

pub const YEAR_END: &str = "year-end";
pub const INSIGHTS: &str = "insights";

/// Builds a shareable card from either the year summary (`year-end`) or the
/// coaching insights (`insights`).
pub struct SocialContentAgent {
    social: Arc<dyn SocialFormatter>,
}

impl SocialContentAgent {
    pub const NAME: &'static str = "social_content";

    pub fn new(social: Arc<dyn SocialFormatter>) -> Self {
        Self { social }
    }
}

#[async_trait]
impl Agent for SocialContentAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(
        &self,
        request: &AgentRequest,
        shared: &SharedState,
    ) -> Result<AgentOutput, AgentError> {
        let content_type = request.input_str("content_type").unwrap_or(YEAR_END);

        let content = match content_type {
            YEAR_END => input_or_context(request, shared, "year_summary")
                .map(|summary| self.social.year_end_card(&summary)),
            INSIGHTS => input_or_context(request, shared, "insights")
                .map(|insights| self.social.insight_card(&insights)),
            _ => None,
        };
        let Some(content) = content else {
            return Err(AgentError::validation(format!(
                "Content type '{content_type}' not supported or missing data"
            )));
        };
        let content = content.context("Social content generation failed")?;

        Ok(AgentOutput::new()
            .with_result(payload(json!({
                "content": content,
                "content_type": content_type,
            })))
            .with_context_updates(payload(json!({
                "social_content": content,
                "content_type": content_type,
            }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::PlainSocial;

    fn request(content_type: &str) -> AgentRequest {
        AgentRequest::new(
            SocialContentAgent::NAME,
            "generate_content",
            payload(json!({ "content_type": content_type })),
        )
    }

    #[tokio::test]
    async fn test_year_end_card_from_context() {
        let agent = SocialContentAgent::new(Arc::new(PlainSocial));
        let shared = SharedState::default();
        shared
            .context()
            .set("year_summary", json!({ "year": 2024, "highlights": ["Pentakill"] }), None);

        let output = agent.execute(&request(YEAR_END), &shared).await.unwrap();
        let updates = output.context_updates.unwrap();
        assert_eq!(updates["social_content"]["title"], json!("My 2024 on the Rift"));
        assert_eq!(updates["content_type"], json!("year-end"));
    }

    #[tokio::test]
    async fn test_unsupported_or_missing_data() {
        let agent = SocialContentAgent::new(Arc::new(PlainSocial));
        let shared = SharedState::default();

        let err = agent.execute(&request("weekly"), &shared).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Content type 'weekly' not supported or missing data"
        );

        let err = agent.execute(&request(INSIGHTS), &shared).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Content type 'insights' not supported or missing data"
        );
    }
}
