use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use rewind_core::{payload, Agent, AgentError, AgentOutput, AgentRequest, SharedState};
use serde_json::{json, Value};

use super::input_or_context;
use crate::collaborators::{InsightGenerator, MatchAnalyzer, SocialFormatter};

/// Compares two players' key metrics and drafts a shareable post.
///
/// Each player is an object with `matches`, `puuid` and an optional
/// display `name`.
pub struct PlayerComparisonAgent {
    analyzer: Arc<dyn MatchAnalyzer>,
    writer: Arc<dyn InsightGenerator>,
    social: Arc<dyn SocialFormatter>,
}

impl PlayerComparisonAgent {
    pub const NAME: &'static str = "player_comparison";

    pub fn new(
        analyzer: Arc<dyn MatchAnalyzer>,
        writer: Arc<dyn InsightGenerator>,
        social: Arc<dyn SocialFormatter>,
    ) -> Self {
        Self {
            analyzer,
            writer,
            social,
        }
    }

    fn key_metrics(&self, player: &Value) -> anyhow::Result<Value> {
        let matches = player
            .get("matches")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let puuid = player.get("puuid").and_then(Value::as_str).unwrap_or_default();
        let analysis = self.analyzer.analyze(matches, puuid)?;
        Ok(analysis
            .get("key_metrics")
            .cloned()
            .unwrap_or_else(|| json!({})))
    }
}

fn display_name<'a>(player: &'a Value, fallback: &'a str) -> &'a str {
    player.get("name").and_then(Value::as_str).unwrap_or(fallback)
}

#[async_trait]
impl Agent for PlayerComparisonAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(
        &self,
        request: &AgentRequest,
        shared: &SharedState,
    ) -> Result<AgentOutput, AgentError> {
        let players = (
            input_or_context(request, shared, "player1"),
            input_or_context(request, shared, "player2"),
        );
        let (Some(player1), Some(player2)) = players else {
            return Err(AgentError::validation(
                "Missing required input: player1 or player2 data",
            ));
        };

        let stats1 = self.key_metrics(&player1).context("Player comparison failed")?;
        let stats2 = self.key_metrics(&player2).context("Player comparison failed")?;
        let comparison = self
            .writer
            .generate_comparison(&stats1, &stats2)
            .context("Player comparison failed")?;

        let name1 = display_name(&player1, "Player 1");
        let name2 = display_name(&player2, "Player 2");
        let shareable = self
            .social
            .comparison_post(name1, name2, &comparison)
            .context("Player comparison failed")?;

        Ok(AgentOutput::new()
            .with_result(payload(json!({
                "player1_stats": stats1,
                "player2_stats": stats2,
                "comparison": comparison,
                "shareable_content": shareable,
            })))
            .with_context_updates(payload(json!({
                "comparison": {
                    "player1": { "name": name1, "stats": stats1 },
                    "player2": { "name": name2, "stats": stats2 },
                    "comparison_text": comparison,
                    "shareable_content": shareable,
                }
            }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{sample_match, DownAnalyzer};
    use crate::offline::{PlainSocial, RuleWriter, StatsAnalyzer};

    fn request(input: Value) -> AgentRequest {
        AgentRequest::new(PlayerComparisonAgent::NAME, "compare_players", payload(input))
    }

    #[tokio::test]
    async fn test_compares_named_players() {
        let agent = PlayerComparisonAgent::new(
            Arc::new(StatsAnalyzer),
            Arc::new(RuleWriter),
            Arc::new(PlainSocial),
        );
        let input = json!({
            "player1": { "name": "Faker", "puuid": "p1", "matches": [sample_match("p1", true)] },
            "player2": { "puuid": "p2", "matches": [] },
        });

        let output = agent
            .execute(&request(input), &SharedState::default())
            .await
            .unwrap();
        let comparison = &output.context_updates.unwrap()["comparison"];
        assert_eq!(comparison["player1"]["name"], json!("Faker"));
        assert_eq!(comparison["player2"]["name"], json!("Player 2"));
        assert_eq!(comparison["player2"]["stats"], json!({}));
        assert!(comparison["shareable_content"]["text"]
            .as_str()
            .unwrap()
            .starts_with("Faker vs Player 2: Player 1 leads"));
    }

    #[tokio::test]
    async fn test_requires_both_players() {
        let agent = PlayerComparisonAgent::new(
            Arc::new(StatsAnalyzer),
            Arc::new(RuleWriter),
            Arc::new(PlainSocial),
        );
        let err = agent
            .execute(&request(json!({ "player1": { "puuid": "p1" } })), &SharedState::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required input: player1 or player2 data");
    }

    #[tokio::test]
    async fn test_analyzer_failure_is_wrapped() {
        let agent = PlayerComparisonAgent::new(
            Arc::new(DownAnalyzer),
            Arc::new(RuleWriter),
            Arc::new(PlainSocial),
        );
        let input = json!({ "player1": { "puuid": "p1" }, "player2": { "puuid": "p2" } });
        let err = agent
            .execute(&request(input), &SharedState::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Player comparison failed: analytics backend unavailable"
        );
    }
}
