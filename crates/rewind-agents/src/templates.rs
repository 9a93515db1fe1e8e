//! The built-in coaching pipelines, expressed as workflow templates.

use rewind_core::{CollectField, TaskSpec, TemplateStep, WorkflowTemplate};
use serde_json::json;

use crate::agents::{
    InsightsAgent, MatchAnalysisAgent, PlayerComparisonAgent, SocialContentAgent,
    VisualizationAgent, YearSummaryAgent,
};

pub const PLAYER_INSIGHTS: &str = "player_insights";
pub const YEAR_SUMMARY: &str = "year_summary";
pub const PLAYER_COMPARISON: &str = "player_comparison";

/// Match analysis, then insights and charts built on it.
///
/// Only the analysis is required; insights and visualization failures leave
/// their fields at the defaults.
pub fn player_insights() -> WorkflowTemplate {
    WorkflowTemplate::new(PLAYER_INSIGHTS)
        .describe("Analyze a player's matches and generate coaching insights and charts")
        .seed("matches")
        .seed("puuid")
        .seed("player_matches")
        .step(
            TemplateStep::required(
                TaskSpec::new(MatchAnalysisAgent::NAME, "analyze_matches")
                    .reading(["matches", "puuid"])
                    .writing(["match_analysis", "match_count", "puuid"]),
            )
            .with_failure_message("Match analysis failed"),
        )
        .step(TemplateStep::optional(
            TaskSpec::new(InsightsAgent::NAME, "generate_insights")
                .reading(["match_analysis", "player_matches"])
                .writing([
                    "insights",
                    "strengths",
                    "weaknesses",
                    "unexpected_insights",
                    "recommendations",
                ]),
        ))
        .step(TemplateStep::optional(
            TaskSpec::new(VisualizationAgent::NAME, "generate_visualizations")
                .reading(["matches", "puuid", "match_analysis"])
                .writing(["visualizations"]),
        ))
        .collect(CollectField::new("match_analysis", json!({})))
        .collect(CollectField::new("insights", json!({})))
        .collect(CollectField::new("visualizations", json!({})))
        .collect(CollectField::nested(
            "key_metrics",
            "match_analysis",
            "/key_metrics",
            json!({}),
        ))
}

/// Year-in-review followed by a shareable year-end card.
pub fn year_summary() -> WorkflowTemplate {
    WorkflowTemplate::new(YEAR_SUMMARY)
        .describe("Build a year-end retrospective and a social card for it")
        .seed("matches")
        .seed("puuid")
        .seed("year")
        .step(
            TemplateStep::required(
                TaskSpec::new(YearSummaryAgent::NAME, "generate_year_summary")
                    .reading(["matches", "puuid", "year"])
                    .writing(["year_summary", "year", "ai_summary"]),
            )
            .with_failure_message("Year summary generation failed"),
        )
        .step(TemplateStep::optional(
            TaskSpec::new(SocialContentAgent::NAME, "generate_content")
                .with_input_value("content_type", json!("year-end"))
                .reading(["year_summary"])
                .writing(["social_content", "content_type"]),
        ))
        .collect(CollectField::new("year_summary", json!({})))
        .collect(CollectField::new("ai_summary", json!("")))
        .collect(CollectField::new("social_content", json!({})))
}

/// Head-to-head comparison of two players.
pub fn player_comparison() -> WorkflowTemplate {
    WorkflowTemplate::new(PLAYER_COMPARISON)
        .describe("Compare two players and draft a shareable post")
        .seed("player1")
        .seed("player2")
        .step(
            TemplateStep::required(
                TaskSpec::new(PlayerComparisonAgent::NAME, "compare_players")
                    .reading(["player1", "player2"])
                    .writing(["comparison"]),
            )
            .with_failure_message("Player comparison failed"),
        )
        .collect(CollectField::new("comparison", json!({})))
}

pub fn builtin_templates() -> Vec<WorkflowTemplate> {
    vec![player_insights(), year_summary(), player_comparison()]
}

pub fn find_template(name: &str) -> Option<WorkflowTemplate> {
    builtin_templates().into_iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_validate() {
        for template in builtin_templates() {
            template.validate().unwrap();
        }
    }

    #[test]
    fn test_find_template() {
        assert_eq!(find_template("year_summary").unwrap().steps.len(), 2);
        assert!(find_template("weekly_digest").is_none());
    }

    #[test]
    fn test_templates_survive_json() {
        for template in builtin_templates() {
            let raw = serde_json::to_string(&template).unwrap();
            assert_eq!(WorkflowTemplate::from_json(&raw).unwrap(), template);
        }
    }
}
