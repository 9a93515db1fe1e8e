//! The specialized coaching agents.
//!
//! Each agent validates its input, calls its collaborators, and reports what
//! it produced both as a result payload and as context updates for the
//! agents that run after it.

mod comparison;
mod insights;
mod match_analysis;
mod social_content;
mod visualization;
mod year_summary;

pub use comparison::PlayerComparisonAgent;
pub use insights::InsightsAgent;
pub use match_analysis::MatchAnalysisAgent;
pub use social_content::SocialContentAgent;
pub use visualization::VisualizationAgent;
pub use year_summary::YearSummaryAgent;

use rewind_core::{AgentError, AgentRequest, SharedState};
use serde_json::Value;

pub(crate) const MISSING_MATCHES: &str = "Missing required input: matches or puuid";

/// Null and empty values count as absent.
fn present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

/// Input field `key`, falling back to the shared context.
pub(crate) fn input_or_context(
    request: &AgentRequest,
    shared: &SharedState,
    key: &str,
) -> Option<Value> {
    request
        .input(key)
        .filter(|v| present(v))
        .cloned()
        .or_else(|| shared.context().get(key).filter(present))
}

/// The `matches` list and `puuid` every match-based agent needs.
pub(crate) fn matches_and_puuid(
    request: &AgentRequest,
    shared: &SharedState,
) -> Result<(Vec<Value>, String), AgentError> {
    let matches = input_or_context(request, shared, "matches");
    let puuid = input_or_context(request, shared, "puuid");
    match (matches, puuid) {
        (Some(Value::Array(matches)), Some(Value::String(puuid))) => Ok((matches, puuid)),
        _ => Err(AgentError::validation(MISSING_MATCHES)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use anyhow::bail;
    use serde_json::{json, Value};

    use crate::collaborators::{InsightGenerator, MatchAnalyzer};

    pub fn sample_match(puuid: &str, win: bool) -> Value {
        json!({
            "info": {
                "gameCreation": 1_709_251_200_000_i64,
                "participants": [{
                    "puuid": puuid, "championName": "Ahri", "teamPosition": "MIDDLE",
                    "win": win, "kills": 5, "deaths": 1, "assists": 5
                }]
            }
        })
    }

    /// Analytics backend that is always down.
    pub struct DownAnalyzer;

    impl MatchAnalyzer for DownAnalyzer {
        fn analyze(&self, _matches: &[Value], _puuid: &str) -> anyhow::Result<Value> {
            bail!("analytics backend unavailable")
        }
    }

    /// Text backend that is always throttled.
    pub struct ThrottledWriter;

    impl InsightGenerator for ThrottledWriter {
        fn generate_insights(&self, _m: &[Value], _k: &Value) -> anyhow::Result<Value> {
            bail!("throttled")
        }

        fn generate_year_end_summary(&self, _s: &Value, _h: &Value) -> anyhow::Result<String> {
            bail!("throttled")
        }

        fn generate_comparison(&self, _a: &Value, _b: &Value) -> anyhow::Result<String> {
            bail!("throttled")
        }
    }
}
