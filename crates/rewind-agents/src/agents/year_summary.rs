use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use rewind_core::{payload, Agent, AgentError, AgentOutput, AgentRequest, SharedState};
use serde_json::{json, Value};

use super::{input_or_context, matches_and_puuid};
use crate::collaborators::{InsightGenerator, YearSummarizer};

/// Season used when the request names none.
pub const DEFAULT_YEAR: i32 = 2024;

/// Builds the year-in-review and its narrated summary.
pub struct YearSummaryAgent {
    summarizer: Arc<dyn YearSummarizer>,
    writer: Arc<dyn InsightGenerator>,
}

impl YearSummaryAgent {
    pub const NAME: &'static str = "year_summary";

    pub fn new(summarizer: Arc<dyn YearSummarizer>, writer: Arc<dyn InsightGenerator>) -> Self {
        Self { summarizer, writer }
    }
}

fn requested_year(value: Option<Value>) -> Result<i32, AgentError> {
    let Some(value) = value else {
        return Ok(DEFAULT_YEAR);
    };
    value
        .as_i64()
        .and_then(|y| i32::try_from(y).ok())
        .ok_or_else(|| AgentError::validation(format!("Invalid year: {value}")))
}

#[async_trait]
impl Agent for YearSummaryAgent {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(
        &self,
        request: &AgentRequest,
        shared: &SharedState,
    ) -> Result<AgentOutput, AgentError> {
        let (matches, puuid) = matches_and_puuid(request, shared)?;
        let year = requested_year(input_or_context(request, shared, "year"))?;

        let year_summary = self
            .summarizer
            .summarize(&matches, &puuid, year)
            .context("Year-end summary generation failed")?;
        let empty = json!({});
        let ai_summary = self
            .writer
            .generate_year_end_summary(
                year_summary.get("summary").unwrap_or(&empty),
                year_summary.get("highlights").unwrap_or(&empty),
            )
            .context("Year-end summary generation failed")?;

        Ok(AgentOutput::new()
            .with_result(payload(json!({
                "year_summary": year_summary,
                "ai_summary": ai_summary,
            })))
            .with_context_updates(payload(json!({
                "year_summary": year_summary,
                "year": year,
                "ai_summary": ai_summary,
            }))))
    }
}
