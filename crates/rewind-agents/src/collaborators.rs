//! Boundary traits for the analytics and text services agents depend on.
//!
//! Implementations are synchronous: they either return a value or an error.
//! [`crate::offline`] provides deterministic implementations that need no
//! network access.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::offline::{ChartData, PlainSocial, RuleWriter, StatsAnalyzer, StatsYearSummarizer};

/// Turns raw match records into per-player metrics.
pub trait MatchAnalyzer: Send + Sync {
    /// Analyze the matches `puuid` took part in. An empty object means the
    /// player appears in none of them.
    fn analyze(&self, matches: &[Value], puuid: &str) -> Result<Value>;
}

/// Generative-text backend.
pub trait InsightGenerator: Send + Sync {
    /// Structured coaching insights with `strengths`, `weaknesses`,
    /// `unexpected_insights` and `recommendations` lists.
    fn generate_insights(&self, player_matches: &[Value], key_metrics: &Value) -> Result<Value>;

    fn generate_year_end_summary(&self, summary: &Value, highlights: &Value) -> Result<String>;

    fn generate_comparison(&self, player1_metrics: &Value, player2_metrics: &Value)
        -> Result<String>;
}

/// Produces chart descriptions from match data.
pub trait ChartRenderer: Send + Sync {
    fn win_rate_chart(&self, matches: &[Value], puuid: &str) -> Result<Value>;
    fn kda_trend(&self, matches: &[Value], puuid: &str) -> Result<Value>;
    fn champion_performance(&self, champion_stats: &Value) -> Result<Value>;
    fn role_performance(&self, role_stats: &Value) -> Result<Value>;
}

/// Formats shareable cards and posts.
pub trait SocialFormatter: Send + Sync {
    fn year_end_card(&self, year_summary: &Value) -> Result<Value>;
    fn insight_card(&self, insights: &Value) -> Result<Value>;
    fn comparison_post(&self, player1: &str, player2: &str, comparison: &str) -> Result<Value>;
}

/// Builds a year-in-review from a season of matches.
pub trait YearSummarizer: Send + Sync {
    /// Result carries at least `summary` and `highlights`.
    fn summarize(&self, matches: &[Value], puuid: &str, year: i32) -> Result<Value>;
}

/// The full set of collaborators the default agents are built from.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn MatchAnalyzer>,
    pub writer: Arc<dyn InsightGenerator>,
    pub charts: Arc<dyn ChartRenderer>,
    pub social: Arc<dyn SocialFormatter>,
    pub year_summarizer: Arc<dyn YearSummarizer>,
}

impl Collaborators {
    /// Deterministic local implementations of every collaborator.
    pub fn offline() -> Self {
        Self {
            analyzer: Arc::new(StatsAnalyzer),
            writer: Arc::new(RuleWriter),
            charts: Arc::new(ChartData),
            social: Arc::new(PlainSocial),
            year_summarizer: Arc::new(StatsYearSummarizer::default()),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
