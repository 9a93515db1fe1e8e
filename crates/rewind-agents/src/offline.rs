//! Deterministic collaborators computed from the match records themselves.
//!
//! Match records follow the upstream game API shape: participants live under
//! `info.participants` and carry `puuid`, `win`, `kills`, `deaths`,
//! `assists`, `championName`, `teamPosition` and per-game totals.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use chrono::{DateTime, Datelike, Utc};
use serde_json::{json, Map, Value};

use crate::collaborators::{
    ChartRenderer, InsightGenerator, MatchAnalyzer, SocialFormatter, YearSummarizer,
};

fn participant<'a>(record: &'a Value, puuid: &str) -> Option<&'a Value> {
    record
        .pointer("/info/participants")?
        .as_array()?
        .iter()
        .find(|p| p.get("puuid").and_then(Value::as_str) == Some(puuid))
}

fn game_creation(record: &Value) -> i64 {
    record
        .pointer("/info/gameCreation")
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn num(participant: &Value, key: &str) -> f64 {
    participant.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn kda(participant: &Value) -> f64 {
    (num(participant, "kills") + num(participant, "assists")) / num(participant, "deaths").max(1.0)
}

fn won(participant: &Value) -> bool {
    participant
        .get("win")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Games the player took part in, oldest first.
fn player_games<'a>(matches: &'a [Value], puuid: &str) -> Vec<&'a Value> {
    let mut games: Vec<(&Value, &Value)> = matches
        .iter()
        .filter_map(|m| participant(m, puuid).map(|p| (m, p)))
        .collect();
    games.sort_by_key(|(m, _)| game_creation(m));
    games.into_iter().map(|(_, p)| p).collect()
}

fn group_stats(players: &[&Value], field: &str, fallback: &str) -> Value {
    let mut groups: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
    for p in players {
        let name = p.get(field).and_then(Value::as_str).unwrap_or(fallback);
        let name = if name.is_empty() { fallback } else { name };
        groups.entry(name.to_string()).or_default().push(p);
    }

    let summary: Map<String, Value> = groups
        .into_iter()
        .map(|(name, games)| {
            let wins = games.iter().filter(|p| won(p)).count();
            let stats = json!({
                "games_played": games.len(),
                "win_rate": percent(wins, games.len()),
                "avg_kda": mean(games.iter().map(|p| kda(p))),
            });
            (name, stats)
        })
        .collect();
    Value::Object(summary)
}

/// Win rate, per-champion and per-role splits, and averaged key metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsAnalyzer;

impl MatchAnalyzer for StatsAnalyzer {
    fn analyze(&self, matches: &[Value], puuid: &str) -> Result<Value> {
        let players = player_games(matches, puuid);
        if players.is_empty() {
            return Ok(json!({}));
        }

        let total = players.len();
        let wins = players.iter().filter(|p| won(p)).count();
        Ok(json!({
            "total_matches": total,
            "win_rate": {
                "wins": wins,
                "losses": total - wins,
                "win_rate": percent(wins, total),
                "total_games": total,
            },
            "champion_stats": group_stats(&players, "championName", "Unknown"),
            "role_stats": group_stats(&players, "teamPosition", "UNKNOWN"),
            "key_metrics": {
                "avg_kda": mean(players.iter().map(|p| kda(p))),
                "avg_damage": mean(players.iter().map(|p| num(p, "totalDamageDealtToChampions"))),
                "avg_gold": mean(players.iter().map(|p| num(p, "goldEarned"))),
                "avg_vision_score": mean(players.iter().map(|p| num(p, "visionScore"))),
                "avg_cs": mean(players
                    .iter()
                    .map(|p| num(p, "totalMinionsKilled") + num(p, "neutralMinionsKilled"))),
                "win_rate": percent(wins, total),
            },
        }))
    }
}

fn metric(metrics: &Value, key: &str) -> f64 {
    metrics.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Threshold-based coaching text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleWriter;

impl InsightGenerator for RuleWriter {
    fn generate_insights(&self, player_matches: &[Value], key_metrics: &Value) -> Result<Value> {
        let avg_kda = metric(key_metrics, "avg_kda");
        let win_rate = metric(key_metrics, "win_rate");
        let vision = metric(key_metrics, "avg_vision_score");

        let mut strengths = Vec::new();
        let mut weaknesses = Vec::new();
        let mut recommendations = Vec::new();

        if avg_kda >= 3.0 {
            strengths.push(format!("Strong fighting efficiency ({avg_kda:.2} KDA)"));
        } else {
            weaknesses.push(format!("Low fighting efficiency ({avg_kda:.2} KDA)"));
            recommendations.push("Trade more conservatively and avoid isolated deaths".to_string());
        }
        if win_rate >= 50.0 {
            strengths.push(format!("Winning record ({win_rate:.1}%)"));
        } else {
            weaknesses.push(format!("Losing record ({win_rate:.1}%)"));
            recommendations.push("Narrow the champion pool to your best performers".to_string());
        }
        if vision < 20.0 {
            recommendations.push("Place and clear more wards".to_string());
        }

        let unexpected = if player_matches.is_empty() {
            Vec::new()
        } else {
            vec![format!("Reviewed {} recent games", player_matches.len())]
        };

        Ok(json!({
            "strengths": strengths,
            "weaknesses": weaknesses,
            "unexpected_insights": unexpected,
            "recommendations": recommendations,
        }))
    }

    fn generate_year_end_summary(&self, summary: &Value, highlights: &Value) -> Result<String> {
        let games = summary
            .get("total_matches")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let win_rate = summary
            .pointer("/win_rate/win_rate")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let mut text = format!("{games} games played with a {win_rate:.1}% win rate.");
        let notes: Vec<&str> = highlights
            .as_array()
            .map(|h| h.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if !notes.is_empty() {
            text.push_str(" Highlights: ");
            text.push_str(&notes.join("; "));
            text.push('.');
        }
        Ok(text)
    }

    fn generate_comparison(
        &self,
        player1_metrics: &Value,
        player2_metrics: &Value,
    ) -> Result<String> {
        let kda1 = metric(player1_metrics, "avg_kda");
        let kda2 = metric(player2_metrics, "avg_kda");
        let leader = match kda1.partial_cmp(&kda2) {
            Some(std::cmp::Ordering::Greater) => "Player 1 leads",
            Some(std::cmp::Ordering::Less) => "Player 2 leads",
            _ => "Dead even",
        };
        Ok(format!("{leader} on KDA ({kda1:.2} vs {kda2:.2})"))
    }
}

/// Charts as plain label/value series, ready for a front end to draw.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChartData;

fn split_series(stats: &Value, value_key: &str) -> Result<(Vec<String>, Vec<Value>)> {
    let Some(groups) = stats.as_object().filter(|g| !g.is_empty()) else {
        bail!("no grouped stats to chart");
    };
    Ok(groups
        .iter()
        .map(|(name, s)| (name.clone(), s.get(value_key).cloned().unwrap_or(Value::Null)))
        .unzip())
}

impl ChartRenderer for ChartData {
    fn win_rate_chart(&self, matches: &[Value], puuid: &str) -> Result<Value> {
        let games = player_games(matches, puuid);
        if games.is_empty() {
            bail!("player {puuid} appears in no matches");
        }
        let mut wins = 0;
        let points: Vec<f64> = games
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if won(p) {
                    wins += 1;
                }
                percent(wins, i + 1)
            })
            .collect();
        Ok(json!({ "type": "line", "title": "Cumulative win rate", "values": points }))
    }

    fn kda_trend(&self, matches: &[Value], puuid: &str) -> Result<Value> {
        let games = player_games(matches, puuid);
        if games.is_empty() {
            bail!("player {puuid} appears in no matches");
        }
        let points: Vec<f64> = games.iter().map(|p| kda(p)).collect();
        Ok(json!({ "type": "line", "title": "KDA per game", "values": points }))
    }

    fn champion_performance(&self, champion_stats: &Value) -> Result<Value> {
        let (labels, values) = split_series(champion_stats, "win_rate")?;
        Ok(json!({ "type": "bar", "title": "Win rate by champion", "labels": labels, "values": values }))
    }

    fn role_performance(&self, role_stats: &Value) -> Result<Value> {
        let (labels, values) = split_series(role_stats, "avg_kda")?;
        Ok(json!({ "type": "bar", "title": "KDA by role", "labels": labels, "values": values }))
    }
}

/// Text cards with a fixed hashtag set.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainSocial;

const HASHTAGS: [&str; 2] = ["#Rewind", "#LeagueOfLegends"];

impl SocialFormatter for PlainSocial {
    fn year_end_card(&self, year_summary: &Value) -> Result<Value> {
        let year = year_summary.get("year").and_then(Value::as_i64).unwrap_or_default();
        let highlights = year_summary
            .get("highlights")
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok(json!({
            "title": format!("My {year} on the Rift"),
            "highlights": highlights,
            "hashtags": HASHTAGS,
        }))
    }

    fn insight_card(&self, insights: &Value) -> Result<Value> {
        let headline = insights
            .pointer("/strengths/0")
            .and_then(Value::as_str)
            .unwrap_or("Keep climbing");
        Ok(json!({
            "title": "Coaching insights",
            "headline": headline,
            "hashtags": HASHTAGS,
        }))
    }

    fn comparison_post(&self, player1: &str, player2: &str, comparison: &str) -> Result<Value> {
        Ok(json!({
            "text": format!("{player1} vs {player2}: {comparison}"),
            "hashtags": HASHTAGS,
        }))
    }
}

/// Year-in-review built on [`StatsAnalyzer`], restricted to games played in
/// the requested calendar year (UTC). Games without a creation time count.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsYearSummarizer {
    analyzer: StatsAnalyzer,
}

fn played_in(record: &Value, year: i32) -> bool {
    match record.pointer("/info/gameCreation").and_then(Value::as_i64) {
        Some(ms) => DateTime::<Utc>::from_timestamp_millis(ms).is_some_and(|t| t.year() == year),
        None => true,
    }
}

impl YearSummarizer for StatsYearSummarizer {
    fn summarize(&self, matches: &[Value], puuid: &str, year: i32) -> Result<Value> {
        let season: Vec<Value> = matches
            .iter()
            .filter(|m| played_in(m, year))
            .cloned()
            .collect();
        let analysis = self.analyzer.analyze(&season, puuid)?;
        if analysis.as_object().map_or(true, Map::is_empty) {
            bail!("no {year} games found for player {puuid}");
        }

        let mut highlights = Vec::new();
        if let Some(champions) = analysis.get("champion_stats").and_then(Value::as_object) {
            let favourite = champions.iter().max_by_key(|(_, s)| {
                s.get("games_played").and_then(Value::as_u64).unwrap_or(0)
            });
            if let Some((name, stats)) = favourite {
                let games = stats.get("games_played").and_then(Value::as_u64).unwrap_or(0);
                highlights.push(format!("Most played champion: {name} ({games} games)"));
            }
        }
        let best_kda = season
            .iter()
            .filter_map(|m| participant(m, puuid))
            .map(kda)
            .fold(0.0_f64, f64::max);
        highlights.push(format!("Best single-game KDA: {best_kda:.2}"));

        Ok(json!({
            "year": year,
            "summary": {
                "total_matches": analysis["total_matches"],
                "win_rate": analysis["win_rate"],
                "key_metrics": analysis["key_metrics"],
            },
            "highlights": highlights,
            "champion_stats": analysis["champion_stats"],
        }))
    }
}
