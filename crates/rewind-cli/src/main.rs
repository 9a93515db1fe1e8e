//! Rewind - match coaching workflows from the command line
//!
//! The `rewind` command runs the coaching pipelines over local JSON match
//! data with offline collaborators.
//!
//! ## Commands
//!
//! - `templates`: List the built-in workflow templates
//! - `health`: Register every agent and report liveness
//! - `run`: Run a built-in or file-defined template over a seed payload

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rewind_agents::{builtin_templates, default_orchestrator, find_template, Collaborators};
use rewind_core::config::{
    DEFAULT_CONTEXT_HISTORY_CAP, DEFAULT_EVENT_HISTORY_CAP, DEFAULT_MAX_WORKERS,
    ENV_CONTEXT_HISTORY_CAP, ENV_EVENT_HISTORY_CAP, ENV_MAX_WORKERS,
};
use rewind_core::{Payload, RuntimeConfig, WorkflowError, WorkflowTemplate, METRICS};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "rewind")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-agent match coaching workflows", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Worker pool size for parallel delegation
    #[arg(long, global = true, env = ENV_MAX_WORKERS, default_value_t = DEFAULT_MAX_WORKERS)]
    max_workers: usize,

    /// Context write-history entries to retain
    #[arg(long, global = true, env = ENV_CONTEXT_HISTORY_CAP, default_value_t = DEFAULT_CONTEXT_HISTORY_CAP)]
    context_history_cap: usize,

    /// Event history entries to retain
    #[arg(long, global = true, env = ENV_EVENT_HISTORY_CAP, default_value_t = DEFAULT_EVENT_HISTORY_CAP)]
    event_history_cap: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in workflow templates
    Templates,

    /// Register every agent and report liveness
    Health,

    /// Run a workflow template and print the aggregated result
    Run {
        /// Built-in template name (see `rewind templates`)
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        template: Option<String>,

        /// Path to a template definition (JSON)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Path to the seed payload (JSON object)
        #[arg(short, long)]
        input: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            max_workers: self.max_workers,
            context_history_cap: self.context_history_cap,
            event_history_cap: self.event_history_cap,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    rewind_core::init_tracing(cli.json, level);

    let config = cli.runtime_config();
    config.validate().context("Invalid runtime configuration")?;

    match cli.command {
        Commands::Templates => cmd_templates(),
        Commands::Health => cmd_health(&config).await,
        Commands::Run {
            template,
            file,
            input,
            output,
        } => {
            cmd_run(
                &config,
                template.as_deref(),
                file.as_deref(),
                &input,
                output.as_deref(),
            )
            .await
        }
    }
}

/// List built-in templates
fn cmd_templates() -> Result<()> {
    for template in builtin_templates() {
        println!("{}", template.name);
        println!("    {}", template.description);
        println!("    seed: {}", template.seed_keys.join(", "));
        let steps: Vec<String> = template
            .steps
            .iter()
            .map(|s| {
                let marker = if s.required { "" } else { "?" };
                format!("{}{}", s.task.agent, marker)
            })
            .collect();
        println!("    steps: {}", steps.join(" -> "));
        println!();
    }
    Ok(())
}

/// Report agent liveness
async fn cmd_health(config: &RuntimeConfig) -> Result<()> {
    let orchestrator = default_orchestrator(config, &Collaborators::offline()).await?;
    let health = orchestrator.registry().health_check_all();

    for (agent, healthy) in &health {
        let status = if *healthy { "ok" } else { "unhealthy" };
        println!("{:<22} {}", agent, status);
    }

    let unhealthy = health.values().filter(|h| !**h).count();
    if unhealthy > 0 {
        bail!("{} agent(s) failed to initialize", unhealthy);
    }
    Ok(())
}

/// Run a template
async fn cmd_run(
    config: &RuntimeConfig,
    template: Option<&str>,
    file: Option<&Path>,
    input: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let template = load_template(template, file)?;
    let seed = load_seed(input)?;

    let (result, failed) = match run_workflow(config, &template, seed).await? {
        Ok(result) => (result, false),
        Err(err) => (err.to_payload(), true),
    };

    let rendered = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write result to {:?}", path))?;
            info!(path = %path.display(), "result written");
        }
        None => println!("{}", rendered),
    }

    if failed {
        bail!("Workflow '{}' failed", template.name);
    }
    Ok(())
}

fn load_template(name: Option<&str>, file: Option<&Path>) -> Result<WorkflowTemplate> {
    match (name, file) {
        (_, Some(path)) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read template {:?}", path))?;
            WorkflowTemplate::from_json(&raw)
                .with_context(|| format!("Invalid template in {:?}", path))
        }
        (Some(name), None) => match find_template(name) {
            Some(template) => Ok(template),
            None => {
                let known: Vec<String> = builtin_templates().into_iter().map(|t| t.name).collect();
                bail!("Unknown template '{}' (known: {})", name, known.join(", "))
            }
        },
        (None, None) => bail!("Either a template name or --file is required"),
    }
}

fn load_seed(path: &Path) -> Result<Payload> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read input {:?}", path))?;
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {:?}", path))?;
    match value {
        Value::Object(seed) => Ok(seed),
        other => bail!("Input must be a JSON object, got {}", json_type(&other)),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Build an orchestrator, run one template and shut down.
///
/// The outer error covers setup; the inner result is the workflow outcome.
async fn run_workflow(
    config: &RuntimeConfig,
    template: &WorkflowTemplate,
    seed: Payload,
) -> Result<std::result::Result<Payload, WorkflowError>> {
    let orchestrator = default_orchestrator(config, &Collaborators::offline()).await?;
    let outcome = orchestrator.run_template(template, seed).await;
    orchestrator.shutdown().await;
    info!(
        delegations = METRICS.delegations(),
        failures = METRICS.failures(),
        "workflow run complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_json(dir: &tempfile::TempDir, name: &str, value: &Value) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_cli_parses_run_with_builtin_template() {
        let cli = Cli::try_parse_from([
            "rewind",
            "--max-workers",
            "4",
            "run",
            "player_insights",
            "--input",
            "seed.json",
        ])
        .unwrap();

        assert_eq!(cli.runtime_config().max_workers, 4);
        match cli.command {
            Commands::Run { template, file, .. } => {
                assert_eq!(template.as_deref(), Some("player_insights"));
                assert!(file.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_rejects_template_and_file_together() {
        let parsed = Cli::try_parse_from([
            "rewind", "run", "year_summary", "--file", "t.json", "--input", "seed.json",
        ]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from(["rewind", "run", "--input", "seed.json"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_load_template_by_name_and_unknown() {
        assert_eq!(
            load_template(Some("player_comparison"), None).unwrap().name,
            "player_comparison"
        );
        let err = load_template(Some("weekly"), None).unwrap_err();
        assert!(err.to_string().contains("Unknown template 'weekly'"));
    }

    #[test]
    fn test_load_template_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(
            &dir,
            "compare.json",
            &json!({
                "name": "quick_compare",
                "seed_keys": ["player1", "player2"],
                "steps": [{
                    "agent": "player_comparison",
                    "task": "compare_players",
                    "context_keys": ["player1", "player2"]
                }],
                "collect": [{ "name": "comparison", "key": "comparison" }]
            }),
        );

        let template = load_template(None, Some(&path)).unwrap();
        assert_eq!(template.name, "quick_compare");
        assert!(template.steps[0].required);
    }

    #[test]
    fn test_load_seed_requires_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(&dir, "seed.json", &json!([1, 2, 3]));
        let err = load_seed(&path).unwrap_err();
        assert_eq!(err.to_string(), "Input must be a JSON object, got an array");
    }

    #[tokio::test]
    async fn test_run_workflow_reports_step_failure() {
        let template = load_template(Some("player_comparison"), None).unwrap();
        let seed = json!({ "player1": {}, "player2": { "puuid": "b" } });
        let Value::Object(seed) = seed else {
            unreachable!()
        };

        let outcome = run_workflow(&RuntimeConfig::default(), &template, seed)
            .await
            .unwrap();
        let err = outcome.unwrap_err();
        assert_eq!(
            err.to_payload()["details"],
            json!("Missing required input: player1 or player2 data")
        );
    }

    #[tokio::test]
    async fn test_cmd_run_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_json(
            &dir,
            "seed.json",
            &json!({
                "player1": { "name": "Ada", "puuid": "a", "matches": [] },
                "player2": { "name": "Bo", "puuid": "b", "matches": [] }
            }),
        );
        let output = dir.path().join("result.json");

        cmd_run(
            &RuntimeConfig::default(),
            Some("player_comparison"),
            None,
            &input,
            Some(&output),
        )
        .await
        .unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["success"], json!(true));
        assert_eq!(
            written["comparison"]["comparison_text"],
            json!("Dead even on KDA (0.00 vs 0.00)")
        );
    }
}
