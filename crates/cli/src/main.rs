//! `agentflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: compile a graph JSON file and print its execution order.
//! - `run`: execute a graph file or a free-text goal.
//! - `migrate`: run pending database migrations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use db::{MemoryRunSink, PgRunSink, RunSink};
use engine::{EngineConfig, Graph, PlanTier, QuotaTracker, RunRequest, Runner};
use tools::{Providers, ToolRegistry};

const DEFAULT_CONFIG: &str = "agentflow.toml";

#[derive(Parser)]
#[command(name = "agentflow", about = "Agent workflow execution engine", version)]
struct Cli {
    /// Path to the TOML config. Defaults to `./agentflow.toml` when present.
    #[arg(long, global = true, env = "AGENTFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a graph JSON file and print the execution order.
    Validate {
        /// Path to the graph JSON file (`{ "nodes": [...], "edges": [...] }`).
        path: PathBuf,
    },
    /// Execute a graph, or plan and execute a goal.
    Run {
        /// Graph JSON file to execute.
        #[arg(long, conflicts_with = "goal", required_unless_present = "goal")]
        graph: Option<PathBuf>,
        /// Free-text goal to plan and execute step by step.
        #[arg(long)]
        goal: Option<String>,
        #[arg(long, env = "AGENTFLOW_USER", default_value = "local")]
        user: String,
        #[arg(long)]
        project: Option<String>,
        /// Plan tier whose quotas apply: free, pro or team.
        #[arg(long, default_value = "free")]
        plan: PlanTier,
        /// Model for this run; overrides `runner.default_model`.
        #[arg(long)]
        model: Option<String>,
        /// Print the summary as JSON instead of markdown.
        #[arg(long)]
        json: bool,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Validate { path } => validate(&path),
        Command::Run {
            graph,
            goal,
            user,
            project,
            plan,
            model,
            json,
        } => {
            let mut request = match (graph, goal) {
                (Some(path), _) => RunRequest::graph(user, read_graph(&path)?),
                (None, Some(goal)) => RunRequest::goal(user, goal),
                (None, None) => bail!("either --graph or --goal is required"),
            };
            request = request.with_plan(plan);
            if let Some(project) = project {
                request = request.with_project(project);
            }
            if let Some(model) = model {
                request = request.with_model(model);
            }
            run(&config, request, json).await
        }
        Command::Migrate { database_url } => {
            let url = database_url
                .as_deref()
                .or(config.database_url())
                .context("no database URL: pass --database-url, set DATABASE_URL, or set database_url in the config")?;
            let pool = db::pool::create_pool(url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool)
                .await
                .context("migration failed")?;
            info!("migrations applied");
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("cannot load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => EngineConfig::load(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("cannot load config {DEFAULT_CONFIG}")),
        None => Ok(EngineConfig::default()),
    }
}

fn read_graph(path: &Path) -> Result<Graph> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid graph JSON in {}", path.display()))
}

fn validate(path: &Path) -> Result<()> {
    let graph = read_graph(path)?;

    match engine::compile(&graph) {
        Ok(steps) => {
            println!("Graph is valid. Execution order:");
            let mut seen: Vec<String> = Vec::with_capacity(steps.len());
            for (i, step) in steps.iter().enumerate() {
                println!("  {i}. {} ({})", step.node_id, step.tool);
                for placeholder in engine::placeholders(&step.input) {
                    if !seen.contains(&placeholder.node_id) {
                        println!(
                            "     warning: '{}' reads '{}', which has not run yet and resolves to \"\"",
                            step.node_id, placeholder.node_id
                        );
                    }
                }
                seen.push(step.node_id.clone());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Validation failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(config: &EngineConfig, request: RunRequest, as_json: bool) -> Result<()> {
    let sink: Arc<dyn RunSink> = match config.database_url() {
        Some(url) => {
            let pool = db::pool::connect_and_migrate(url, 5)
                .await
                .context("failed to open run store")?;
            Arc::new(PgRunSink::new(pool))
        }
        None => {
            warn!("no database_url configured, keeping run records in memory");
            Arc::new(MemoryRunSink::new())
        }
    };

    let registry = ToolRegistry::with_builtins(
        Providers::from_settings(&config.providers),
        config.tool_timeout(),
    );
    let runner = Runner::new(
        Arc::new(registry),
        sink,
        Arc::new(QuotaTracker::new()),
        config.pricing.clone(),
        config.runner_config(),
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            on_interrupt.cancel();
        }
    });

    let outcome = runner.run(request, cancel).await.context("could not start run")?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    } else {
        println!("{}", outcome.summary.render_markdown());
    }

    if let Some(e) = outcome.error() {
        eprintln!("Run failed: {e}");
        std::process::exit(1);
    }
    Ok(())
}
