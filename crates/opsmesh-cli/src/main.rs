//! `opsmesh`: route DevOps requests to specialised agents and run the
//! resulting plans.

mod config;

use clap::{Parser, Subcommand};
use config::{CliConfig, LogFormat};
use opsmesh_orchestrator::{
    ExecutionMode, ExecutionPlan, Orchestrator, PlanManifest, PlanStatus, SubmitOutcome,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opsmesh", about = "Opsmesh: multi-agent DevOps orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "opsmesh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which agents would handle a request
    Analyze {
        /// Free-text request
        request: String,
    },
    /// Route a request to agents and execute the resulting plan
    Run {
        /// Free-text request
        request: String,
        /// Start the plan on a background worker, then wait for it
        #[arg(long)]
        background: bool,
    },
    /// Execute an explicit task list from a TOML or JSON file
    Plan {
        /// Task file (`.toml` or `.json`)
        file: PathBuf,
        #[arg(long)]
        background: bool,
    },
    /// List registered agents
    Agents,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

fn mode(background: bool) -> ExecutionMode {
    if background {
        ExecutionMode::Background
    } else {
        ExecutionMode::Blocking
    }
}

/// Wait for background runs so every command prints a final snapshot.
async fn finish(orchestrator: &Orchestrator, outcome: SubmitOutcome) -> anyhow::Result<ExecutionPlan> {
    match outcome.plan {
        Some(plan) => Ok(plan),
        None => {
            info!(plan_id = %outcome.plan_id, "Waiting for background plan");
            Ok(orchestrator.wait(outcome.plan_id).await?)
        }
    }
}

async fn print_report(orchestrator: &Orchestrator, plan: &ExecutionPlan) -> anyhow::Result<()> {
    let report = serde_json::json!({
        "plan": plan,
        "resources": orchestrator.list_resources(None),
        "deployments": orchestrator.list_deployments(),
        "metrics": orchestrator.metrics_report().await,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(&cli.config).await?;
    init_logging(config.logging.format);

    let orchestrator = Orchestrator::with_builtins(config.orchestrator);

    let plan = match cli.command {
        Commands::Analyze { request } => {
            let agents = orchestrator.analyze(&request);
            if agents.is_empty() {
                println!("No agent can handle this request.");
            } else {
                println!("Matched agents:");
                for agent in &agents {
                    println!("  {agent}");
                }
            }
            return Ok(());
        }
        Commands::Agents => {
            let agents = orchestrator.list_agents();
            println!("Registered agents:");
            for agent in &agents {
                println!("  {}: {}", agent.agent_type, agent.description);
                println!("    keywords: {}", agent.keywords.join(", "));
            }
            println!("\nTotal: {} agent(s)", agents.len());
            return Ok(());
        }
        Commands::Run {
            request,
            background,
        } => {
            let outcome = orchestrator
                .submit_request(request, mode(background))
                .await?;
            finish(&orchestrator, outcome).await?
        }
        Commands::Plan { file, background } => {
            let manifest = PlanManifest::from_path(&file).map_err(|e| {
                anyhow::anyhow!("Failed to load task file '{}': {e}", file.display())
            })?;
            let title = manifest.title_or_default();
            let outcome = orchestrator
                .submit_tasks(title, manifest.tasks, mode(background))
                .await?;
            finish(&orchestrator, outcome).await?
        }
    };

    print_report(&orchestrator, &plan).await?;
    if plan.status != PlanStatus::Completed {
        anyhow::bail!("Plan {} finished with status {}", plan.id, plan.status);
    }
    Ok(())
}
