use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "kaizen")]
#[command(version, about = "Self-improving workflow engine")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file (defaults to ./kaizen.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path, overriding the configured one
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one full cycle for a goal and print the outcome
    Run {
        goal: String,

        /// Cycle parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,

        /// Parent cycle id, for follow-up cycles
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Run the background scheduler until interrupted
    Daemon,
    /// Manage the task queue
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Manage evolution triggers
    Trigger {
        #[command(subcommand)]
        command: TriggerCommands,
    },
    /// Show active cycles, queue depth, and recent quality
    Status,
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Enqueue a task
    Add {
        name: String,

        /// Free-form classification (e.g. routine, evolution)
        #[arg(long, default_value = "routine")]
        kind: String,

        /// Goal text for the cycle; defaults to the task name
        #[arg(long, default_value = "")]
        description: String,

        /// Priority; higher runs first. Defaults to the configured value
        #[arg(long)]
        priority: Option<i64>,

        /// Task parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// List recent tasks
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum TriggerCommands {
    /// Register a standing rule
    Add {
        name: String,

        /// quality_threshold, time_based, or event_driven
        #[arg(long = "type")]
        trigger_type: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Rule parameters as a JSON object
        #[arg(long, default_value = "{}")]
        conditions: String,

        /// Tasks to spawn on fire, as a JSON object
        #[arg(long, default_value = "{}")]
        actions: String,
    },
    /// List all triggers with their fire counts
    List,
    /// Re-activate a trigger
    Enable { id: i64 },
    /// Deactivate a trigger without deleting its history
    Disable { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    kaizen::observability::init(cli.verbose);

    match &cli.command {
        Commands::Run {
            goal,
            params,
            parent,
        } => cmd::cmd_run(&cli, goal, params, *parent).await,
        Commands::Daemon => cmd::cmd_daemon(&cli).await,
        Commands::Task { command } => cmd::cmd_task(&cli, command).await,
        Commands::Trigger { command } => cmd::cmd_trigger(&cli, command).await,
        Commands::Status => cmd::cmd_status(&cli).await,
    }
}
