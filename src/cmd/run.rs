//! `run` and `daemon` commands.

use anyhow::{bail, Result};
use tracing::info;

use kaizen::scheduler::Scheduler;

use super::{parse_json_object, Engine};
use crate::Cli;

/// Run one full cycle in the foreground and print the result as JSON.
pub async fn cmd_run(cli: &Cli, goal: &str, params: &str, parent: Option<i64>) -> Result<()> {
    let engine = Engine::open(cli)?;
    let params = parse_json_object("--params", params)?;

    let result = engine.orchestrator.run_full_cycle(goal, params, parent).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        bail!(
            "cycle failed: {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Run the scheduler until Ctrl-C. In-flight work drains before exit.
pub async fn cmd_daemon(cli: &Cli) -> Result<()> {
    let engine = Engine::open(cli)?;
    let scheduler = Scheduler::new(
        engine.store.clone(),
        engine.orchestrator.clone(),
        engine.triggers.clone(),
        engine.config.scheduler.clone(),
        engine.shutdown.clone(),
    );

    let shutdown = engine.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current batch");
            shutdown.cancel();
        }
    });

    scheduler.run().await;
    Ok(())
}
