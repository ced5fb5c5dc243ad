//! `task` subcommands.

use anyhow::Result;

use kaizen::store::models::NewTask;
use kaizen::store::CycleStore;

use super::{parse_json_object, Engine};
use crate::{Cli, TaskCommands};

pub async fn cmd_task(cli: &Cli, command: &TaskCommands) -> Result<()> {
    let engine = Engine::open(cli)?;
    match command {
        TaskCommands::Add {
            name,
            kind,
            description,
            priority,
            params,
        } => {
            let parameters = parse_json_object("--params", params)?;
            let task = engine
                .store
                .create_task(NewTask {
                    name: name.clone(),
                    kind: kind.clone(),
                    description: description.clone(),
                    priority: priority
                        .unwrap_or(engine.config.scheduler.default_task_priority),
                    parameters,
                })
                .await?;
            println!("Created task {} '{}' (priority {})", task.id, task.name, task.priority);
        }
        TaskCommands::List { limit } => {
            let tasks = engine.store.lock_sync()?.list_tasks(*limit)?;
            if tasks.is_empty() {
                println!("No tasks.");
                return Ok(());
            }
            println!("{:<6} {:<12} {:<10} {:<8} {:<8} NAME", "ID", "STATUS", "KIND", "PRIO", "RETRIES");
            for t in tasks {
                println!(
                    "{:<6} {:<12} {:<10} {:<8} {:<8} {}",
                    t.id, t.status, t.kind, t.priority, t.retry_count, t.name
                );
            }
        }
    }
    Ok(())
}
