//! `status` command: a point-in-time view of the engine.

use anyhow::Result;

use kaizen::store::models::TaskStatus;
use kaizen::store::CycleStore;

use super::Engine;
use crate::Cli;

pub async fn cmd_status(cli: &Cli) -> Result<()> {
    let engine = Engine::open(cli)?;

    let active = engine.store.get_active_cycles().await?;
    println!("Active cycles: {}", active.len());
    for cycle in &active {
        println!(
            "  #{} [{}] {} ({} artifacts)",
            cycle.id,
            cycle.status,
            cycle.goal,
            cycle.artifacts.len()
        );
    }

    let last = engine.store.get_recent_cycles(5).await?;
    if !last.is_empty() {
        println!("Last cycles:");
        for cycle in &last {
            let score = cycle
                .success_score
                .map(|s| format!("{s:.1}"))
                .unwrap_or_else(|| "-".to_string());
            println!("  #{} [{}] score {} {}", cycle.id, cycle.status, score, cycle.goal);
        }
    }

    let window = engine.config.triggers.quality_window;
    let recent = engine.store.get_recent_completed(window).await?;
    if recent.is_empty() {
        println!("Recent quality: no completed cycles yet");
    } else {
        let scores: Vec<f64> = recent.iter().filter_map(|c| c.success_score).collect();
        let avg = scores.iter().sum::<f64>() / scores.len().max(1) as f64;
        println!(
            "Recent quality: {:.1} average over {} completed cycle(s)",
            avg,
            recent.len()
        );
    }

    let tasks = engine.store.lock_sync()?.list_tasks(200)?;
    let pending = tasks.iter().filter(|t| t.status == TaskStatus::Pending).count();
    let in_progress = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::InProgress)
        .count();
    let failed = tasks.iter().filter(|t| t.status == TaskStatus::Failed).count();
    println!("Task queue: {pending} pending, {in_progress} in progress, {failed} failed");

    let triggers = engine.store.lock_sync()?.list_triggers()?;
    let active_triggers = triggers.iter().filter(|t| t.is_active).count();
    println!("Triggers: {} active of {}", active_triggers, triggers.len());

    let assessments = engine.store.lock_sync()?.get_recent_assessments(1)?;
    if let Some(a) = assessments.first() {
        println!(
            "Last assessment: {:.1} overall, improvement {}",
            a.overall_score,
            if a.requires_improvement { "required" } else { "not required" }
        );
    }

    Ok(())
}
