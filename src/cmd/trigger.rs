//! `trigger` subcommands.

use anyhow::Result;

use kaizen::store::models::{NewTrigger, TriggerType};
use kaizen::store::CycleStore;

use super::{parse_json_object, Engine};
use crate::{Cli, TriggerCommands};

/// `--type` accepts the snake_case names the store uses.
fn parse_trigger_type(raw: &str) -> Result<TriggerType> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("unknown trigger type '{raw}' (expected quality_threshold, time_based, or event_driven)"))
}

pub async fn cmd_trigger(cli: &Cli, command: &TriggerCommands) -> Result<()> {
    let engine = Engine::open(cli)?;
    match command {
        TriggerCommands::Add {
            name,
            trigger_type,
            description,
            conditions,
            actions,
        } => {
            let trigger_type = parse_trigger_type(trigger_type)?;
            let trigger = engine
                .store
                .create_trigger(NewTrigger {
                    name: name.clone(),
                    description: description.clone(),
                    trigger_type,
                    conditions: parse_json_object("--conditions", conditions)?,
                    actions: parse_json_object("--actions", actions)?,
                })
                .await?;
            println!("Created trigger {} '{}' ({})", trigger.id, trigger.name, trigger.trigger_type);
        }
        TriggerCommands::List => {
            let triggers = engine.store.lock_sync()?.list_triggers()?;
            if triggers.is_empty() {
                println!("No triggers.");
                return Ok(());
            }
            println!(
                "{:<6} {:<20} {:<18} {:<8} {:<8} LAST FIRED",
                "ID", "NAME", "TYPE", "ACTIVE", "FIRED"
            );
            for t in triggers {
                println!(
                    "{:<6} {:<20} {:<18} {:<8} {:<8} {}",
                    t.id,
                    t.name,
                    t.trigger_type,
                    t.is_active,
                    t.trigger_count,
                    t.last_triggered_at.as_deref().unwrap_or("never")
                );
            }
        }
        TriggerCommands::Enable { id } => {
            let t = engine.store.lock_sync()?.set_trigger_active(*id, true)?;
            println!("Trigger {} '{}' enabled", t.id, t.name);
        }
        TriggerCommands::Disable { id } => {
            let t = engine.store.lock_sync()?.set_trigger_active(*id, false)?;
            println!("Trigger {} '{}' disabled", t.id, t.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_type_flag_parses_store_names() {
        assert_eq!(
            parse_trigger_type("quality_threshold").unwrap(),
            TriggerType::QualityThreshold
        );
        assert_eq!(parse_trigger_type("time_based").unwrap(), TriggerType::TimeBased);
        assert_eq!(parse_trigger_type("event_driven").unwrap(), TriggerType::EventDriven);

        let err = parse_trigger_type("sometimes").unwrap_err();
        assert!(err.to_string().contains("unknown trigger type"));
    }
}
