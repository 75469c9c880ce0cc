use std::path::PathBuf;

use clap::Parser;
use reverie::bank::{migrate_legacy, EntityStore};

use crate::error::CliResult;
use crate::output::OutputFormat;

/// Convert a legacy `nodes`/`links` document into the canonical memory bank
#[derive(Parser)]
pub struct MigrateCommand {
    #[clap(help = "Path to the legacy JSON document")]
    pub input: PathBuf,

    #[clap(
        long,
        help = "Overwrite an existing canonical memory bank at the target path"
    )]
    pub force: bool,
}

impl MigrateCommand {
    pub fn execute(&self, store: &EntityStore, format: OutputFormat) -> CliResult<()> {
        if store.path().exists() && !self.force {
            return Err(format!(
                "A memory bank already exists at {}; pass --force to overwrite it",
                store.path().display()
            )
            .into());
        }

        let content = std::fs::read_to_string(&self.input)?;
        let bank = migrate_legacy(&content)?;
        store.save(&bank)?;

        match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "entities": bank.entity_count(),
                        "connections": bank.connections.len(),
                        "output": store.path(),
                    }))?
                );
            }
            OutputFormat::Table => {
                println!(
                    "Migrated {} entities and {} connections to {}",
                    bank.entity_count(),
                    bank.connections.len(),
                    store.path().display()
                );
            }
        }

        Ok(())
    }
}
