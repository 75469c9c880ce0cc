use std::str::FromStr;

use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use reverie::bank::{EntityKind, MemoryBank, MemoryEntity};
use reverie::recall::RecallEngine;

use crate::error::CliResult;
use crate::output::{truncate_string, OutputFormat};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "List the strongest memories")]
    Top(TopArgs),

    #[clap(about = "Fuzzy-search memories by display text")]
    Search(SearchArgs),

    #[clap(about = "Show one entity in full")]
    Show(ShowArgs),
}

#[derive(Parser)]
pub struct TopArgs {
    #[clap(
        long,
        short,
        default_value = "10",
        help = "Maximum number of entities to display"
    )]
    pub limit: usize,
}

#[derive(Parser)]
pub struct SearchArgs {
    #[clap(help = "Collection to search (people, events, locations)")]
    pub kind: String,

    #[clap(help = "Search text; small misspellings are tolerated")]
    pub query: String,

    #[clap(
        long,
        short,
        help = "Minimum partial-match score 0-100 (defaults to the configured threshold)"
    )]
    pub threshold: Option<f32>,
}

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(help = "Entity id (e.g. p4, e5, l7)")]
    pub id: String,
}

impl MemoryCommand {
    pub fn execute(
        &self,
        bank: &MemoryBank,
        engine: &RecallEngine,
        format: OutputFormat,
    ) -> CliResult<()> {
        match &self.command {
            MemorySubcommand::Top(args) => Self::top(bank, engine, args, format),
            MemorySubcommand::Search(args) => Self::search(bank, engine, args, format),
            MemorySubcommand::Show(args) => Self::show(bank, args, format),
        }
    }

    fn top(
        bank: &MemoryBank,
        engine: &RecallEngine,
        args: &TopArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let entities = engine.top_by_recall(bank, args.limit);
        Self::render_entities(&entities, format)
    }

    fn search(
        bank: &MemoryBank,
        engine: &RecallEngine,
        args: &SearchArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let kind = EntityKind::from_str(&args.kind)?;
        let threshold = args
            .threshold
            .unwrap_or(engine.config().search_threshold);

        let hits = engine.fuzzy_search(bank, kind, &args.query, threshold);

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = hits
                    .iter()
                    .map(|h| {
                        serde_json::json!({
                            "id": h.entity.id(),
                            "kind": h.entity.kind().to_string(),
                            "text": h.entity.display_text(),
                            "score": h.score,
                            "recall_strength": h.entity.recall(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if hits.is_empty() {
                    println!("No matches at threshold {threshold:.0}.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Text", "Score", "Recall"]);

                for hit in &hits {
                    table.add_row([
                        hit.entity.id().to_string(),
                        truncate_string(hit.entity.display_text(), 50),
                        format!("{:.0}", hit.score),
                        format!("{:.2}", hit.entity.recall()),
                    ]);
                }

                println!("{table}");
                println!("\nTotal: {} matches", hits.len());
            }
        }

        Ok(())
    }

    fn show(bank: &MemoryBank, args: &ShowArgs, format: OutputFormat) -> CliResult<()> {
        let entity = bank
            .get_by_id(&args.id)
            .ok_or_else(|| format!("Entity not found: {}", args.id))?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&entity)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Property", "Value"]);

                table.add_row(["ID".to_string(), entity.id().to_string()]);
                table.add_row(["Kind".to_string(), entity.kind().to_string()]);
                table.add_row(["Text".to_string(), entity.display_text().to_string()]);
                table.add_row(["Recall".to_string(), format!("{:.2}", entity.recall())]);

                let connections: Vec<String> = bank
                    .connections
                    .iter()
                    .filter(|c| c.source == args.id || c.target == args.id)
                    .map(|c| format!("{} -> {} ({:.2})", c.source, c.target, c.strength))
                    .collect();
                table.add_row(["Connections".to_string(), connections.join("\n")]);

                println!("{table}");
            }
        }

        Ok(())
    }

    fn render_entities(entities: &[MemoryEntity], format: OutputFormat) -> CliResult<()> {
        match format {
            OutputFormat::Json => {
                let output: Vec<_> = entities
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "id": e.id(),
                            "kind": e.kind().to_string(),
                            "text": e.display_text(),
                            "recall_strength": e.recall(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if entities.is_empty() {
                    println!("The memory bank is empty.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Kind", "Text", "Recall"]);

                for entity in entities {
                    table.add_row([
                        entity.id().to_string(),
                        entity.kind().to_string(),
                        truncate_string(entity.display_text(), 50),
                        format!("{:.2}", entity.recall()),
                    ]);
                }

                println!("{table}");
                println!("\nTotal: {} entities", entities.len());
            }
        }

        Ok(())
    }
}
