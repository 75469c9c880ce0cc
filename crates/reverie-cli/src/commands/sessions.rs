use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use reverie::session::SessionLog;

use crate::error::CliResult;
use crate::output::{format_timestamp, truncate_string, OutputFormat};

#[derive(Parser)]
pub struct SessionsCommand {
    #[clap(subcommand)]
    pub command: SessionsSubcommand,
}

#[derive(Subcommand)]
pub enum SessionsSubcommand {
    #[clap(about = "List logged sessions")]
    List(ListArgs),

    #[clap(about = "Show one session record in full")]
    Show(ShowArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of sessions to display"
    )]
    pub limit: usize,

    #[clap(long, help = "Filter to one patient")]
    pub patient: Option<String>,
}

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(help = "Session id")]
    pub session_id: String,
}

impl SessionsCommand {
    pub fn execute(&self, log: &SessionLog, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            SessionsSubcommand::List(args) => Self::list(log, args, format),
            SessionsSubcommand::Show(args) => Self::show(log, args, format),
        }
    }

    fn list(log: &SessionLog, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let mut records = log.read_all()?;
        if let Some(ref patient) = args.patient {
            records.retain(|r| &r.patient_id == patient);
        }
        // Most recent first
        records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        records.truncate(args.limit);

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
            OutputFormat::Table => {
                if records.is_empty() {
                    println!("No sessions logged.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Session", "Patient", "Started", "Segments", "Mood"]);

                for record in &records {
                    table.add_row([
                        record.session_id.as_str().to_string(),
                        record.patient_id.clone(),
                        format_timestamp(&record.start_time),
                        record.dialogue_segments.len().to_string(),
                        truncate_string(&record.mood.join(", "), 30),
                    ]);
                }

                println!("{table}");
                println!("\nTotal: {} sessions", records.len());
            }
        }

        Ok(())
    }

    fn show(log: &SessionLog, args: &ShowArgs, format: OutputFormat) -> CliResult<()> {
        let record = log
            .read_all()?
            .into_iter()
            .find(|r| r.session_id.as_str() == args.session_id)
            .ok_or_else(|| format!("Session not found: {}", args.session_id))?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            OutputFormat::Table => {
                println!("Session {} ({})", record.session_id, record.patient_id);
                println!("Started: {}", format_timestamp(&record.start_time));
                if let Some(end) = record.end_time {
                    println!("Ended:   {}", format_timestamp(&end));
                }
                if !record.mood.is_empty() {
                    println!("Mood:    {}", record.mood.join(", "));
                }
                if let Some(summary) = &record.session_summary {
                    println!("Sentiment: {}", summary.overall_sentiment);
                    println!("Notes: {}", summary.notes);
                    if !summary.clinician_recommendation.is_empty() {
                        println!("Recommendation: {}", summary.clinician_recommendation);
                    }
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["#", "Modality", "Transcript", "Chosen"]);

                for segment in &record.dialogue_segments {
                    table.add_row([
                        segment.segment_id.to_string(),
                        segment.modality.clone(),
                        truncate_string(&segment.transcript, 60),
                        segment.chosen_response.clone().unwrap_or_default(),
                    ]);
                }
                println!("{table}");

                for adjustment in &record.dynamic_adjustments {
                    println!(
                        "[{}] {}",
                        format_timestamp(&adjustment.at),
                        adjustment.note
                    );
                }
            }
        }

        Ok(())
    }
}
