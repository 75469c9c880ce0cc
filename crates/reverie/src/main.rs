//! Reverie - interactive reminiscence therapy sessions from the terminal

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reverie::agent::flows::FALLBACK_MESSAGE;
use reverie::agent::RemoteAgent;
use reverie::bank::{EntityStore, SharedBank};
use reverie::config::Config;
use reverie::error::Result;
use reverie::session::{FeedbackLog, SessionError, SessionLog, SessionManager, Turn};
use reverie::ReverieError;

/// Reverie - structured reminiscence memory and therapy sessions
#[derive(Parser)]
#[command(name = "reverie")]
#[command(about = "Structured reminiscence memory and therapy sessions")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an interactive therapy session
    Session {
        /// Patient identifier
        #[arg(long, default_value = "patient_1")]
        patient: String,
        /// Opening prompt; read from the terminal when omitted
        #[arg(long)]
        prompt: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Session { patient, prompt } => session(cli.config, &patient, prompt).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,reverie=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn session(config_path: Option<PathBuf>, patient: &str, prompt: Option<String>) -> Result<()> {
    let config = Config::load(config_path.as_deref())?;
    tracing::debug!("Config loaded: {:?}", config);

    std::fs::create_dir_all(&config.storage.data_dir)?;
    tracing::info!("Using data directory: {}", config.storage.data_dir.display());

    let store = EntityStore::new(config.storage.bank_path());
    let bank = SharedBank::open(store, &config.bank, config.recall.clone())?;
    let log = Arc::new(SessionLog::new(config.storage.session_log_path()));
    let feedback = Arc::new(FeedbackLog::new(config.storage.feedback_path()));
    let invoker = Arc::new(RemoteAgent::new(&config.agent)?);

    let manager = SessionManager::new(bank, log, feedback, invoker, config.session.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let prompt = match prompt {
        Some(prompt) => prompt,
        None => {
            println!("How are you feeling today?");
            match lines.next_line().await? {
                Some(line) if !line.trim().is_empty() => line,
                _ => return Ok(()),
            }
        }
    };

    let (session_id, mut turn) = match manager.start_session(patient, &prompt).await {
        Ok(started) => started,
        Err(e) => return handle_interruption(e),
    };
    tracing::info!(%session_id, "session started");

    loop {
        match turn {
            Turn::Reply { ref text, .. } => {
                println!("\n{text}\n");
            }
            Turn::Completed(outcome) => {
                println!("\nThank you for today's session.");
                if let Some(summary) = &outcome.record.session_summary {
                    println!("Session notes: {}", summary.notes);
                }
                if !outcome.record.mood.is_empty() {
                    println!("Mood: {}", outcome.record.mood.join(", "));
                }
                if !outcome.merge_report.is_empty() {
                    println!(
                        "Remembered {} new memories and {} new connections.",
                        outcome.merge_report.entities_added,
                        outcome.merge_report.connections_added
                    );
                }
                return Ok(());
            }
        }

        let Some(line) = lines.next_line().await? else {
            // Input closed mid-session; close degraded so the partial
            // record is still logged.
            manager.abandon(session_id.as_str(), "input stream closed").await?;
            println!("{FALLBACK_MESSAGE}");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        turn = match manager.resume(session_id.as_str(), &line).await {
            Ok(turn) => turn,
            Err(e) => return handle_interruption(e),
        };
    }
}

/// A failed turn shows the empathetic fallback line, never the raw error;
/// the session was already closed and logged by the orchestrator.
fn handle_interruption(error: ReverieError) -> Result<()> {
    match error {
        ReverieError::Session(SessionError::FlowInterrupted { session_id, reason }) => {
            tracing::warn!(%session_id, %reason, "session interrupted");
            println!("{FALLBACK_MESSAGE}");
            Ok(())
        }
        other => Err(other),
    }
}
