use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reverie::bank::EntityStore;
use reverie::config::Config;
use reverie::recall::RecallEngine;
use reverie::session::SessionLog;
use reverie_cli::commands::{MemoryCommand, MigrateCommand, SessionsCommand};
use reverie_cli::error::CliResult;
use reverie_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "reverie-cli")]
#[command(about = "Reverie CLI - inspect the memory bank and session log")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Memory bank commands")]
    Memory(MemoryCommand),

    #[clap(about = "Session log commands")]
    Sessions(SessionsCommand),

    #[clap(about = "Migrate a legacy nodes/links document")]
    Migrate(MigrateCommand),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir.clone() {
        config.storage.data_dir = data_dir;
    }

    let store = EntityStore::new(config.storage.bank_path());

    match &cli.command {
        Command::Memory(cmd) => {
            let bank = store.load()?;
            let engine = RecallEngine::new(config.recall.clone());
            cmd.execute(&bank, &engine, format)
        }
        Command::Sessions(cmd) => {
            let log = SessionLog::new(config.storage.session_log_path());
            cmd.execute(&log, format)
        }
        Command::Migrate(cmd) => cmd.execute(&store, format),
    }
}
