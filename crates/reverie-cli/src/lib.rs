pub mod commands;
pub mod error;
pub mod output;

pub use commands::{MemoryCommand, MigrateCommand, SessionsCommand};
pub use error::{CliError, CliResult};
pub use output::{format_timestamp, truncate_string, OutputFormat};
