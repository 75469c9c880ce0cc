pub mod memory;
pub mod migrate;
pub mod sessions;

pub use memory::MemoryCommand;
pub use migrate::MigrateCommand;
pub use sessions::SessionsCommand;
