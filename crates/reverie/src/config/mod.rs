use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, ReverieError};

/// Main configuration structure for Reverie
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Persistence locations (memory bank, session log, feedback)
    #[serde(default)]
    pub storage: StorageConfig,
    /// Memory bank semantics
    #[serde(default)]
    pub bank: BankConfig,
    /// Recall strength dynamics and retrieval
    #[serde(default)]
    pub recall: RecallConfig,
    /// Agent invocation service
    #[serde(default)]
    pub agent: AgentConfig,
    /// Session orchestration
    #[serde(default)]
    pub session: SessionConfig,
}

/// Persistence file configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all persisted data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Memory bank document file name
    #[serde(default = "default_bank_file")]
    pub memory_bank_file: String,
    /// Session log document file name
    #[serde(default = "default_session_log_file")]
    pub session_log_file: String,
    /// Pilot feedback document file name
    #[serde(default = "default_feedback_file")]
    pub feedback_file: String,
}

impl StorageConfig {
    /// Full path to the memory bank document
    pub fn bank_path(&self) -> PathBuf {
        self.data_dir.join(&self.memory_bank_file)
    }

    /// Full path to the session log document
    pub fn session_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.session_log_file)
    }

    /// Full path to the feedback document
    pub fn feedback_path(&self) -> PathBuf {
        self.data_dir.join(&self.feedback_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            memory_bank_file: default_bank_file(),
            session_log_file: default_session_log_file(),
            feedback_file: default_feedback_file(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".reverie"))
        .unwrap_or_else(|| PathBuf::from(".reverie"))
}

fn default_bank_file() -> String {
    "memory_bank.json".to_string()
}

fn default_session_log_file() -> String {
    "session_log.json".to_string()
}

fn default_feedback_file() -> String {
    "feedback.json".to_string()
}

/// Memory bank semantics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BankConfig {
    /// Treat connection (source, target) pairs as directed. When false,
    /// (a, b) and (b, a) identify the same connection.
    #[serde(default)]
    pub directed_connections: bool,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            directed_connections: false,
        }
    }
}

/// Recall strength dynamics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecallConfig {
    /// Strength added per successful recall, scaled by difficulty
    #[serde(default = "default_reinforce_step")]
    pub reinforce_step: f32,
    /// Strength removed per failed recall
    #[serde(default = "default_decay_step")]
    pub decay_step: f32,
    /// Decay never drives a memory below this floor, so every entity stays
    /// retrievable
    #[serde(default = "default_decay_floor")]
    pub decay_floor: f32,
    /// How many high-recall memories to surface at session start
    #[serde(default = "default_surface_count")]
    pub surface_count: usize,
    /// Default fuzzy search threshold (0-100 partial match score)
    #[serde(default = "default_search_threshold")]
    pub search_threshold: f32,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            reinforce_step: default_reinforce_step(),
            decay_step: default_decay_step(),
            decay_floor: default_decay_floor(),
            surface_count: default_surface_count(),
            search_threshold: default_search_threshold(),
        }
    }
}

fn default_reinforce_step() -> f32 {
    0.1
}

fn default_decay_step() -> f32 {
    0.15
}

fn default_decay_floor() -> f32 {
    0.1
}

fn default_surface_count() -> usize {
    2
}

fn default_search_threshold() -> f32 {
    80.0
}

/// Agent invocation service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the OpenAI-compatible chat completions API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout in seconds. A timed-out invocation fails the turn; it
    /// is never cancelled midway.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "REVERIE_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Session orchestration configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Candidate responses generated per turn. The first candidate is the
    /// canonical reply appended to the conversation history.
    #[serde(default = "default_candidate_count")]
    pub candidate_count: usize,
    /// Seed new sessions with the most recent prior session for the patient
    #[serde(default = "default_seed_prior_session")]
    pub seed_prior_session: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            candidate_count: default_candidate_count(),
            seed_prior_session: default_seed_prior_session(),
        }
    }
}

fn default_candidate_count() -> usize {
    1
}

fn default_seed_prior_session() -> bool {
    true
}

impl Config {
    /// Load configuration from an explicit path, or walk the default
    /// locations (`~/.reverie/config.toml`, the platform config dir,
    /// `./config.toml`), falling back to built-in defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Config> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::read_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".reverie").join("config.toml")),
            dirs::config_dir().map(|c| c.join("reverie").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::read_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn read_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReverieError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ReverieError::Config(format!("Failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.recall.reinforce_step, 0.1);
        assert_eq!(config.recall.decay_step, 0.15);
        assert_eq!(config.recall.decay_floor, 0.1);
        assert_eq!(config.recall.surface_count, 2);
        assert!(!config.bank.directed_connections);
        assert_eq!(config.session.candidate_count, 1);
        assert_eq!(config.storage.memory_bank_file, "memory_bank.json");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
            [recall]
            decay_step = 0.2

            [bank]
            directed_connections = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.recall.decay_step, 0.2);
        // Untouched fields keep their defaults
        assert_eq!(config.recall.reinforce_step, 0.1);
        assert!(config.bank.directed_connections);
        assert_eq!(config.agent.model, "gpt-4o-mini");
    }

    #[test]
    fn test_storage_paths() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/tmp/reverie-test"),
            ..StorageConfig::default()
        };
        assert_eq!(
            storage.bank_path(),
            PathBuf::from("/tmp/reverie-test/memory_bank.json")
        );
        assert_eq!(
            storage.session_log_path(),
            PathBuf::from("/tmp/reverie-test/session_log.json")
        );
    }
}
