//! Application configuration for Draftsmith.
//!
//! User config lives at `~/.draftsmith/draftsmith.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DraftsmithError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "draftsmith.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".draftsmith";

// ---------------------------------------------------------------------------
// Config structs (matching draftsmith.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP transport settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Generative-text provider settings.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Knowledge source settings.
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Timeout and retry policy for every external call.
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    5000
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL database file. A leading `~` is expanded.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Resolve `db_path`, expanding a leading `~` to the home directory.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        expand_home(&self.db_path)
    }
}

fn default_db_path() -> String {
    "~/.draftsmith/draftsmith.db".into()
}

/// `[generator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for every generation call.
    #[serde(default = "default_model")]
    pub model: String,

    /// Provider base URL.
    #[serde(default = "default_generator_url")]
    pub base_url: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_generator_url(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_generator_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}

/// `[knowledge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Reference index base URL (search + summary endpoints hang off it).
    #[serde(default = "default_knowledge_url")]
    pub base_url: String,

    /// Number of candidate titles requested from search.
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,

    /// Maximum number of related topics fetched after the main topic.
    #[serde(default = "default_related_limit")]
    pub related_limit: usize,

    /// User-Agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_knowledge_url(),
            search_limit: default_search_limit(),
            related_limit: default_related_limit(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_knowledge_url() -> String {
    "https://en.wikipedia.org".into()
}
fn default_search_limit() -> u32 {
    5
}
fn default_related_limit() -> usize {
    3
}
fn default_user_agent() -> String {
    concat!("Draftsmith/", env!("CARGO_PKG_VERSION")).into()
}

/// `[resilience]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Upper bound on a single external call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after a transient failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between attempts.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    1
}
fn default_retry_backoff() -> u64 {
    250
}

// ---------------------------------------------------------------------------
// Call policy (runtime, derived from [resilience])
// ---------------------------------------------------------------------------

/// Runtime timeout/retry policy applied to each external call.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for CallPolicy {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.draftsmith/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DraftsmithError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.draftsmith/draftsmith.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DraftsmithError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        DraftsmithError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DraftsmithError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DraftsmithError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DraftsmithError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the generator API key from the env var named in the config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.generator.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(DraftsmithError::config(format!(
            "generator API key not found. Set the {var_name} environment variable."
        ))),
    }
}

fn expand_home(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| DraftsmithError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}
