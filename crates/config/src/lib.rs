//! Configuration loading, validation, and management for StepVault.
//!
//! Loads configuration from `~/.stepvault/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.stepvault/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default reasoning provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Execution engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Checkpoint store settings
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// System prompt settings
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Tool catalog settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("engine", &self.engine)
            .field("checkpoint", &self.checkpoint)
            .field("gateway", &self.gateway)
            .field("prompt", &self.prompt)
            .field("tools", &self.tools)
            .field("providers", &self.providers)
            .finish()
    }
}

/// What a second request for a busy session does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicyKind {
    /// Fail immediately with "session busy"
    Reject,
    /// Wait for the running executor, up to `queue_timeout_secs`
    Queue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Planning calls allowed per task
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per-invocation tool deadline
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    #[serde(default = "default_busy_policy")]
    pub busy_policy: BusyPolicyKind,

    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: u64,

    /// Name of the reserved tool that suspends for a human answer
    #[serde(default = "default_human_tool_name")]
    pub human_tool_name: String,

    /// Capacity of each run's event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_busy_policy() -> BusyPolicyKind {
    BusyPolicyKind::Reject
}
fn default_queue_timeout_secs() -> u64 {
    30
}
fn default_human_tool_name() -> String {
    "human_assistance".into()
}
fn default_event_buffer() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            busy_policy: default_busy_policy(),
            queue_timeout_secs: default_queue_timeout_secs(),
            human_tool_name: default_human_tool_name(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    Memory,
    File,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_backend")]
    pub backend: CheckpointBackend,

    /// Database file or directory; defaults under the config dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_checkpoint_backend() -> CheckpointBackend {
    CheckpointBackend::Sqlite
}

impl CheckpointConfig {
    /// Where the configured backend keeps its data.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        match self.backend {
            CheckpointBackend::File => AppConfig::config_dir().join("checkpoints"),
            _ => AppConfig::config_dir().join("checkpoints.db"),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: default_checkpoint_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8001
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".into(),
        "http://localhost:5173".into(),
    ]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Replaces the built-in system prompt preamble
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Register the Tavily-backed `web_search` tool
    #[serde(default = "default_true")]
    pub web_search: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tavily_api_key: Option<String>,

    #[serde(default = "default_web_search_max_results")]
    pub web_search_max_results: u32,

    /// REST endpoints exposed as tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpToolConfig>,
}

fn default_web_search_max_results() -> u32 {
    2
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("web_search", &self.web_search)
            .field("tavily_api_key", &redact(&self.tavily_api_key))
            .field("web_search_max_results", &self.web_search_max_results)
            .field("http", &self.http)
            .finish()
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            web_search: true,
            tavily_api_key: None,
            web_search_max_results: default_web_search_max_results(),
            http: Vec::new(),
        }
    }
}

/// One `[[tools.http]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpToolConfig {
    pub name: String,
    pub description: String,

    #[serde(default = "default_http_method")]
    pub method: String,

    pub url: String,

    /// JSON Schema for the arguments
    #[serde(default = "default_http_parameters")]
    pub parameters: serde_json::Value,
}

fn default_http_method() -> String {
    "GET".into()
}
fn default_http_parameters() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepvault/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `STEPVAULT_API_KEY` (highest priority)
    /// - `GOOGLE_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("STEPVAULT_API_KEY")
                .ok()
                .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if self.tools.tavily_api_key.is_none() {
            self.tools.tavily_api_key = std::env::var("TAVILY_API_KEY").ok();
        }

        if let Ok(provider) = std::env::var("STEPVAULT_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("STEPVAULT_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepvault")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.engine.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_iterations must be at least 1".into(),
            ));
        }

        if self.engine.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.tool_timeout_secs must be at least 1".into(),
            ));
        }

        if self.engine.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "engine.event_buffer must be at least 1".into(),
            ));
        }

        if self.engine.human_tool_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "engine.human_tool_name must not be empty".into(),
            ));
        }

        for tool in &self.tools.http {
            if tool.name == self.engine.human_tool_name {
                return Err(ConfigError::ValidationError(format!(
                    "tools.http '{}' collides with the human assistance tool",
                    tool.name
                )));
            }
            if !tool.url.starts_with("http://") && !tool.url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "tools.http '{}' has a non-HTTP url: {}",
                    tool.name, tool.url
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            engine: EngineConfig::default(),
            checkpoint: CheckpointConfig::default(),
            gateway: GatewayConfig::default(),
            prompt: PromptConfig::default(),
            tools: ToolsConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
