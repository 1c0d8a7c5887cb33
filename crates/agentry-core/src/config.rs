//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables (`AGENTRY_*`)
//! 2. `agentry.toml` configuration file
//! 3. Default values
//!
//! `${VAR_NAME}` inside the configuration file is expanded from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::Error;

const DEFAULT_CONFIG_FILE: &str = "agentry.toml";

/// Model settings shared by every agent unless a definition overrides them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Timeouts and retry policy around individual model and tool calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    pub tool_timeout_secs: u64,
    pub model_timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 60,
            model_timeout_secs: 120,
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl ExecutionConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

/// Chain bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainConfig {
    /// Hours a terminal chain stays cached before cleanup evicts it
    pub retention_hours: u64,

    /// Path to the SQLite run database
    pub db_path: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            retention_hours: 24,
            db_path: default_db_path(),
        }
    }
}

/// Expert team behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpertConfig {
    /// Gather opinions concurrently
    pub parallel: bool,

    /// Default number of debate rounds
    pub debate_rounds: usize,
}

impl Default for ExpertConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            debate_rounds: 3,
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_db_path() -> String {
    "data/agentry.db".to_string()
}

/// Main configuration for the orchestration engine
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub experts: ExpertConfig,
}

impl Config {
    /// Replace `${VAR_NAME}` with the value of the environment variable.
    /// Unset variables expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Parse a TOML document (after environment expansion)
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        let toml: TomlConfig = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        Ok(Self::from_toml_config(toml))
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&content)?;
        cfg.apply_env_overrides();

        Ok(cfg)
    }

    /// Load configuration from the default location
    ///
    /// Reads `.env` first, then `./agentry.toml` if present, otherwise
    /// environment variables over defaults.
    pub fn load() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Ok(Self::from_env())
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let llm = toml.llm.unwrap_or_default();
        let execution = toml.execution.unwrap_or_default();
        let chain = toml.chain.unwrap_or_default();
        let experts = toml.experts.unwrap_or_default();

        let exec_defaults = ExecutionConfig::default();
        let chain_defaults = ChainConfig::default();
        let expert_defaults = ExpertConfig::default();

        Config {
            llm: LlmConfig {
                model: llm.model.unwrap_or_else(default_model),
                temperature: llm.temperature.unwrap_or_else(default_temperature),
                max_tokens: llm.max_tokens.unwrap_or_else(default_max_tokens),
            },
            execution: ExecutionConfig {
                tool_timeout_secs: execution
                    .tool_timeout_secs
                    .unwrap_or(exec_defaults.tool_timeout_secs),
                model_timeout_secs: execution
                    .model_timeout_secs
                    .unwrap_or(exec_defaults.model_timeout_secs),
                max_retries: execution.max_retries.unwrap_or(exec_defaults.max_retries),
                initial_backoff_ms: execution
                    .initial_backoff_ms
                    .unwrap_or(exec_defaults.initial_backoff_ms),
                max_backoff_ms: execution
                    .max_backoff_ms
                    .unwrap_or(exec_defaults.max_backoff_ms),
            },
            chain: ChainConfig {
                retention_hours: chain
                    .retention_hours
                    .unwrap_or(chain_defaults.retention_hours),
                db_path: chain.db_path.unwrap_or(chain_defaults.db_path),
            },
            experts: ExpertConfig {
                parallel: experts.parallel.unwrap_or(expert_defaults.parallel),
                debate_rounds: experts
                    .debate_rounds
                    .unwrap_or(expert_defaults.debate_rounds),
            },
        }
    }

    /// Environment variables win over file values
    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("AGENTRY_MODEL") {
            if !model.is_empty() {
                self.llm.model = model;
            }
        }
        if let Some(t) = env_parse("AGENTRY_TEMPERATURE") {
            self.llm.temperature = t;
        }
        if let Some(n) = env_parse("AGENTRY_MAX_TOKENS") {
            self.llm.max_tokens = n;
        }

        if let Some(secs) = env_parse("AGENTRY_TOOL_TIMEOUT_SECS") {
            self.execution.tool_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("AGENTRY_MODEL_TIMEOUT_SECS") {
            self.execution.model_timeout_secs = secs;
        }
        if let Some(n) = env_parse("AGENTRY_MAX_RETRIES") {
            self.execution.max_retries = n;
        }

        if let Some(hours) = env_parse("AGENTRY_CHAIN_RETENTION_HOURS") {
            self.chain.retention_hours = hours;
        }
        if let Ok(path) = std::env::var("AGENTRY_DB_PATH") {
            if !path.is_empty() {
                self.chain.db_path = path;
            }
        }

        if let Ok(parallel) = std::env::var("AGENTRY_EXPERTS_PARALLEL") {
            self.experts.parallel = parallel.to_lowercase() != "false";
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

// ============================================================================
// TOML file structures
// ============================================================================

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    llm: Option<TomlLlmConfig>,
    execution: Option<TomlExecutionConfig>,
    chain: Option<TomlChainConfig>,
    experts: Option<TomlExpertConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlLlmConfig {
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlExecutionConfig {
    tool_timeout_secs: Option<u64>,
    model_timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlChainConfig {
    retention_hours: Option<u64>,
    db_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlExpertConfig {
    parallel: Option<bool>,
    debate_rounds: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.execution.tool_timeout_secs, 60);
        assert_eq!(config.chain.retention_hours, 24);
        assert_eq!(config.chain.db_path, "data/agentry.db");
        assert!(config.experts.parallel);
        assert_eq!(config.experts.debate_rounds, 3);
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("AGENTRY_TEST_EXPAND_VAR", "expanded");
        }

        let result = Config::expand_env_vars("prefix_${AGENTRY_TEST_EXPAND_VAR}_suffix");
        assert_eq!(result, "prefix_expanded_suffix");

        let result = Config::expand_env_vars("prefix_${AGENTRY_NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("AGENTRY_TEST_EXPAND_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        assert_eq!(Config::expand_env_vars("no_vars_here"), "no_vars_here");
        assert_eq!(Config::expand_env_vars("$plain"), "$plain");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_content = r#"
[llm]
model = "test-model"
temperature = 0.2

[execution]
tool_timeout_secs = 5
max_retries = 0

[chain]
retention_hours = 1
db_path = "/tmp/runs.db"

[experts]
parallel = false
debate_rounds = 5
"#;

        let config = Config::from_toml_str(toml_content).unwrap();

        assert_eq!(config.llm.model, "test-model");
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.execution.tool_timeout_secs, 5);
        assert_eq!(config.execution.model_timeout_secs, 120);
        assert_eq!(config.execution.max_retries, 0);
        assert_eq!(config.chain.retention_hours, 1);
        assert_eq!(config.chain.db_path, "/tmp/runs.db");
        assert!(!config.experts.parallel);
        assert_eq!(config.experts.debate_rounds, 5);
    }

    #[test]
    fn test_toml_file_missing_sections_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentry.toml");
        std::fs::write(&path, "[llm]\nmodel = \"m\"\n").unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.chain, ChainConfig::default());
        assert_eq!(config.experts, ExpertConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml_str("[llm\nmodel=").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
