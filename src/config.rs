//! User configuration for the pipeline.
//!
//! `config.json` is optional; a missing file means built-in defaults. Values
//! resolve in priority order: CLI flag, environment, config file, default.
use crate::export::DEFAULT_EXPORT_FILE;
use crate::stage::Depth;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Current schema version for `config.json`.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Environment variable that overrides the configured key variable.
pub const API_KEY_ENV_VAR: &str = "CPIPE_API_KEY";
/// Environment variable selecting the command backend.
pub const LM_COMMAND_ENV_VAR: &str = "CPIPE_LM_COMMAND";
/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "CPIPE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub schema_version: u32,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_api_version")]
    pub anthropic_version: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// When set, run this command instead of calling the HTTP endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm_command: Option<String>,
    #[serde(default)]
    pub default_depth: Depth,
    #[serde(default = "default_export_file")]
    pub export_file: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_export_file() -> String {
    DEFAULT_EXPORT_FILE.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            anthropic_version: default_api_version(),
            api_key_env: default_api_key_env(),
            lm_command: None,
            default_depth: Depth::default(),
            export_file: default_export_file(),
        }
    }
}

/// Resolve the config path: explicit flag, then `CPIPE_CONFIG`, then the
/// platform config directory.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env::var_os(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("cpipe").join("config.json"))
}

/// Load and validate the config at `path`, or defaults when it does not exist.
///
/// An explicitly named file must exist.
pub fn load_config(path: Option<&Path>, explicit: bool) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    if !path.is_file() {
        if explicit {
            return Err(anyhow!("config not found at {}", path.display()));
        }
        return Ok(PipelineConfig::default());
    }
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: PipelineConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Locate and load the effective config. A path named by flag or
/// `CPIPE_CONFIG` must exist; the platform default may be absent.
pub fn resolve_config(explicit: Option<&Path>) -> Result<(Option<PathBuf>, PipelineConfig)> {
    let named = explicit.is_some() || env::var_os(CONFIG_ENV_VAR).is_some_and(|v| !v.is_empty());
    let path = config_path(explicit);
    let config = load_config(path.as_deref(), named)?;
    Ok((path, config))
}

/// Persist a config in a stable JSON format.
pub fn write_config(path: &Path, config: &PipelineConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(config).context("serialize config")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {} (expected {})",
            config.schema_version,
            CONFIG_SCHEMA_VERSION
        ));
    }
    if config.endpoint.trim().is_empty() {
        return Err(anyhow!("config endpoint must not be empty"));
    }
    if config.model.trim().is_empty() {
        return Err(anyhow!("config model must not be empty"));
    }
    if config.max_tokens == 0 {
        return Err(anyhow!("config max_tokens must be positive"));
    }
    if config.export_file.trim().is_empty() {
        return Err(anyhow!("config export_file must not be empty"));
    }
    if config
        .lm_command
        .as_deref()
        .is_some_and(|command| command.trim().is_empty())
    {
        return Err(anyhow!("config lm_command must not be empty when set"));
    }
    Ok(())
}

/// Resolve the LM command: explicit flag > `CPIPE_LM_COMMAND` > config.
pub fn resolve_lm_command(explicit: Option<&str>, config: &PipelineConfig) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| env::var(LM_COMMAND_ENV_VAR).ok())
        .filter(|command| !command.trim().is_empty())
        .or_else(|| config.lm_command.clone())
}

/// Resolve the API key: `CPIPE_API_KEY`, then the configured variable.
pub fn resolve_api_key(config: &PipelineConfig) -> Option<String> {
    [API_KEY_ENV_VAR, config.api_key_env.as_str()]
        .into_iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
