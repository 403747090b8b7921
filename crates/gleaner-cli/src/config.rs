//! Configuration management for the CLI.

use crate::error::{CliError, Result};
use gleaner_dispatch::DispatchConfig;
use gleaner_domain::PromptConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Prompt sent with every image unless overridden.
pub const DEFAULT_EXAM_PROMPT: &str = "Extract all text from this exam question image. \
Include question numbers, question text, and all answer options (A, B, C, D, etc.). \
Preserve the exact formatting and structure.";

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Dispatcher settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Prompt settings
    #[serde(default)]
    pub prompt: PromptSettings,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,
}

/// Prompt settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Instruction text
    pub text: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Completion token cap
    pub max_tokens: u32,
}

/// Global CLI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,

    /// Default output format
    #[serde(default = "default_format")]
    pub format: OutputFormat,

    /// Image extensions picked up by `extract`
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Override for the chat-completions endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format
    Table,
    /// JSON format
    Json,
    /// Quiet (minimal) format
    Quiet,
}

impl Config {
    /// Get the default configuration file path.
    pub fn path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| CliError::Config("Could not find home directory".into()))?;
        Ok(home.join(".gleaner").join("config.toml"))
    }

    /// Load configuration from the default path, or defaults if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load configuration from `path`, or defaults if absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.dispatch.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CliError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Prompt configuration for providers.
    pub fn prompt_config(&self) -> PromptConfig {
        PromptConfig {
            prompt: self.prompt.text.clone(),
            temperature: self.prompt.temperature,
            max_tokens: self.prompt.max_tokens,
        }
    }
}

impl Default for PromptSettings {
    fn default() -> Self {
        let defaults = PromptConfig::default();
        Self {
            text: DEFAULT_EXAM_PROMPT.to_string(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            color: true,
            format: OutputFormat::Table,
            extensions: default_extensions(),
            endpoint: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_format() -> OutputFormat {
    OutputFormat::Table
}

fn default_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "webp", "gif"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.settings.color);
        assert_eq!(config.settings.format, OutputFormat::Table);
        assert_eq!(config.dispatch.max_rounds, 3);
        assert!(config.prompt.text.starts_with("Extract all text"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.settings.extensions.len(), 5);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.dispatch.max_rounds = 6;
        config.settings.format = OutputFormat::Json;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.dispatch.max_rounds, 6);
        assert_eq!(loaded.settings.format, OutputFormat::Json);
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[dispatch]\nconcurrency_limit = 2\n\n[prompt]\ntemperature = 0.0\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.dispatch.concurrency_limit, 2);
        assert_eq!(config.dispatch.max_rounds, 3);
        assert_eq!(config.prompt.temperature, 0.0);
        assert_eq!(config.prompt.max_tokens, 4000);
    }

    #[test]
    fn test_invalid_dispatch_section_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[dispatch]\nprovider_priority = []\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(CliError::Dispatch(_))));
    }
}
