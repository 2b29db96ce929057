//! Configuration management for Tether
//!
//! Configuration is loaded from `~/.tether/config.json` with environment
//! variable overrides. A missing file means defaults.

mod types;
pub mod validate;

pub use types::*;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TetherError};

impl Config {
    /// Returns the Tether configuration directory path (~/.tether)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tether")
    }

    /// Returns the path to the config file (~/.tether/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// Environment variables override config values using the pattern
    /// `TETHER_SECTION_KEY`.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                TetherError::Config(format!("Invalid config file {}: {}", path.display(), e))
            })?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Unparseable numbers are ignored.
    fn apply_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Agent defaults
        if let Some(val) = lookup("TETHER_AGENT_WORKSPACE") {
            self.agent.workspace = val;
        }
        if let Some(val) = lookup("TETHER_AGENT_PROVIDER") {
            self.agent.provider = val;
        }
        if let Some(val) = lookup("TETHER_AGENT_MODEL") {
            self.agent.model = val;
        }
        if let Some(v) = lookup("TETHER_AGENT_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.agent.max_tokens = v;
        }
        if let Some(v) = lookup("TETHER_AGENT_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.agent.temperature = v;
        }
        if let Some(v) = lookup("TETHER_AGENT_MAX_TOOL_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.agent.max_tool_iterations = v;
        }

        // Provider credentials
        if let Some(val) = lookup("TETHER_PROVIDERS_ANTHROPIC_API_KEY") {
            self.providers
                .anthropic
                .get_or_insert_with(ProviderConfig::default)
                .api_key = Some(val);
        }
        if let Some(val) = lookup("TETHER_PROVIDERS_ANTHROPIC_API_BASE") {
            self.providers
                .anthropic
                .get_or_insert_with(ProviderConfig::default)
                .api_base = Some(val);
        }
        if let Some(val) = lookup("TETHER_PROVIDERS_OPENAI_API_KEY") {
            self.providers
                .openai
                .get_or_insert_with(ProviderConfig::default)
                .api_key = Some(val);
        }
        if let Some(val) = lookup("TETHER_PROVIDERS_OPENAI_API_BASE") {
            self.providers
                .openai
                .get_or_insert_with(ProviderConfig::default)
                .api_base = Some(val);
        }

        // Logging
        if let Some(val) = lookup("TETHER_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the expanded workspace path (resolves ~ to home directory)
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.agent.workspace)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `TetherError::Config` listing every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.agent.max_tool_iterations == 0 {
            problems.push("agent.max_tool_iterations must be at least 1".to_string());
        }
        if self.agent.max_tokens == 0 {
            problems.push("agent.max_tokens must be at least 1".to_string());
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            problems.push(format!(
                "agent.temperature must be between 0 and 2, got {}",
                self.agent.temperature
            ));
        }
        if !SUPPORTED_PROVIDERS.contains(&self.agent.provider.as_str()) {
            problems.push(format!(
                "agent.provider '{}' is not one of: {}",
                self.agent.provider,
                SUPPORTED_PROVIDERS.join(", ")
            ));
        }
        if self.agent.model.trim().is_empty() {
            problems.push("agent.model must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TetherError::Config(problems.join("; ")))
        }
    }
}

/// Expand ~ to home directory in a path string
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return match rest.strip_prefix('/') {
                Some(tail) => home.join(tail),
                None if rest.is_empty() => home,
                None => PathBuf::from(path),
            };
        }
    }
    PathBuf::from(path)
}
