//! Configuration types for Tether
//!
//! Every section uses `#[serde(default)]`, so a partial `config.json` only
//! needs the fields it wants to change.

use serde::{Deserialize, Serialize};

/// Main configuration struct for Tether
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Defaults for the tool-calling loop
    pub agent: AgentDefaults,
    /// LLM provider credentials
    pub providers: ProvidersConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent
// ============================================================================

/// Default agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Workspace directory path handed to tools
    pub workspace: String,
    /// Default provider name ("anthropic" or "openai")
    pub provider: String,
    /// Default model to use
    pub model: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum model calls per run
    pub max_tool_iterations: u32,
    /// System instructions prepended to every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Default iteration cap for one run.
pub const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 25;

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: ".".to_string(),
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            system_prompt: None,
        }
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Provider names this build can dispatch to.
pub const SUPPORTED_PROVIDERS: &[&str] = &["anthropic", "openai"];

/// LLM provider configurations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Anthropic Claude configuration
    pub anthropic: Option<ProviderConfig>,
    /// OpenAI (or OpenAI-compatible) configuration
    pub openai: Option<ProviderConfig>,
}

impl ProvidersConfig {
    /// Look up a provider section by name.
    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "anthropic" => self.anthropic.as_ref(),
            "openai" => self.openai.as_ref(),
            _ => None,
        }
    }
}

/// Generic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,
    /// Custom API base URL
    #[serde(default)]
    pub api_base: Option<String>,
    /// Default model for this provider when the agent model belongs to another
    #[serde(default)]
    pub model: Option<String>,
}

impl ProviderConfig {
    /// The API key, if present and non-empty.
    pub fn key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output
    Pretty,
    /// Compact single-line output, grep-friendly
    #[default]
    Component,
    /// JSON lines for log aggregators
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter directive; `RUST_LOG` wins when set
    pub level: String,
    /// Append logs to this file instead of stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            file: None,
        }
    }
}
