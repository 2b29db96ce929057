//! Providers module - LLM backends (Anthropic, OpenAI)
//!
//! This module defines the `LLMProvider` trait the tool-calling loop drives,
//! the normalized stream events it consumes, and the two dialect adapters.
//! Wire formats never leak past this module: adapters translate messages on
//! the way out and decode SSE payloads into [`StreamEvent`]s on the way in.
//!
//! # Example
//!
//! ```rust
//! use tether::config::{Config, ProviderConfig};
//! use tether::providers::build_providers;
//!
//! let mut config = Config::default();
//! config.providers.openai = Some(ProviderConfig {
//!     api_key: Some("sk-test".into()),
//!     ..Default::default()
//! });
//!
//! let providers = build_providers(&config);
//! assert_eq!(providers.names(), vec!["openai"]);
//! ```

pub mod claude;
mod error_classifier;
pub mod openai;
mod sse;
mod types;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::ProviderError;

pub use claude::ClaudeProvider;
pub use error_classifier::classify_error_message;
pub use openai::OpenAIProvider;
pub use types::{
    ChatOptions, EventStream, LLMProvider, StopReason, StreamEvent, ToolDefinition, Usage,
};

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
///
/// Status codes with an unambiguous meaning win; anything else falls back to
/// matching the body text.
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        413 => ProviderError::ContextOverflow(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        _ => classify_error_message(&format!("HTTP {}: {}", status, body)),
    }
}

// ============================================================================
// Provider Registry
// ============================================================================

/// Named set of ready-to-use providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &str, provider: Arc<dyn LLMProvider>) {
        debug!(provider = name, model = provider.default_model(), "Registering provider");
        self.providers.insert(name.to_string(), provider);
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn LLMProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Build an adapter for every provider section that has an API key.
///
/// The agent's default model becomes the adapter default for the default
/// provider; other providers use their section's `model` or their built-in
/// default.
pub fn build_providers(config: &Config) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    let default_model_for = |name: &str| -> Option<String> {
        config
            .providers
            .get(name)
            .and_then(|p| p.model.clone())
            .or_else(|| (config.agent.provider == name).then(|| config.agent.model.clone()))
    };

    if let Some(section) = config.providers.anthropic.as_ref() {
        if let Some(key) = section.key() {
            let mut provider = ClaudeProvider::new(key);
            if let Some(base) = section.api_base.as_deref() {
                provider = provider.with_api_base(base);
            }
            if let Some(model) = default_model_for("anthropic") {
                provider = provider.with_default_model(&model);
            }
            registry.register("anthropic", Arc::new(provider));
        }
    }

    if let Some(section) = config.providers.openai.as_ref() {
        if let Some(key) = section.key() {
            let mut provider = match section.api_base.as_deref() {
                Some(base) => OpenAIProvider::with_base_url(key, base),
                None => OpenAIProvider::new(key),
            };
            if let Some(model) = default_model_for("openai") {
                provider = provider.with_default_model(&model);
            }
            registry.register("openai", Arc::new(provider));
        }
    }

    info!(providers = ?registry.names(), "Providers configured");
    registry
}
