//! Error types for Tether
//!
//! This module defines all error types used throughout the crate.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Failure Taxonomy
// ============================================================================

/// Actionable category of a backend failure.
///
/// Callers use the kind to pick a recovery policy (compact and retry on
/// `ContextOverflow`, back off on `RateLimit`, re-authenticate on `AuthError`).
/// Tether itself never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request exceeded the model's context window
    ContextOverflow,
    /// Rate limit or quota exhaustion
    RateLimit,
    /// Invalid, missing, or expired credentials
    AuthError,
    /// Unknown model or unavailable endpoint
    ModelNotFound,
    /// Anything that matched no known signature
    Unknown,
}

impl FailureKind {
    /// Stable snake_case identifier, identical to the serde form.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ContextOverflow => "context_overflow",
            FailureKind::RateLimit => "rate_limit",
            FailureKind::AuthError => "auth_error",
            FailureKind::ModelNotFound => "model_not_found",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error.
///
/// Each variant carries the original backend text so that callers can still
/// show the full message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Prompt too long for the model's context window
    ContextOverflow(String),
    /// 429: rate limit or quota exceeded
    RateLimit(String),
    /// 401/403: invalid API key or authentication failure
    Auth(String),
    /// 404: model not found or endpoint not available
    ModelNotFound(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::ContextOverflow(msg) => write!(f, "Context overflow: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// The taxonomy bucket of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::ContextOverflow(_) => FailureKind::ContextOverflow,
            ProviderError::RateLimit(_) => FailureKind::RateLimit,
            ProviderError::Auth(_) => FailureKind::AuthError,
            ProviderError::ModelNotFound(_) => FailureKind::ModelNotFound,
            ProviderError::Unknown(_) => FailureKind::Unknown,
        }
    }

    /// The raw backend message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            ProviderError::ContextOverflow(msg)
            | ProviderError::RateLimit(msg)
            | ProviderError::Auth(msg)
            | ProviderError::ModelNotFound(msg)
            | ProviderError::Unknown(msg) => msg,
        }
    }
}

impl From<ProviderError> for TetherError {
    fn from(err: ProviderError) -> Self {
        TetherError::Provider(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Tether operations.
#[derive(Error, Debug)]
pub enum TetherError {
    /// Configuration-related errors (invalid config, unknown provider, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structured provider error with taxonomy classification.
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Tool execution errors (invalid parameters, execution failures, etc.)
    #[error("Tool error: {0}")]
    Tool(String),

    /// A stored conversation could not be decoded
    #[error("Session error: {0}")]
    Session(String),

    /// A lane task panicked or its lane was torn down before it completed
    #[error("Lane error: {0}")]
    Lane(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Path escapes the workspace root
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

impl TetherError {
    /// Classify this error into the failure taxonomy.
    ///
    /// Typed provider errors keep their kind; everything else is classified
    /// from its rendered text.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            TetherError::Provider(err) => err.kind(),
            other => crate::providers::classify_error_message(&other.to_string()).kind(),
        }
    }
}

/// A specialized `Result` type for Tether operations.
pub type Result<T> = std::result::Result<T, TetherError>;
