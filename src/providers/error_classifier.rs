//! Pattern-based error classification for LLM provider errors.
//!
//! Checks patterns in priority order: context_overflow > rate_limit > auth >
//! model_not_found. Falls back to `Unknown` if no pattern matches.

use crate::error::ProviderError;

/// Classify an error message string into a `ProviderError`.
///
/// Matching is case-insensitive. The original text is kept verbatim.
///
/// # Example
/// ```
/// use tether::providers::classify_error_message;
/// use tether::error::FailureKind;
///
/// let err = classify_error_message("error: rate_limit exceeded");
/// assert_eq!(err.kind(), FailureKind::RateLimit);
/// ```
pub fn classify_error_message(msg: &str) -> ProviderError {
    let lower = msg.to_lowercase();

    // Context overflow first: some backends report it with a 429-ish wording
    if contains_any(
        &lower,
        &[
            "context_length_exceeded",
            "context length",
            "context window",
            "maximum context",
            "prompt is too long",
            "prompt too long",
            "too many tokens",
            "input is too long",
            "request too large",
            "413",
        ],
    ) {
        return ProviderError::ContextOverflow(msg.to_string());
    }

    // Rate limit
    if contains_any(
        &lower,
        &[
            "rate_limit",
            "rate limit",
            "too many requests",
            "429",
            "exceeded your current quota",
            "resource has been exhausted",
            "resource_exhausted",
            "quota exceeded",
            "usage limit",
            "overloaded",
        ],
    ) {
        return ProviderError::RateLimit(msg.to_string());
    }

    // Auth
    if contains_any(
        &lower,
        &[
            "invalid_api_key",
            "invalid api key",
            "incorrect api key",
            "invalid x-api-key",
            "invalid token",
            "authentication",
            "unauthorized",
            "forbidden",
            "permission_error",
            "access denied",
            "token has expired",
            "401",
            "403",
            "no api key",
        ],
    ) {
        return ProviderError::Auth(msg.to_string());
    }

    // Model not found
    if contains_any(
        &lower,
        &[
            "model_not_found",
            "model not found",
            "not_found_error",
            "does not exist",
            "unknown model",
            "no such model",
            "404",
        ],
    ) {
        return ProviderError::ModelNotFound(msg.to_string());
    }

    ProviderError::Unknown(msg.to_string())
}

fn contains_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}
