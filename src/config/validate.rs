//! Config file validation with unknown field detection.
//!
//! Serde silently ignores unknown keys, so a typo such as `max_tool_iteration`
//! would quietly fall back to the default. `validate_config` walks the raw
//! JSON and reports such keys with a "did you mean" hint.

use std::collections::HashSet;

use serde_json::Value;

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["agent", "providers", "logging"];

const KNOWN_AGENT: &[&str] = &[
    "workspace",
    "provider",
    "model",
    "max_tokens",
    "temperature",
    "max_tool_iterations",
    "system_prompt",
];

const KNOWN_PROVIDERS: &[&str] = &["anthropic", "openai"];

const KNOWN_PROVIDER: &[&str] = &["api_key", "api_base", "model"];

const KNOWN_LOGGING: &[&str] = &["format", "level", "file"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        prev = row;
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn check_keys(
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut found_unknown = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        found_unknown = true;
        let message = match suggest_field(key, known) {
            Some(hint) => format!("Unknown field '{}', {}", key, hint),
            None => format!("Unknown field '{}'", key),
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path,
            message,
        });
    }
    found_unknown
}

/// Validate a raw JSON config value against known field names and ranges.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(obj) = raw.as_object() else {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path: String::new(),
            message: "Config must be a JSON object".to_string(),
        });
        return diagnostics;
    };

    diagnostics.push(Diagnostic {
        level: DiagnosticLevel::Ok,
        path: String::new(),
        message: "Valid JSON".to_string(),
    });

    let mut has_unknown = check_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);

    if let Some(agent) = obj.get("agent").and_then(|v| v.as_object()) {
        has_unknown |= check_keys(agent, KNOWN_AGENT, "agent", &mut diagnostics);
    }
    if let Some(providers) = obj.get("providers").and_then(|v| v.as_object()) {
        has_unknown |= check_keys(providers, KNOWN_PROVIDERS, "providers", &mut diagnostics);
        for (name, section) in providers {
            if let Some(section) = section.as_object() {
                let prefix = format!("providers.{}", name);
                has_unknown |= check_keys(section, KNOWN_PROVIDER, &prefix, &mut diagnostics);
            }
        }
    }
    if let Some(logging) = obj.get("logging").and_then(|v| v.as_object()) {
        has_unknown |= check_keys(logging, KNOWN_LOGGING, "logging", &mut diagnostics);
    }

    if !has_unknown {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Ok,
            path: String::new(),
            message: "All fields recognized".to_string(),
        });
    }

    // Plaintext keys in a file are easy to leak through backups and dotfile repos.
    if let Some(providers) = obj.get("providers").and_then(|v| v.as_object()) {
        for (name, section) in providers {
            if section.get("api_key").and_then(|v| v.as_str()).is_some() {
                diagnostics.push(Diagnostic {
                    level: DiagnosticLevel::Warn,
                    path: format!("providers.{}.api_key", name),
                    message: format!(
                        "API key stored in config file; consider TETHER_PROVIDERS_{}_API_KEY",
                        name.to_uppercase()
                    ),
                });
            }
        }
    }

    match serde_json::from_value::<Config>(raw.clone()) {
        Ok(config) => {
            if let Err(e) = config.validate() {
                diagnostics.push(Diagnostic {
                    level: DiagnosticLevel::Error,
                    path: String::new(),
                    message: e.to_string(),
                });
            }
        }
        Err(e) => diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path: String::new(),
            message: format!("Config does not match the expected shape: {}", e),
        }),
    }

    diagnostics
}
