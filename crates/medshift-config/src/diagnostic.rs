// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge with fuzzy match suggestions.
//!
//! Converts Figment deserialization errors into miette diagnostics with
//! source spans, valid key listings, and "did you mean?" suggestions using
//! Jaro-Winkler string similarity.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity score to suggest a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error with diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// An unknown key was found in the configuration.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(medshift::config::unknown_key),
        help("{}", format_unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A configuration value has the wrong type.
    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(medshift::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(medshift::config::missing_key),
        help("add `{key} = <value>` to your medshift.toml")
    )]
    MissingKey { key: String },

    /// A semantic validation error for a config value.
    #[error("validation error: {message}")]
    #[diagnostic(code(medshift::config::validation))]
    Validation { message: String },

    /// Catch-all for other configuration errors.
    #[error("configuration error: {0}")]
    #[diagnostic(code(medshift::config::other))]
    Other(String),
}

fn format_unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

fn dotted(path: &[String]) -> String {
    path.join(".")
}

/// Convert a `figment::Error` into a list of `ConfigError` diagnostics.
///
/// A figment error may carry several errors; each one is converted.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    let mut out = Vec::new();
    for error in err {
        let converted = match &error.kind {
            Kind::UnknownField(field, expected) => {
                let (span, src) = locate(&error, field, toml_sources);
                ConfigError::UnknownKey {
                    key: field.clone(),
                    suggestion: suggest_key(field, expected),
                    valid_keys: expected.join(", "),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => {
                let mut path = error.path.clone();
                path.push(field.to_string());
                ConfigError::MissingKey { key: dotted(&path) }
            }
            Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                key: dotted(&error.path),
                detail: format!("found {actual}"),
                expected: expected.to_string(),
            },
            _ => ConfigError::Other(error.to_string()),
        };
        out.push(converted);
    }
    out
}

/// Span and named source for `field`, when the error came from one of the
/// TOML files we read.
fn locate(
    error: &figment::error::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let from_file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|source| match source {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    // Inline strings carry no file source; a single inline entry is the only candidate.
    let entry = match from_file {
        Some(path) => toml_sources.iter().find(|(p, _)| *p == path),
        None if toml_sources.len() == 1 => toml_sources.first(),
        None => None,
    };
    let Some((name, content)) = entry else {
        return (None, None);
    };
    let table = match error.path.split_last() {
        Some((last, parent)) if last == field => parent,
        _ => error.path.as_slice(),
    };
    match find_key_offset(content, table, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` inside the table named by `path`.
///
/// An empty path means the top-level table, before the first header.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let wanted = dotted(path);
    let mut table = String::new();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        if let Some(header) = trimmed.strip_prefix('[') {
            table = header.split(']').next().unwrap_or_default().trim().to_string();
        } else if table == wanted
            && trimmed.split_once('=').map(|(key, _)| key.trim()) == Some(field)
        {
            return Some(offset + indent);
        }
        offset += line.len();
    }

    None
}

/// Closest valid key by Jaro-Winkler similarity, if any is close enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render diagnostics to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut rendered = String::new();
        match handler.render_report(&mut rendered, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{rendered}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_heartbeat_key_for_typo() {
        let valid = &["url", "api_key", "heartbeat_interval_secs", "max_reconnect_attempts"];
        assert_eq!(
            suggest_key("hearbeat_interval_secs", valid),
            Some("heartbeat_interval_secs".to_string())
        );
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        let valid = &["base", "high", "critical"];
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn find_key_offset_in_section() {
        let content = "[storage]\nwal_mode = true\n\n[pricing]\nbasee = 3\n";
        let path = vec!["pricing".to_string()];
        let o = find_key_offset(content, &path, "basee").expect("offset");
        assert_eq!(&content[o..o + 5], "basee");
    }

    #[test]
    fn find_key_offset_ignores_same_key_in_other_tables() {
        let content = "[realtime]\nurl = \"ws://a\"\n\n[dispatch]\nurl = 1\n";
        let path = vec!["dispatch".to_string()];
        let o = find_key_offset(content, &path, "url").expect("offset");
        assert_eq!(o, content.rfind("url").unwrap());
    }

    #[test]
    fn find_key_offset_top_level() {
        let content = "servce = 1\n[service]\nname = \"x\"\n";
        assert_eq!(find_key_offset(content, &[], "servce"), Some(0));
    }

    #[test]
    fn find_key_offset_missing_section() {
        let content = "[storage]\nwal_mode = true\n";
        let path = vec!["pricing".to_string()];
        assert!(find_key_offset(content, &path, "base").is_none());
    }
}
