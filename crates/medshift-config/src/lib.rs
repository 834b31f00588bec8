// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for Medshift.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, environment variable overrides, and diagnostic
//! error rendering with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use medshift_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("Database: {}", config.storage.database_path);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str, search_paths};
pub use model::MedshiftConfig;

use std::path::Path;

/// Validate an extracted config, or turn the extraction error into
/// diagnostics spanned against `sources`.
fn finish(
    extracted: Result<MedshiftConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<MedshiftConfig, Vec<ConfigError>> {
    let config = extracted.map_err(|err| diagnostic::figment_to_config_errors(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Load configuration from the XDG hierarchy and validate it.
pub fn load_and_validate() -> Result<MedshiftConfig, Vec<ConfigError>> {
    finish(loader::load_config(), || {
        loader::search_paths()
            .iter()
            .rev()
            .filter_map(|path| read_source(path))
            .collect()
    })
}

/// Load configuration from an explicit file and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<MedshiftConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<MedshiftConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

/// File name and content, keyed the way figment reports file sources.
fn read_source(path: &Path) -> Option<(String, String)> {
    let content = std::fs::read_to_string(path).ok()?;
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    Some((absolute.display().to_string(), content))
}
