// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./medshift.toml` > `~/.config/medshift/medshift.toml`
//! > `/etc/medshift/medshift.toml` with environment variable overrides via the
//! `MEDSHIFT_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::MedshiftConfig;

/// Top-level tables, used to split `MEDSHIFT_*` variable names.
const SECTIONS: [&str; 5] = ["service", "storage", "pricing", "realtime", "dispatch"];

/// Config files consulted by [`load_config`], lowest precedence first.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/medshift/medshift.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("medshift").join("medshift.toml"));
    }
    paths.push(PathBuf::from("medshift.toml"));
    paths
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. Each of [`search_paths`] that exists
/// 3. `MEDSHIFT_*` environment variables
pub fn load_config() -> Result<MedshiftConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<MedshiftConfig, figment::Error> {
    defaults().merge(Toml::string(toml_content)).extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MedshiftConfig, figment::Error> {
    defaults()
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

fn defaults() -> Figment {
    Figment::from(Serialized::defaults(MedshiftConfig::default()))
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    search_paths()
        .into_iter()
        .fold(defaults(), |figment, path| figment.merge(Toml::file(path)))
        .merge(env_provider())
}

/// Map a lowercased variable name without prefix to its dotted key.
///
/// Only the section is split off, so `realtime_heartbeat_interval_secs`
/// becomes `realtime.heartbeat_interval_secs`.
fn env_key(name: &str) -> String {
    SECTIONS
        .iter()
        .find_map(|section| {
            name.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|field| format!("{section}.{field}"))
        })
        .unwrap_or_else(|| name.to_string())
}

/// Environment provider for `MEDSHIFT_<SECTION>_<KEY>` variables.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("MEDSHIFT_").map(|key| env_key(&key.as_str().to_ascii_lowercase()).into())
}
