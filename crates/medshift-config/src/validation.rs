// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths, positive intervals, and URL schemes.

use crate::diagnostic::ConfigError;
use crate::model::MedshiftConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &MedshiftConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if !matches!(
        config.service.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        fail(format!(
            "service.log_level `{}` is not one of trace, debug, info, warn, error",
            config.service.log_level
        ));
    }

    if config.pricing.base == 0 {
        fail("pricing.base must be at least 1 credit".to_string());
    }

    let p = &config.pricing;
    if !(p.normal <= p.high && p.high <= p.critical && p.critical <= p.emergency) {
        fail(format!(
            "pricing urgency surcharges must be non-decreasing \
             (normal={}, high={}, critical={}, emergency={})",
            p.normal, p.high, p.critical, p.emergency
        ));
    }

    let rt = &config.realtime;
    if let Some(url) = &rt.url
        && !(url.starts_with("ws://") || url.starts_with("wss://"))
    {
        fail(format!("realtime.url `{url}` must use the ws:// or wss:// scheme"));
    }

    if rt.heartbeat_interval_secs == 0 {
        fail("realtime.heartbeat_interval_secs must be greater than 0".to_string());
    }

    if rt.reconnect_base_delay_ms == 0 {
        fail("realtime.reconnect_base_delay_ms must be greater than 0".to_string());
    }

    if rt.reconnect_max_delay_ms < rt.reconnect_base_delay_ms {
        fail(format!(
            "realtime.reconnect_max_delay_ms ({}) must not be below reconnect_base_delay_ms ({})",
            rt.reconnect_max_delay_ms, rt.reconnect_base_delay_ms
        ));
    }

    if rt.presence_channel.trim().is_empty() {
        fail("realtime.presence_channel must not be empty".to_string());
    }

    if config.dispatch.expiry_sweep_interval_secs == 0 {
        fail("dispatch.expiry_sweep_interval_secs must be greater than 0".to_string());
    }

    if let Some(km) = config.dispatch.default_max_distance_km
        && (!km.is_finite() || km <= 0.0)
    {
        fail(format!(
            "dispatch.default_max_distance_km must be positive, got {km}"
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
