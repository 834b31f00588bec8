// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Medshift configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MedshiftConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credit pricing table.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Realtime channel bridge and connection resilience.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Request intake and lifecycle settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs and presence payloads.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "medshift".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("medshift").join("medshift.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "medshift.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Credit pricing table for urgent requests.
///
/// Defaults form the stable pricing contract: base 10; urgency surcharges
/// normal 0, high 5, critical 10, emergency 20; priority boost 15; featured 25.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    #[serde(default = "default_base")]
    pub base: u32,
    #[serde(default)]
    pub normal: u32,
    #[serde(default = "default_high")]
    pub high: u32,
    #[serde(default = "default_critical")]
    pub critical: u32,
    #[serde(default = "default_emergency")]
    pub emergency: u32,
    #[serde(default = "default_priority_boost")]
    pub priority_boost: u32,
    #[serde(default = "default_featured")]
    pub featured: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            normal: 0,
            high: default_high(),
            critical: default_critical(),
            emergency: default_emergency(),
            priority_boost: default_priority_boost(),
            featured: default_featured(),
        }
    }
}

fn default_base() -> u32 {
    10
}

fn default_high() -> u32 {
    5
}

fn default_critical() -> u32 {
    10
}

fn default_emergency() -> u32 {
    20
}

fn default_priority_boost() -> u32 {
    15
}

fn default_featured() -> u32 {
    25
}

/// Realtime channel bridge and connection resilience configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RealtimeConfig {
    /// WebSocket endpoint of the realtime service. `None` disables live delivery.
    #[serde(default)]
    pub url: Option<String>,

    /// API key sent as the `apikey` query parameter.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Seconds between heartbeat pings.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// First reconnect delay in milliseconds; doubles per attempt.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Ceiling on any single reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Reconnect attempts before giving up until re-initialized.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Channel used for presence tracking.
    #[serde(default = "default_presence_channel")]
    pub presence_channel: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            presence_channel: default_presence_channel(),
        }
    }
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_presence_channel() -> String {
    "online_users".to_string()
}

/// Request intake and lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Seconds between expiry sweeps.
    #[serde(default = "default_expiry_sweep_interval_secs")]
    pub expiry_sweep_interval_secs: u64,

    /// Hours a notification stays relevant after creation.
    #[serde(default = "default_notification_ttl_hours")]
    pub notification_ttl_hours: u32,

    /// Distance cap applied when selecting the audience for a new request.
    /// `None` notifies every qualified responder regardless of distance.
    #[serde(default)]
    pub default_max_distance_km: Option<f64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
            notification_ttl_hours: default_notification_ttl_hours(),
            default_max_distance_km: None,
        }
    }
}

fn default_expiry_sweep_interval_secs() -> u64 {
    60
}

fn default_notification_ttl_hours() -> u32 {
    72
}
