// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential reconnect backoff.

use std::time::Duration;

use medshift_config::model::RealtimeConfig;

/// Delay schedule for reconnect attempts: `base * 2^attempt`, capped at
/// `max_delay`, for at most `max_attempts` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&RealtimeConfig::default())
    }
}

impl From<&RealtimeConfig> for ReconnectPolicy {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
            max_attempts: config.max_reconnect_attempts,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before zero-based `attempt`, ignoring the attempt cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// Delay before `attempt`, or `None` once the cap is reached.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| self.delay_for(attempt))
    }

    /// Every delay the policy will ever produce, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts).map(|a| self.delay_for(a)).collect()
    }
}
