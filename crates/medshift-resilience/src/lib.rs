// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection resilience for the Medshift realtime session.
//!
//! - [`backoff`]: the reconnect delay schedule
//! - [`frames`]: server frame to bus event translation
//! - [`manager`]: the [`ConnectionManager`] state machine, heartbeat, and
//!   inbound pump

pub mod backoff;
pub mod frames;
pub mod manager;

pub use backoff::ReconnectPolicy;
pub use manager::{ConnectionManager, Identity};
