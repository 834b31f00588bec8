// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Medshift urgent staffing subsystem.
//!
//! This crate provides the error type, the domain records shared by every
//! component, and the two adapter traits at the external boundaries: the
//! record store and the realtime channel transport.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::MedshiftError;
pub use types::{
    AdapterType, ConnectionState, HealthStatus, NotificationKind, RecipientRole, RequestStatus,
    ResponseKind, ResponseStatus, Urgency,
};

pub use traits::{MarketplaceStore, PluginAdapter, RealtimeTransport};
