// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the external collaborators.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod store;
pub mod transport;

pub use adapter::PluginAdapter;
pub use store::MarketplaceStore;
pub use transport::RealtimeTransport;
