// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime channel boundary.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::MedshiftError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelFilter, InboundFrame};

/// Adapter for the external managed realtime channel service.
///
/// Server-pushed frames (row changes, broadcasts, presence) are written to
/// the sink handed to [`connect`](RealtimeTransport::connect). A transport
/// reports a dropped connection by sending [`InboundFrame::Closed`] and
/// failing subsequent calls with `MedshiftError::Transport`.
#[async_trait]
pub trait RealtimeTransport: PluginAdapter {
    /// Open the underlying connection. Calling it again after a failure
    /// replaces the previous connection.
    async fn connect(&self, sink: mpsc::Sender<InboundFrame>) -> Result<(), MedshiftError>;

    /// Join `channel` with an optional server-side change filter.
    async fn subscribe(&self, channel: &str, filter: &ChannelFilter)
        -> Result<(), MedshiftError>;

    /// Leave `channel`.
    async fn unsubscribe(&self, channel: &str) -> Result<(), MedshiftError>;

    /// One-way broadcast of `event` with a JSON payload on `channel`.
    async fn broadcast(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), MedshiftError>;

    /// Publish this client's presence on `channel`.
    async fn track(&self, channel: &str, payload: serde_json::Value)
        -> Result<(), MedshiftError>;

    /// Withdraw this client's presence from `channel`.
    async fn untrack(&self, channel: &str) -> Result<(), MedshiftError>;

    /// Liveness probe. Fails with `MedshiftError::Transport` when the
    /// connection is gone or the server stops acknowledging.
    async fn heartbeat(&self) -> Result<(), MedshiftError>;

    /// Close the connection. Idempotent.
    async fn close(&self) -> Result<(), MedshiftError>;
}
