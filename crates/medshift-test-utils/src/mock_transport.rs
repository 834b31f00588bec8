// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock realtime transport for deterministic testing.
//!
//! `MockTransport` implements `RealtimeTransport`, records every call for
//! assertion, lets tests push server frames into the connected sink, and
//! can be told to fail connects or heartbeats.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use medshift_core::types::{AdapterType, ChannelFilter, HealthStatus, InboundFrame};
use medshift_core::{MedshiftError, PluginAdapter, RealtimeTransport};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Connect,
    Subscribe {
        channel: String,
        filter: ChannelFilter,
    },
    Unsubscribe {
        channel: String,
    },
    Broadcast {
        channel: String,
        event: String,
        payload: serde_json::Value,
    },
    Track {
        channel: String,
        payload: serde_json::Value,
    },
    Untrack {
        channel: String,
    },
    Heartbeat,
    Close,
}

/// A scriptable in-memory realtime transport.
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    sink: Mutex<Option<mpsc::Sender<InboundFrame>>>,
    connected: AtomicBool,
    unreachable: AtomicBool,
    failing_connects: AtomicU32,
    failing_heartbeats: AtomicU32,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            connected: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
            failing_connects: AtomicU32::new(0),
            failing_heartbeats: AtomicU32::new(0),
        }
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` heartbeats fail and drop the connection.
    pub fn fail_next_heartbeats(&self, n: u32) {
        self.failing_heartbeats.store(n, Ordering::SeqCst);
    }

    /// While unreachable every connect and heartbeat fails.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Push a server frame into the connected sink. Returns false when no
    /// client is listening.
    pub async fn push_frame(&self, frame: InboundFrame) -> bool {
        let sink = self.sink.lock().await.clone();
        match sink {
            Some(sink) => sink.send(frame).await.is_ok(),
            None => false,
        }
    }

    pub async fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().await.clone()
    }

    pub async fn connect_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Connect)).await
    }

    pub async fn heartbeat_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Heartbeat)).await
    }

    /// Channels currently joined, in join order.
    pub async fn subscribed_channels(&self) -> Vec<String> {
        let mut joined: Vec<String> = Vec::new();
        for call in self.calls.lock().await.iter() {
            match call {
                TransportCall::Subscribe { channel, .. } if !joined.contains(channel) => {
                    joined.push(channel.clone());
                }
                TransportCall::Unsubscribe { channel } => joined.retain(|c| c != channel),
                TransportCall::Close | TransportCall::Connect => joined.clear(),
                _ => {}
            }
        }
        joined
    }

    /// Broadcasts sent, as (channel, event, payload).
    pub async fn broadcasts(&self) -> Vec<(String, String, serde_json::Value)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                TransportCall::Broadcast {
                    channel,
                    event,
                    payload,
                } => Some((channel.clone(), event.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    async fn count(&self, pred: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|c| pred(c)).count()
    }

    async fn record(&self, call: TransportCall) {
        self.calls.lock().await.push(call);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn require_connected(&self) -> Result<(), MedshiftError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MedshiftError::transport("mock transport is not connected"))
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, MedshiftError> {
        if self.is_connected() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy("disconnected".to_string()))
        }
    }

    async fn shutdown(&self) -> Result<(), MedshiftError> {
        RealtimeTransport::close(self).await
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    async fn connect(&self, sink: mpsc::Sender<InboundFrame>) -> Result<(), MedshiftError> {
        self.record(TransportCall::Connect).await;
        if self.unreachable.load(Ordering::SeqCst) || Self::take_failure(&self.failing_connects) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(MedshiftError::transport("mock connect refused"));
        }
        *self.sink.lock().await = Some(sink);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, channel: &str, filter: &ChannelFilter) -> Result<(), MedshiftError> {
        self.require_connected()?;
        self.record(TransportCall::Subscribe {
            channel: channel.to_string(),
            filter: filter.clone(),
        })
        .await;
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), MedshiftError> {
        self.require_connected()?;
        self.record(TransportCall::Unsubscribe {
            channel: channel.to_string(),
        })
        .await;
        Ok(())
    }

    async fn broadcast(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), MedshiftError> {
        self.require_connected()?;
        self.record(TransportCall::Broadcast {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        })
        .await;
        Ok(())
    }

    async fn track(&self, channel: &str, payload: serde_json::Value) -> Result<(), MedshiftError> {
        self.require_connected()?;
        self.record(TransportCall::Track {
            channel: channel.to_string(),
            payload,
        })
        .await;
        Ok(())
    }

    async fn untrack(&self, channel: &str) -> Result<(), MedshiftError> {
        self.require_connected()?;
        self.record(TransportCall::Untrack {
            channel: channel.to_string(),
        })
        .await;
        Ok(())
    }

    async fn heartbeat(&self) -> Result<(), MedshiftError> {
        self.record(TransportCall::Heartbeat).await;
        if self.unreachable.load(Ordering::SeqCst) || Self::take_failure(&self.failing_heartbeats)
        {
            self.connected.store(false, Ordering::SeqCst);
            *self.sink.lock().await = None;
            return Err(MedshiftError::transport("mock heartbeat timed out"));
        }
        self.require_connected()
    }

    async fn close(&self) -> Result<(), MedshiftError> {
        self.record(TransportCall::Close).await;
        self.connected.store(false, Ordering::SeqCst);
        *self.sink.lock().await = None;
        Ok(())
    }
}
