// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `RealtimeTransport` over a WebSocket connection.
//!
//! Each connection runs two tasks:
//! 1. Writer: drains an mpsc queue of outbound frames into the socket
//! 2. Reader: resolves `phx_reply` acks against pending refs and forwards
//!    every other server push into the caller's sink
//!
//! When the socket drops, the reader fails every pending request and
//! reports `InboundFrame::Closed` so the connection manager can reconnect.
//!
//! The server drops pushes on topics the socket has not joined, so
//! `broadcast` joins its target topic first. Joins are remembered per
//! socket and start over after a reconnect.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use medshift_config::model::RealtimeConfig;
use medshift_core::types::{AdapterType, ChannelFilter, HealthStatus, InboundFrame};
use medshift_core::{MedshiftError, PluginAdapter, RealtimeTransport};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frame::{self, events, Frame, PHOENIX_TOPIC};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Result<(), String>>>>>;
type Joined = Arc<Mutex<HashSet<String>>>;

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOUND_BUFFER: usize = 64;

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live state of one socket.
struct Link {
    outbound: mpsc::Sender<Message>,
    pending: Pending,
    joined: Joined,
    cancel: CancellationToken,
}

impl Link {
    fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.outbound.is_closed()
    }
}

/// WebSocket client for the realtime channel service.
pub struct WsTransport {
    url: String,
    api_key: Option<String>,
    presence_key: Mutex<String>,
    reply_timeout: Duration,
    next_ref: AtomicU64,
    link: Mutex<Option<Link>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
            presence_key: Mutex::new(String::new()),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            next_ref: AtomicU64::new(1),
            link: Mutex::new(None),
        }
    }

    /// Build from config. Fails when no URL is configured.
    pub fn from_config(config: &RealtimeConfig) -> Result<Self, MedshiftError> {
        let url = config.url.clone().ok_or_else(|| {
            MedshiftError::Config("realtime.url is required for live delivery".to_string())
        })?;
        Ok(Self::new(url, config.api_key.clone()))
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Key under which this client's presence is tracked.
    pub fn set_presence_key(&self, key: impl Into<String>) {
        *guard(&self.presence_key) = key.into();
    }

    fn endpoint(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        match &self.api_key {
            Some(key) => format!("{}{separator}apikey={key}&vsn=1.0.0", self.url),
            None => format!("{}{separator}vsn=1.0.0", self.url),
        }
    }

    fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn open_link(&self) -> Result<(mpsc::Sender<Message>, Pending), MedshiftError> {
        match guard(&self.link).as_ref() {
            Some(link) if link.is_open() => Ok((link.outbound.clone(), link.pending.clone())),
            _ => Err(MedshiftError::transport("realtime connection is not open")),
        }
    }

    fn joined_topics(&self) -> Result<Joined, MedshiftError> {
        match guard(&self.link).as_ref() {
            Some(link) if link.is_open() => Ok(link.joined.clone()),
            _ => Err(MedshiftError::transport("realtime connection is not open")),
        }
    }

    /// Join `topic` unless this socket already has.
    async fn ensure_joined(&self, topic: &str, filter: &ChannelFilter) -> Result<(), MedshiftError> {
        let joined = self.joined_topics()?;
        if guard(&joined).contains(topic) {
            return Ok(());
        }
        let key = guard(&self.presence_key).clone();
        self.request(
            topic.to_string(),
            events::JOIN,
            frame::join_payload(filter, &key),
        )
        .await?;
        guard(&joined).insert(topic.to_string());
        Ok(())
    }

    /// Queue a frame without waiting for an ack.
    async fn push(&self, topic: String, event: &str, payload: Value) -> Result<(), MedshiftError> {
        let (outbound, _) = self.open_link()?;
        let text = Frame::new(topic, event, payload, self.next_ref()).encode()?;
        outbound
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| MedshiftError::transport("realtime writer has stopped"))
    }

    /// Send a frame and wait for the matching `phx_reply`.
    async fn request(
        &self,
        topic: String,
        event: &str,
        payload: Value,
    ) -> Result<(), MedshiftError> {
        let (outbound, pending) = self.open_link()?;
        let reference = self.next_ref();
        let text = Frame::new(topic.clone(), event, payload, reference.clone()).encode()?;

        let (tx, rx) = oneshot::channel();
        guard(&pending).insert(reference.clone(), tx);
        if outbound.send(Message::Text(text.into())).await.is_err() {
            guard(&pending).remove(&reference);
            return Err(MedshiftError::transport("realtime writer has stopped"));
        }

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(MedshiftError::transport(format!(
                "{event} on {topic} refused: {reason}"
            ))),
            Ok(Err(_)) => Err(MedshiftError::transport("realtime connection dropped")),
            Err(_) => {
                guard(&pending).remove(&reference);
                Err(MedshiftError::Timeout {
                    duration: self.reply_timeout,
                })
            }
        }
    }
}

async fn write_loop(
    mut socket: SplitSink<Socket, Message>,
    mut outbound: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = socket.send(msg).await {
                    warn!(error = %e, "realtime write failed");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
    debug!("realtime writer stopped");
}

async fn read_loop(
    mut socket: SplitStream<Socket>,
    sink: mpsc::Sender<InboundFrame>,
    pending: Pending,
    cancel: CancellationToken,
) {
    let reason = loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break None,
            msg = socket.next() => msg,
        };
        let text = match msg {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(frame))) => {
                break Some(match frame {
                    Some(f) => format!("server closed connection: {}", f.reason.as_str()),
                    None => "server closed connection".to_string(),
                });
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break Some(format!("socket error: {e}")),
            None => break Some("socket ended".to_string()),
        };

        let frame = match Frame::decode(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "skipping undecodable frame");
                continue;
            }
        };
        if let Some((reference, result)) = frame.reply() {
            if let Some(waiter) = guard(&pending).remove(reference) {
                let _ = waiter.send(result);
            }
            continue;
        }
        for inbound in frame::to_inbound(frame) {
            if sink.send(inbound).await.is_err() {
                debug!("inbound sink dropped");
            }
        }
    };

    cancel.cancel();
    // Dropping the senders wakes every waiter with a dropped-connection error.
    guard(&pending).clear();
    if let Some(reason) = reason {
        info!(reason = %reason, "realtime connection lost");
        let _ = sink.send(InboundFrame::Closed { reason }).await;
    }
    debug!("realtime reader stopped");
}

#[async_trait]
impl PluginAdapter for WsTransport {
    fn name(&self) -> &str {
        "websocket"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, MedshiftError> {
        match guard(&self.link).as_ref() {
            Some(link) if link.is_open() => Ok(HealthStatus::Healthy),
            Some(_) => Ok(HealthStatus::Unhealthy("connection lost".to_string())),
            None => Ok(HealthStatus::Degraded("not connected".to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), MedshiftError> {
        RealtimeTransport::close(self).await
    }
}

#[async_trait]
impl RealtimeTransport for WsTransport {
    async fn connect(&self, sink: mpsc::Sender<InboundFrame>) -> Result<(), MedshiftError> {
        if let Some(previous) = guard(&self.link).take() {
            previous.cancel.cancel();
        }

        let (socket, _response) =
            connect_async(self.endpoint())
                .await
                .map_err(|e| MedshiftError::Transport {
                    message: format!("could not connect to {}", self.url),
                    source: Some(Box::new(e)),
                })?;
        let (write, read) = socket.split();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let pending: Pending = Arc::default();
        let joined: Joined = Arc::default();
        let cancel = CancellationToken::new();

        tokio::spawn(write_loop(write, outbound_rx, cancel.clone()));
        tokio::spawn(read_loop(read, sink, pending.clone(), cancel.clone()));

        *guard(&self.link) = Some(Link {
            outbound,
            pending,
            joined,
            cancel,
        });
        info!(url = %self.url, "realtime connection open");
        Ok(())
    }

    async fn subscribe(&self, channel: &str, filter: &ChannelFilter) -> Result<(), MedshiftError> {
        let topic = frame::topic_for(channel);
        let key = guard(&self.presence_key).clone();
        self.request(topic.clone(), events::JOIN, frame::join_payload(filter, &key))
            .await?;
        let joined = self.joined_topics()?;
        guard(&joined).insert(topic);
        debug!(channel, "channel joined");
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), MedshiftError> {
        let topic = frame::topic_for(channel);
        self.request(topic.clone(), events::LEAVE, json!({})).await?;
        let joined = self.joined_topics()?;
        guard(&joined).remove(&topic);
        Ok(())
    }

    async fn broadcast(
        &self,
        channel: &str,
        event: &str,
        payload: Value,
    ) -> Result<(), MedshiftError> {
        let topic = frame::topic_for(channel);
        self.ensure_joined(&topic, &ChannelFilter::default()).await?;
        self.push(
            topic,
            events::BROADCAST,
            frame::broadcast_payload(event, payload),
        )
        .await
    }

    async fn track(&self, channel: &str, payload: Value) -> Result<(), MedshiftError> {
        if let Some(user_id) = payload.get("user_id").and_then(Value::as_str) {
            self.set_presence_key(user_id);
        }
        self.request(
            frame::topic_for(channel),
            events::PRESENCE,
            frame::track_payload(payload),
        )
        .await
    }

    async fn untrack(&self, channel: &str) -> Result<(), MedshiftError> {
        self.request(
            frame::topic_for(channel),
            events::PRESENCE,
            frame::untrack_payload(),
        )
        .await
    }

    async fn heartbeat(&self) -> Result<(), MedshiftError> {
        self.request(PHOENIX_TOPIC.to_string(), events::HEARTBEAT, json!({}))
            .await
    }

    async fn close(&self) -> Result<(), MedshiftError> {
        if let Some(link) = guard(&self.link).take() {
            link.cancel.cancel();
            info!(url = %self.url, "realtime connection closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_key_and_version() {
        let t = WsTransport::new("wss://rt.example.com/socket", Some("k".to_string()));
        assert_eq!(
            t.endpoint(),
            "wss://rt.example.com/socket?apikey=k&vsn=1.0.0"
        );
        let t = WsTransport::new("ws://localhost:4000/socket?x=1", None);
        assert_eq!(t.endpoint(), "ws://localhost:4000/socket?x=1&vsn=1.0.0");
    }

    #[test]
    fn from_config_requires_url() {
        let err = WsTransport::from_config(&RealtimeConfig::default()).err();
        assert!(matches!(err, Some(MedshiftError::Config(_))));
    }

    #[tokio::test]
    async fn calls_before_connect_fail_fast() {
        let t = WsTransport::new("ws://127.0.0.1:9", None);
        let err = t.heartbeat().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(t.close().await.is_ok());
        assert_eq!(
            t.health_check().await.unwrap(),
            HealthStatus::Degraded("not connected".to_string())
        );
    }
}
