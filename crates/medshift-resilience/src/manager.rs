// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection lifecycle for one identity.
//!
//! State machine:
//!
//! ```text
//! disconnected -> connecting -> connected
//! connected    -> error         (heartbeat failure, server close)
//! connecting   -> error         (connect or subscribe failure)
//! error        -> connecting    (scheduled retry)
//! any          -> disconnected  (explicit teardown only)
//! ```
//!
//! Retries follow the [`ReconnectPolicy`]; once it is exhausted the state
//! stays `error` until [`ConnectionManager::initialize`] is called again.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use medshift_bus::{user_channel, BusEvent, EventBus, PresenceTracker, NOTIFICATIONS_CHANNEL};
use medshift_config::model::RealtimeConfig;
use medshift_core::types::{ChannelFilter, PresenceMeta};
use medshift_core::{ConnectionState, MedshiftError, RealtimeTransport, RecipientRole};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::frames::{translate, Inbound};

const FRAME_BUFFER: usize = 256;

/// Who this process is connected as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: RecipientRole,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: RecipientRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

#[derive(Clone)]
struct Session {
    identity: Identity,
    cancel: CancellationToken,
    /// Set while this session's retry loop runs.
    reconnecting: Arc<AtomicBool>,
}

struct Inner {
    transport: Arc<dyn RealtimeTransport>,
    bus: Arc<EventBus>,
    presence: PresenceTracker,
    policy: ReconnectPolicy,
    heartbeat_interval: Duration,
    state: watch::Sender<ConnectionState>,
    attempt: AtomicU32,
    session: Mutex<Option<Session>>,
    /// Cancels the inbound pump of the current underlying connection.
    link: Mutex<Option<CancellationToken>>,
    last_heartbeat: Mutex<Option<DateTime<Utc>>>,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps one realtime session alive and feeds its frames into the bus.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        bus: Arc<EventBus>,
        config: &RealtimeConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                transport,
                bus,
                presence: PresenceTracker::new(config.presence_channel.clone()),
                policy: ReconnectPolicy::from(config),
                heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
                state,
                attempt: AtomicU32::new(0),
                session: Mutex::new(None),
                link: Mutex::new(None),
                last_heartbeat: Mutex::new(None),
            }),
        }
    }

    /// Connect as `identity`, attach the core subscriptions, publish
    /// presence, and start the heartbeat and inbound pump.
    ///
    /// A transport failure does not fail this call: the manager moves to
    /// `error` and retries in the background. Calling it again tears down
    /// the previous session first.
    pub async fn initialize(&self, identity: Identity) -> Result<(), MedshiftError> {
        if identity.user_id.trim().is_empty() {
            return Err(MedshiftError::Validation(
                "connection identity requires a user id".to_string(),
            ));
        }
        if guard(&self.inner.session).is_some() {
            self.disconnect().await?;
        }

        let session = Session {
            identity,
            cancel: CancellationToken::new(),
            reconnecting: Arc::new(AtomicBool::new(false)),
        };
        *guard(&self.inner.session) = Some(session.clone());
        self.inner.attempt.store(0, Ordering::SeqCst);
        self.inner.bus.attach_transport(self.inner.transport.clone());

        self.inner.set_state(ConnectionState::Connecting);
        match self.inner.establish(&session).await {
            Ok(()) => self.inner.set_state(ConnectionState::Connected),
            Err(e) => {
                warn!(user_id = %session.identity.user_id, error = %e, "initial connect failed");
                self.inner.on_failure(&e.to_string());
            }
        }

        tokio::spawn(heartbeat_loop(self.inner.clone(), session.cancel.clone()));
        Ok(())
    }

    /// Tear the session down. Idempotent.
    pub async fn disconnect(&self) -> Result<(), MedshiftError> {
        let Some(session) = guard(&self.inner.session).take() else {
            return Ok(());
        };
        session.cancel.cancel();
        if let Some(link) = guard(&self.inner.link).take() {
            link.cancel();
        }
        self.inner.bus.clear();
        self.inner.presence.reset();

        let transport = &self.inner.transport;
        let presence_channel = self.inner.presence.channel();
        if let Err(e) = transport.untrack(presence_channel).await {
            debug!(error = %e, "untrack during disconnect failed");
        }
        for channel in self.inner.core_channels(&session.identity) {
            if let Err(e) = transport.unsubscribe(&channel).await {
                debug!(channel = %channel, error = %e, "unsubscribe during disconnect failed");
            }
        }
        if let Err(e) = transport.close().await {
            warn!(error = %e, "transport close failed");
        }
        self.inner.bus.detach_transport();
        self.inner.attempt.store(0, Ordering::SeqCst);
        self.inner.set_state(ConnectionState::Disconnected);
        info!(user_id = %session.identity.user_id, "realtime session closed");
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Reconnect attempts made since the last successful connect.
    pub fn attempt(&self) -> u32 {
        self.inner.attempt.load(Ordering::SeqCst)
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        *guard(&self.inner.last_heartbeat)
    }

    pub fn identity(&self) -> Option<Identity> {
        guard(&self.inner.session).as_ref().map(|s| s.identity.clone())
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.inner.presence
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }
}

impl Inner {
    fn core_channels(&self, identity: &Identity) -> [String; 3] {
        [
            NOTIFICATIONS_CHANNEL.to_string(),
            user_channel(&identity.user_id),
            self.presence.channel().to_string(),
        ]
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if !changed {
            return;
        }
        let attempt = self.attempt.load(Ordering::SeqCst);
        info!(state = %next, attempt, "connection state changed");
        let event = BusEvent::ConnectionStateChanged {
            state: next,
            attempt,
        };
        if let Err(e) = self.bus.publish(&event) {
            warn!(error = %e, "failed to publish connection state");
        }
    }

    /// Open a fresh underlying connection and re-attach the core channels.
    async fn establish(self: &Arc<Self>, session: &Session) -> Result<(), MedshiftError> {
        let link = session.cancel.child_token();
        if let Some(previous) = guard(&self.link).replace(link.clone()) {
            previous.cancel();
        }

        let (sink, frames) = mpsc::channel(FRAME_BUFFER);
        self.transport.connect(sink).await?;

        let identity = &session.identity;
        let [notifications, targeted, presence] = self.core_channels(identity);
        self.transport
            .subscribe(
                &notifications,
                &ChannelFilter::table("notifications").where_eq("recipient_id", &identity.user_id),
            )
            .await?;
        self.transport
            .subscribe(&targeted, &ChannelFilter::default())
            .await?;
        self.transport
            .subscribe(&presence, &ChannelFilter::default())
            .await?;

        let meta = PresenceMeta {
            user_id: identity.user_id.clone(),
            role: Some(identity.role),
            online_at: Utc::now(),
        };
        let payload = serde_json::to_value(&meta)
            .map_err(|e| MedshiftError::Internal(format!("presence payload: {e}")))?;
        self.transport.track(&presence, payload).await?;

        *guard(&self.last_heartbeat) = Some(Utc::now());
        tokio::spawn(pump(self.clone(), frames, link));
        debug!(user_id = %identity.user_id, "core channels attached");
        Ok(())
    }

    /// Record a transport failure and make sure exactly one retry loop runs.
    fn on_failure(self: &Arc<Self>, reason: &str) {
        let Some(session) = guard(&self.session).clone() else {
            return;
        };
        if session.cancel.is_cancelled() {
            return;
        }
        warn!(reason, "realtime connection failed");
        self.set_state(ConnectionState::Error);
        if session.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(reconnect_loop(self.clone(), session));
    }
}

async fn reconnect_loop(inner: Arc<Inner>, session: Session) {
    let cancel = session.cancel.clone();
    loop {
        let attempt = inner.attempt.load(Ordering::SeqCst);
        let Some(delay) = inner.policy.next_delay(attempt) else {
            warn!(
                attempts = attempt,
                "reconnect attempts exhausted; re-initialize to retry"
            );
            inner.set_state(ConnectionState::Error);
            break;
        };
        info!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        inner.attempt.fetch_add(1, Ordering::SeqCst);
        inner.set_state(ConnectionState::Connecting);
        let result = inner.establish(&session).await;
        if cancel.is_cancelled() {
            break;
        }
        match result {
            Ok(()) => {
                inner.attempt.store(0, Ordering::SeqCst);
                inner.set_state(ConnectionState::Connected);
                break;
            }
            Err(e) => {
                warn!(error = %e, "reconnect failed");
                inner.set_state(ConnectionState::Error);
            }
        }
    }
    session.reconnecting.store(false, Ordering::SeqCst);
}

async fn heartbeat_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if *inner.state.borrow() != ConnectionState::Connected {
            continue;
        }
        match inner.transport.heartbeat().await {
            Ok(()) => {
                *guard(&inner.last_heartbeat) = Some(Utc::now());
                debug!("heartbeat acknowledged");
            }
            Err(e) => inner.on_failure(&format!("heartbeat failed: {e}")),
        }
    }
    debug!("heartbeat loop stopped");
}

async fn pump(
    inner: Arc<Inner>,
    mut frames: mpsc::Receiver<medshift_core::types::InboundFrame>,
    link: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = link.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        match translate(frame, &inner.presence) {
            Inbound::Event(event) => match inner.bus.publish(&event) {
                Ok(report) => debug!(
                    kind = %event.kind(),
                    delivered = report.delivered,
                    failed = report.failures.len(),
                    "inbound event delivered"
                ),
                Err(e) => warn!(error = %e, "dropping invalid inbound event"),
            },
            Inbound::Closed(reason) => {
                inner.on_failure(&format!("server closed connection: {reason}"));
                break;
            }
            Inbound::Ignored(why) => debug!(why, "inbound frame ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medshift_bus::{EventFilter, EventKind};
    use medshift_core::types::InboundFrame;
    use medshift_test_utils::{MockTransport, TransportCall};
    use serde_json::json;

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            heartbeat_interval_secs: 30,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 3,
            ..RealtimeConfig::default()
        }
    }

    fn setup() -> (Arc<MockTransport>, Arc<EventBus>, ConnectionManager) {
        let transport = Arc::new(MockTransport::new());
        let bus = Arc::new(EventBus::new());
        let manager = ConnectionManager::new(transport.clone(), bus.clone(), &config());
        (transport, bus, manager)
    }

    fn record_states(bus: &EventBus) -> Arc<Mutex<Vec<ConnectionState>>> {
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = states.clone();
        let _handle = bus.subscribe(EventKind::ConnectionStateChanged, move |event| {
            if let BusEvent::ConnectionStateChanged { state, .. } = event {
                sink.lock().unwrap().push(*state);
            }
            Ok(())
        });
        states
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_attaches_core_channels_and_presence() {
        let (transport, _bus, manager) = setup();
        manager
            .initialize(Identity::new("alice", RecipientRole::Responder))
            .await
            .unwrap();

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(
            transport.subscribed_channels().await,
            vec![
                "notifications".to_string(),
                "user:alice".to_string(),
                "online_users".to_string()
            ]
        );
        let calls = transport.calls().await;
        assert!(calls.iter().any(|c| matches!(
            c,
            TransportCall::Subscribe { channel, filter }
                if channel == "notifications"
                    && filter.row_filter.as_deref() == Some("recipient_id=eq.alice")
        )));
        assert!(calls.iter().any(|c| matches!(
            c,
            TransportCall::Track { payload, .. } if payload["user_id"] == "alice"
        )));
        assert!(manager.last_heartbeat().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_identity_is_rejected() {
        let (_t, _b, manager) = setup();
        let err = manager
            .initialize(Identity::new("  ", RecipientRole::Requester))
            .await
            .unwrap_err();
        assert!(matches!(err, MedshiftError::Validation(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_failure_triggers_reconnect() {
        let (transport, bus, manager) = setup();
        let states = record_states(&bus);
        manager
            .initialize(Identity::new("alice", RecipientRole::Responder))
            .await
            .unwrap();
        transport.fail_next_heartbeats(1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(transport.connect_count().await, 2);
        assert_eq!(
            *states.lock().unwrap(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Error,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
        assert_eq!(manager.attempt(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_at_attempt_cap_until_reinitialized() {
        let (transport, _bus, manager) = setup();
        transport.set_unreachable(true);
        manager
            .initialize(Identity::new("alice", RecipientRole::Responder))
            .await
            .unwrap();
        assert_eq!(manager.state(), ConnectionState::Error);

        // 1s + 2s + 4s of backoff, then nothing more.
        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(transport.connect_count().await, 1 + 3);
        assert_eq!(manager.state(), ConnectionState::Error);
        assert_eq!(manager.attempt(), 3);

        transport.set_unreachable(false);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.connect_count().await, 4, "no retries after the cap");

        manager
            .initialize(Identity::new("alice", RecipientRole::Responder))
            .await
            .unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_retry_loop_does_not_unlock_new_session() {
        let (transport, _bus, manager) = setup();
        transport.set_unreachable(true);
        manager
            .initialize(Identity::new("alice", RecipientRole::Responder))
            .await
            .unwrap();
        let stale = guard(&manager.inner.session).clone().unwrap();

        manager
            .initialize(Identity::new("alice", RecipientRole::Responder))
            .await
            .unwrap();
        assert!(stale.cancel.is_cancelled());
        assert_eq!(transport.connect_count().await, 2);

        // The torn-down session's loop exits after the new one started.
        reconnect_loop(manager.inner.clone(), stale).await;
        manager.inner.on_failure("second failure");

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        settle().await;
        assert_eq!(transport.connect_count().await, 3, "one retry loop per session");
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_double() {
        let (transport, _bus, manager) = setup();
        transport.set_unreachable(true);
        manager
            .initialize(Identity::new("alice", RecipientRole::Responder))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(transport.connect_count().await, 1);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(transport.connect_count().await, 2);
        // Second retry waits 2s.
        tokio::time::sleep(Duration::from_millis(1_990)).await;
        assert_eq!(transport.connect_count().await, 2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.connect_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_frames_reach_bus_subscribers() {
        let (transport, bus, manager) = setup();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        bus.subscribe_to_channel(
            NOTIFICATIONS_CHANNEL,
            move |event| {
                sink.lock().unwrap().push(event.kind());
                Ok(())
            },
            EventFilter::any().recipient("alice"),
        );
        manager
            .initialize(Identity::new("alice", RecipientRole::Responder))
            .await
            .unwrap();

        assert!(
            transport
                .push_frame(InboundFrame::Change {
                    channel: "notifications".to_string(),
                    table: "notifications".to_string(),
                    event: medshift_core::types::ChangeEvent::Insert,
                    record: json!({
                        "id": "n-1",
                        "request_id": "r-1",
                        "recipient_id": "alice",
                        "recipient_type": "responder",
                        "type": "new_request",
                        "title": "Urgent",
                        "message": "Critical ED shift",
                        "read": false,
                        "action_ref": null,
                        "expires_at": null
                    }),
                })
                .await
        );
        transport
            .push_frame(InboundFrame::PresenceJoin {
                channel: "online_users".to_string(),
                joined: vec![PresenceMeta {
                    user_id: "bob".to_string(),
                    role: Some(RecipientRole::Requester),
                    online_at: Utc::now(),
                }],
            })
            .await;
        settle().await;

        assert_eq!(*received.lock().unwrap(), vec![EventKind::NewRequest]);
        assert!(manager.presence().is_online("bob"));
    }

    #[tokio::test(start_paused = true)]
    async fn server_close_frame_reconnects() {
        let (transport, _bus, manager) = setup();
        manager
            .initialize(Identity::new("alice", RecipientRole::Responder))
            .await
            .unwrap();
        transport
            .push_frame(InboundFrame::Closed {
                reason: "server restart".to_string(),
            })
            .await;
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Error);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(transport.connect_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_tears_down_and_is_idempotent() {
        let (transport, bus, manager) = setup();
        manager
            .initialize(Identity::new("alice", RecipientRole::Responder))
            .await
            .unwrap();
        let _h = bus.subscribe(EventKind::NewRequest, |_| Ok(()));
        let mut rx = manager.watch_state();

        manager.disconnect().await.unwrap();
        manager.disconnect().await.unwrap();

        assert_eq!(*rx.borrow_and_update(), ConnectionState::Disconnected);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!transport.is_connected());
        let calls = transport.calls().await;
        assert!(calls.contains(&TransportCall::Untrack {
            channel: "online_users".to_string()
        }));
        assert_eq!(
            calls.iter().filter(|c| **c == TransportCall::Close).count(),
            1
        );

        // No heartbeats after teardown.
        let before = transport.heartbeat_count().await;
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(transport.heartbeat_count().await, before);
        assert!(manager.identity().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_run_on_interval_while_connected() {
        let (transport, _bus, manager) = setup();
        manager
            .initialize(Identity::new("alice", RecipientRole::Responder))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(transport.heartbeat_count().await, 3);
        manager.disconnect().await.unwrap();
    }
}
