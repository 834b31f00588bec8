// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process event fan-out.
//!
//! Delivery is synchronous and ordered: type subscribers in registration
//! order, then channel subscribers in registration order. Handlers are
//! invoked outside the registry lock, so a handler may subscribe or
//! unsubscribe without deadlocking; such changes take effect from the
//! next publish.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use medshift_core::{MedshiftError, RealtimeTransport};
use tracing::{debug, warn};

use crate::event::{BusEvent, EventKind};
use crate::filter::{matches_filters, EventFilter};

/// Subscriber callback.
pub type Handler = Arc<dyn Fn(&BusEvent) -> Result<(), MedshiftError> + Send + Sync>;

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct TypeSubscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
}

struct ChannelSubscription {
    id: SubscriptionId,
    channel: String,
    filter: EventFilter,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_type: Vec<TypeSubscription>,
    by_channel: Vec<ChannelSubscription>,
}

impl Registry {
    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.by_type.len() + self.by_channel.len();
        self.by_type.retain(|s| s.id != id);
        self.by_channel.retain(|s| s.id != id);
        before != self.by_type.len() + self.by_channel.len()
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle does not unsubscribe.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    registry: Weak<Mutex<Registry>>,
    active: AtomicBool,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove exactly this registration. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(self.id);
            debug!(subscription = %self.id, "unsubscribed");
        }
    }
}

/// Outcome of one publish.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// One `MedshiftError::Delivery` per failed or panicking handler.
    pub failures: Vec<MedshiftError>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }
}

/// Typed event bus with type and channel subscriptions.
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
    transport: Mutex<Option<Arc<dyn RealtimeTransport>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            transport: Mutex::new(None),
        }
    }

    /// Bus whose `send` goes out through `transport`.
    pub fn with_transport(transport: Arc<dyn RealtimeTransport>) -> Self {
        let bus = Self::new();
        bus.attach_transport(transport);
        bus
    }

    pub fn attach_transport(&self, transport: Arc<dyn RealtimeTransport>) {
        *self.transport.lock().unwrap_or_else(PoisonError::into_inner) = Some(transport);
    }

    pub fn detach_transport(&self) {
        *self.transport.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Register `handler` for every event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionHandle
    where
        F: Fn(&BusEvent) -> Result<(), MedshiftError> + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.allocate();
        registry.by_type.push(TypeSubscription {
            id,
            kind,
            handler: Arc::new(handler),
        });
        debug!(subscription = %id, kind = %kind, "type subscription added");
        SubscriptionHandle {
            id,
            registry: Arc::downgrade(&self.registry),
            active: AtomicBool::new(true),
        }
    }

    /// Register `handler` for events on `channel` that pass `filter`.
    pub fn subscribe_to_channel<F>(
        &self,
        channel: impl Into<String>,
        handler: F,
        filter: EventFilter,
    ) -> SubscriptionId
    where
        F: Fn(&BusEvent) -> Result<(), MedshiftError> + Send + Sync + 'static,
    {
        let channel = channel.into();
        let mut registry = lock(&self.registry);
        let id = registry.allocate();
        debug!(subscription = %id, channel = %channel, "channel subscription added");
        registry.by_channel.push(ChannelSubscription {
            id,
            channel,
            filter,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a registration by id. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.registry).remove(id)
    }

    pub fn has_transport(&self) -> bool {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Deliver `event` to every matching subscriber.
    ///
    /// Fails only if the event is structurally invalid, in which case no
    /// handler runs. Handler failures are collected in the report.
    pub fn publish(&self, event: &BusEvent) -> Result<DeliveryReport, MedshiftError> {
        event.validate()?;

        let targets: Vec<(SubscriptionId, Handler)> = {
            let registry = lock(&self.registry);
            let kind = event.kind();
            let channel = event.channel();
            registry
                .by_type
                .iter()
                .filter(|s| s.kind == kind)
                .map(|s| (s.id, s.handler.clone()))
                .chain(
                    registry
                        .by_channel
                        .iter()
                        .filter(|s| s.channel == channel && matches_filters(event, &s.filter))
                        .map(|s| (s.id, s.handler.clone())),
                )
                .collect()
        };

        let mut report = DeliveryReport::default();
        for (id, handler) in targets {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(subscription = %id, kind = %event.kind(), error = %e, "subscriber failed");
                    report.failures.push(MedshiftError::Delivery {
                        subscriber: id.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "handler panicked".to_string());
                    warn!(subscription = %id, kind = %event.kind(), panic = %message, "subscriber panicked");
                    report.failures.push(MedshiftError::Delivery {
                        subscriber: id.to_string(),
                        message,
                    });
                }
            }
        }
        debug!(
            kind = %event.kind(),
            channel = %event.channel(),
            delivered = report.delivered,
            failed = report.failures.len(),
            "event published"
        );
        Ok(report)
    }

    /// One-way broadcast through the transport. Local subscribers are not involved.
    pub async fn send(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), MedshiftError> {
        let transport = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| MedshiftError::transport("no realtime transport attached"))?;
        transport.broadcast(channel, event, payload).await
    }

    /// Drop every registration.
    pub fn clear(&self) {
        let mut registry = lock(&self.registry);
        registry.by_type.clear();
        registry.by_channel.clear();
        debug!("event bus cleared");
    }

    /// Total number of registrations.
    pub fn subscriber_count(&self) -> usize {
        let registry = lock(&self.registry);
        registry.by_type.len() + registry.by_channel.len()
    }

    pub fn type_subscriber_count(&self, kind: EventKind) -> usize {
        lock(&self.registry)
            .by_type
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    pub fn channel_subscriber_count(&self, channel: &str) -> usize {
        lock(&self.registry)
            .by_channel
            .iter()
            .filter(|s| s.channel == channel)
            .count()
    }
}
