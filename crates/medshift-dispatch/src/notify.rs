// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persist-then-publish notification delivery.

use std::sync::Arc;

use chrono::{Duration, Utc};
use medshift_bus::{user_channel, BusEvent, EventBus};
use medshift_core::types::Notification;
use medshift_core::{MarketplaceStore, MedshiftError, NotificationKind, RecipientRole};
use tracing::{debug, warn};

/// Everything about a notification except its identity and timestamps.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub request_id: String,
    pub recipient_id: String,
    pub recipient_type: RecipientRole,
    pub title: String,
    pub message: String,
    pub action_ref: Option<String>,
}

/// Writes notifications to the store and fans them out.
///
/// Local subscribers get the event through the bus. When a realtime
/// transport is attached, the payload is also broadcast on the recipient's
/// targeted channel.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn MarketplaceStore>,
    bus: Arc<EventBus>,
    ttl: Duration,
}

impl Notifier {
    pub fn new(store: Arc<dyn MarketplaceStore>, bus: Arc<EventBus>, ttl_hours: u32) -> Self {
        Self {
            store,
            bus,
            ttl: Duration::hours(i64::from(ttl_hours)),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Persist one notification, then publish it.
    ///
    /// Fails only if the store write or event validation fails. Subscriber
    /// and transport failures are logged.
    pub async fn deliver(&self, draft: NotificationDraft) -> Result<Notification, MedshiftError> {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: draft.request_id,
            recipient_id: draft.recipient_id,
            recipient_type: draft.recipient_type,
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            read: false,
            action_ref: draft.action_ref,
            expires_at: Some(Utc::now() + self.ttl),
        };
        self.store.insert_notification(&notification).await?;

        let event = BusEvent::from_notification(notification.clone());
        let report = self.bus.publish(&event)?;
        debug!(
            notification_id = %notification.id,
            kind = %notification.kind,
            recipient_id = %notification.recipient_id,
            delivered = report.delivered,
            failed = report.failures.len(),
            "notification published"
        );

        if self.bus.has_transport() {
            let channel = user_channel(&notification.recipient_id);
            if let Err(e) = self
                .bus
                .send(&channel, &notification.kind.to_string(), event.payload())
                .await
            {
                warn!(channel = %channel, error = %e, "realtime delivery failed");
            }
        }
        Ok(notification)
    }

    /// Deliver every draft, logging failures. Returns how many were delivered.
    pub async fn deliver_all(&self, drafts: Vec<NotificationDraft>) -> usize {
        let mut delivered = 0;
        for draft in drafts {
            let recipient_id = draft.recipient_id.clone();
            let kind = draft.kind;
            match self.deliver(draft).await {
                Ok(_) => delivered += 1,
                Err(e) => warn!(
                    recipient_id = %recipient_id,
                    kind = %kind,
                    error = %e,
                    "notification delivery failed"
                ),
            }
        }
        delivered
    }
}
