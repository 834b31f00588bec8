// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The closed set of events carried by the bus.

use medshift_core::types::{Notification, PresenceMeta};
use medshift_core::{ConnectionState, MedshiftError, NotificationKind, RequestStatus};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Channel carrying persisted notification events.
pub const NOTIFICATIONS_CHANNEL: &str = "notifications";
/// Channel carrying request status changes.
pub const REQUESTS_CHANNEL: &str = "urgent_requests";
/// Channel carrying local connection state changes.
pub const CONNECTION_CHANNEL: &str = "connection";

/// Targeted message channel for one identity.
pub fn user_channel(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// Discriminant of a [`BusEvent`], used for type subscriptions and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewRequest,
    NewResponse,
    ResponseAccepted,
    ResponseRejected,
    RequestUpdated,
    Message,
    UserStatusChanged,
    ConnectionStateChanged,
}

impl From<NotificationKind> for EventKind {
    fn from(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::NewRequest => EventKind::NewRequest,
            NotificationKind::NewResponse => EventKind::NewResponse,
            NotificationKind::ResponseAccepted => EventKind::ResponseAccepted,
            NotificationKind::ResponseRejected => EventKind::ResponseRejected,
        }
    }
}

/// What a presence event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PresenceChange {
    /// `users` is the full online set.
    Sync,
    /// `users` came online.
    Join,
    /// `users` went offline.
    Leave,
}

/// Every event the bus can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    NewRequest {
        notification: Notification,
    },
    NewResponse {
        notification: Notification,
    },
    ResponseAccepted {
        notification: Notification,
    },
    ResponseRejected {
        notification: Notification,
    },
    RequestUpdated {
        request_id: String,
        status: RequestStatus,
    },
    /// A broadcast received on (or addressed to) a named channel.
    Message {
        channel: String,
        event: String,
        payload: serde_json::Value,
    },
    UserStatusChanged {
        channel: String,
        change: PresenceChange,
        users: Vec<PresenceMeta>,
    },
    ConnectionStateChanged {
        state: ConnectionState,
        attempt: u32,
    },
}

impl BusEvent {
    /// Wrap a notification in the variant matching its kind.
    pub fn from_notification(notification: Notification) -> Self {
        match notification.kind {
            NotificationKind::NewRequest => BusEvent::NewRequest { notification },
            NotificationKind::NewResponse => BusEvent::NewResponse { notification },
            NotificationKind::ResponseAccepted => BusEvent::ResponseAccepted { notification },
            NotificationKind::ResponseRejected => BusEvent::ResponseRejected { notification },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::NewRequest { .. } => EventKind::NewRequest,
            BusEvent::NewResponse { .. } => EventKind::NewResponse,
            BusEvent::ResponseAccepted { .. } => EventKind::ResponseAccepted,
            BusEvent::ResponseRejected { .. } => EventKind::ResponseRejected,
            BusEvent::RequestUpdated { .. } => EventKind::RequestUpdated,
            BusEvent::Message { .. } => EventKind::Message,
            BusEvent::UserStatusChanged { .. } => EventKind::UserStatusChanged,
            BusEvent::ConnectionStateChanged { .. } => EventKind::ConnectionStateChanged,
        }
    }

    pub fn notification(&self) -> Option<&Notification> {
        match self {
            BusEvent::NewRequest { notification }
            | BusEvent::NewResponse { notification }
            | BusEvent::ResponseAccepted { notification }
            | BusEvent::ResponseRejected { notification } => Some(notification),
            _ => None,
        }
    }

    /// Identity the event is addressed to, if any.
    pub fn recipient_id(&self) -> Option<&str> {
        self.notification().map(|n| n.recipient_id.as_str())
    }

    /// Channel whose subscribers receive this event.
    pub fn channel(&self) -> &str {
        match self {
            BusEvent::NewRequest { .. }
            | BusEvent::NewResponse { .. }
            | BusEvent::ResponseAccepted { .. }
            | BusEvent::ResponseRejected { .. } => NOTIFICATIONS_CHANNEL,
            BusEvent::RequestUpdated { .. } => REQUESTS_CHANNEL,
            BusEvent::Message { channel, .. } | BusEvent::UserStatusChanged { channel, .. } => {
                channel
            }
            BusEvent::ConnectionStateChanged { .. } => CONNECTION_CHANNEL,
        }
    }

    /// JSON body that custom filter keys are matched against.
    ///
    /// Notification events expose the notification record; message events
    /// expose their payload; everything else exposes its own fields.
    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            BusEvent::Message { payload, .. } => return payload.clone(),
            _ => match self.notification() {
                Some(n) => serde_json::to_value(n),
                None => serde_json::to_value(self),
            },
        };
        value.unwrap_or_default()
    }

    /// Reject structurally inconsistent events before fan-out.
    pub fn validate(&self) -> Result<(), MedshiftError> {
        if let Some(n) = self.notification() {
            if EventKind::from(n.kind) != self.kind() {
                return Err(MedshiftError::Validation(format!(
                    "{} event carries a {} notification",
                    self.kind(),
                    n.kind
                )));
            }
            if n.recipient_id.is_empty() || n.request_id.is_empty() {
                return Err(MedshiftError::Validation(
                    "notification requires recipient_id and request_id".to_string(),
                ));
            }
        }
        match self {
            BusEvent::Message { channel, event, .. } if channel.is_empty() || event.is_empty() => {
                Err(MedshiftError::Validation(
                    "message requires a channel and an event name".to_string(),
                ))
            }
            BusEvent::UserStatusChanged { channel, .. } if channel.is_empty() => Err(
                MedshiftError::Validation("presence event requires a channel".to_string()),
            ),
            BusEvent::RequestUpdated { request_id, .. } if request_id.is_empty() => Err(
                MedshiftError::Validation("request update requires a request_id".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medshift_core::RecipientRole;

    fn notification(kind: NotificationKind, recipient: &str) -> Notification {
        Notification {
            id: format!("n-{recipient}"),
            request_id: "r-1".to_string(),
            recipient_id: recipient.to_string(),
            recipient_type: RecipientRole::Responder,
            kind,
            title: "Urgent".to_string(),
            message: "Critical shift nearby".to_string(),
            read: false,
            action_ref: None,
            expires_at: None,
        }
    }

    #[test]
    fn notification_maps_to_matching_variant() {
        let e = BusEvent::from_notification(notification(NotificationKind::ResponseAccepted, "u"));
        assert_eq!(e.kind(), EventKind::ResponseAccepted);
        assert_eq!(e.channel(), NOTIFICATIONS_CHANNEL);
        assert_eq!(e.recipient_id(), Some("u"));
        e.validate().unwrap();
    }

    #[test]
    fn serialized_events_are_tagged() {
        let e = BusEvent::ConnectionStateChanged {
            state: ConnectionState::Connected,
            attempt: 0,
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "connection_state_changed");
        assert_eq!(v["state"], "connected");
        let back: BusEvent = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn payload_of_notification_event_is_the_wire_record() {
        let e = BusEvent::from_notification(notification(NotificationKind::NewRequest, "u"));
        let p = e.payload();
        assert_eq!(p["type"], "new_request");
        assert_eq!(p["recipient_id"], "u");
    }

    #[test]
    fn mismatched_notification_is_invalid() {
        let e = BusEvent::NewRequest {
            notification: notification(NotificationKind::ResponseRejected, "u"),
        };
        assert!(matches!(e.validate(), Err(MedshiftError::Validation(_))));
    }

    #[test]
    fn empty_message_channel_is_invalid() {
        let e = BusEvent::Message {
            channel: String::new(),
            event: "ping".to_string(),
            payload: serde_json::Value::Null,
        };
        assert!(e.validate().is_err());
        assert_eq!(user_channel("abc"), "user:abc");
    }
}
