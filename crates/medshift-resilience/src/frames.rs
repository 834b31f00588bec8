// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Translation of server-pushed frames into bus events.

use medshift_bus::{BusEvent, PresenceTracker};
use medshift_core::types::{ChangeEvent, InboundFrame, Notification};
use medshift_core::{NotificationKind, RequestStatus};

/// What the inbound pump should do with one frame.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    Event(BusEvent),
    /// The server dropped the connection.
    Closed(String),
    Ignored(&'static str),
}

/// Map a frame onto the bus vocabulary, updating presence state as a side effect.
pub fn translate(frame: InboundFrame, presence: &PresenceTracker) -> Inbound {
    match frame {
        InboundFrame::Change {
            table,
            event,
            record,
            channel,
        } => match table.as_str() {
            "notifications" => match serde_json::from_value::<Notification>(record) {
                Ok(notification) => Inbound::Event(BusEvent::from_notification(notification)),
                Err(_) => Inbound::Ignored("malformed notification record"),
            },
            "urgent_requests" if event != ChangeEvent::Delete => {
                let id = record.get("id").and_then(|v| v.as_str()).map(str::to_string);
                let status = record
                    .get("status")
                    .cloned()
                    .and_then(|v| serde_json::from_value::<RequestStatus>(v).ok());
                match (id, status) {
                    (Some(request_id), Some(status)) => {
                        Inbound::Event(BusEvent::RequestUpdated { request_id, status })
                    }
                    _ => Inbound::Ignored("request change without id or status"),
                }
            }
            _ => Inbound::Event(BusEvent::Message {
                channel,
                event: event.to_string(),
                payload: record,
            }),
        },
        InboundFrame::Broadcast {
            channel,
            event,
            payload,
        } => match event.parse::<NotificationKind>() {
            Ok(kind) => match serde_json::from_value::<Notification>(payload) {
                Ok(notification) if notification.kind == kind => {
                    Inbound::Event(BusEvent::from_notification(notification))
                }
                _ => Inbound::Ignored("malformed notification broadcast"),
            },
            Err(_) => Inbound::Event(BusEvent::Message {
                channel,
                event,
                payload,
            }),
        },
        InboundFrame::PresenceSync { channel, state } if channel == presence.channel() => {
            Inbound::Event(presence.sync(state))
        }
        InboundFrame::PresenceJoin { channel, joined } if channel == presence.channel() => {
            Inbound::Event(presence.join(joined))
        }
        InboundFrame::PresenceLeave { channel, left } if channel == presence.channel() => {
            Inbound::Event(presence.leave(left))
        }
        InboundFrame::PresenceSync { .. }
        | InboundFrame::PresenceJoin { .. }
        | InboundFrame::PresenceLeave { .. } => Inbound::Ignored("presence on untracked channel"),
        InboundFrame::Closed { reason } => Inbound::Closed(reason),
    }
}
