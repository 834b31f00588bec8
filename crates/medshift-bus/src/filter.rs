// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel subscription filters.

use std::collections::BTreeMap;

use crate::event::{BusEvent, EventKind};

/// Criteria a channel subscriber applies to incoming events.
///
/// Every present criterion must match by exact equality. An empty filter
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub event: Option<EventKind>,
    pub recipient_id: Option<String>,
    /// Top-level payload keys and the exact values they must hold.
    pub custom: BTreeMap<String, serde_json::Value>,
}

impl EventFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn event(mut self, kind: EventKind) -> Self {
        self.event = Some(kind);
        self
    }

    pub fn recipient(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

/// Whether `event` satisfies every criterion in `filter`.
pub fn matches_filters(event: &BusEvent, filter: &EventFilter) -> bool {
    if filter.event.is_some_and(|kind| kind != event.kind()) {
        return false;
    }
    if let Some(recipient) = &filter.recipient_id
        && event.recipient_id() != Some(recipient.as_str())
    {
        return false;
    }
    if filter.custom.is_empty() {
        return true;
    }
    let payload = event.payload();
    filter
        .custom
        .iter()
        .all(|(key, expected)| payload.get(key) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use medshift_core::types::Notification;
    use medshift_core::{NotificationKind, RecipientRole};
    use serde_json::json;

    fn event(kind: NotificationKind, recipient: &str, request: &str) -> BusEvent {
        BusEvent::from_notification(Notification {
            id: "n-1".to_string(),
            request_id: request.to_string(),
            recipient_id: recipient.to_string(),
            recipient_type: RecipientRole::Requester,
            kind,
            title: "New response".to_string(),
            message: "Dr. A is available".to_string(),
            read: false,
            action_ref: None,
            expires_at: None,
        })
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches_filters(
            &event(NotificationKind::NewResponse, "owner", "r-1"),
            &EventFilter::any()
        ));
    }

    #[test]
    fn event_kind_and_recipient_must_match_exactly() {
        let e = event(NotificationKind::NewResponse, "owner", "r-1");
        assert!(matches_filters(
            &e,
            &EventFilter::any().event(EventKind::NewResponse).recipient("owner")
        ));
        assert!(!matches_filters(&e, &EventFilter::any().event(EventKind::NewRequest)));
        assert!(!matches_filters(&e, &EventFilter::any().recipient("own")));
    }

    #[test]
    fn custom_keys_compare_payload_values() {
        let e = event(NotificationKind::NewResponse, "owner", "r-1");
        assert!(matches_filters(&e, &EventFilter::any().with("request_id", "r-1")));
        assert!(!matches_filters(&e, &EventFilter::any().with("request_id", "r-2")));
        assert!(!matches_filters(&e, &EventFilter::any().with("missing", "x")));
    }

    #[test]
    fn recipient_filter_rejects_untargeted_events() {
        let e = BusEvent::Message {
            channel: "user:owner".to_string(),
            event: "ping".to_string(),
            payload: json!({"seq": 3}),
        };
        assert!(!matches_filters(&e, &EventFilter::any().recipient("owner")));
        assert!(matches_filters(&e, &EventFilter::any().with("seq", 3)));
    }
}
