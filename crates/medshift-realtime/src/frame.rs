// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire codec for realtime channel frames.
//!
//! Client -> Server:
//! ```json
//! {"topic": "realtime:notifications", "event": "phx_join", "payload": {"config": {...}}, "ref": "1"}
//! {"topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": "2"}
//! {"topic": "realtime:user:42", "event": "broadcast", "payload": {"type": "broadcast", "event": "ping", "payload": {}}, "ref": "3"}
//! ```
//!
//! Server -> Client:
//! ```json
//! {"topic": "realtime:notifications", "event": "phx_reply", "payload": {"status": "ok", "response": {}}, "ref": "1"}
//! {"topic": "realtime:notifications", "event": "postgres_changes", "payload": {"data": {"table": "notifications", "type": "INSERT", "record": {...}}}, "ref": null}
//! {"topic": "realtime:online_users", "event": "presence_diff", "payload": {"joins": {...}, "leaves": {...}}, "ref": null}
//! ```

use std::str::FromStr;

use medshift_core::types::{ChangeEvent, ChannelFilter, InboundFrame, PresenceMeta};
use medshift_core::MedshiftError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Topic used for connection-level messages.
pub const PHOENIX_TOPIC: &str = "phoenix";

const TOPIC_PREFIX: &str = "realtime:";

pub mod events {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const CLOSE: &str = "phx_close";
    pub const ERROR: &str = "phx_error";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const BROADCAST: &str = "broadcast";
    pub const PRESENCE: &str = "presence";
    pub const PRESENCE_STATE: &str = "presence_state";
    pub const PRESENCE_DIFF: &str = "presence_diff";
    pub const CHANGES: &str = "postgres_changes";
}

/// One frame in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Frame {
    pub fn new(topic: impl Into<String>, event: &str, payload: Value, reference: String) -> Self {
        Self {
            topic: topic.into(),
            event: event.to_string(),
            payload,
            reference: Some(reference),
        }
    }

    pub fn encode(&self) -> Result<String, MedshiftError> {
        serde_json::to_string(self)
            .map_err(|e| MedshiftError::Internal(format!("frame encoding failed: {e}")))
    }

    pub fn decode(text: &str) -> Result<Self, MedshiftError> {
        serde_json::from_str(text).map_err(|e| MedshiftError::Transport {
            message: "malformed frame from realtime service".to_string(),
            source: Some(Box::new(e)),
        })
    }

    /// For a `phx_reply`, the acknowledged ref and whether the server
    /// accepted the request (`Err` carries the server's reason).
    pub fn reply(&self) -> Option<(&str, Result<(), String>)> {
        if self.event != events::REPLY {
            return None;
        }
        let reference = self.reference.as_deref()?;
        let status = self.payload.get("status").and_then(Value::as_str);
        let result = match status {
            Some("ok") => Ok(()),
            _ => Err(self
                .payload
                .pointer("/response/reason")
                .and_then(Value::as_str)
                .or(status)
                .unwrap_or("request refused")
                .to_string()),
        };
        Some((reference, result))
    }
}

pub fn topic_for(channel: &str) -> String {
    format!("{TOPIC_PREFIX}{channel}")
}

/// Channel name of a topic. Topics outside the `realtime:` namespace map to themselves.
pub fn channel_of(topic: &str) -> &str {
    topic.strip_prefix(TOPIC_PREFIX).unwrap_or(topic)
}

/// Join payload for `channel` with an optional change filter.
pub fn join_payload(filter: &ChannelFilter, presence_key: &str) -> Value {
    let changes = match &filter.table {
        Some(table) => {
            let mut spec = json!({
                "event": filter.event.unwrap_or(ChangeEvent::All).to_string(),
                "schema": "public",
                "table": table,
            });
            if let Some(row_filter) = &filter.row_filter {
                spec["filter"] = Value::String(row_filter.clone());
            }
            vec![spec]
        }
        None => Vec::new(),
    };
    json!({
        "config": {
            "broadcast": { "self": false, "ack": false },
            "presence": { "key": presence_key },
            "postgres_changes": changes,
        }
    })
}

pub fn broadcast_payload(event: &str, payload: Value) -> Value {
    json!({ "type": "broadcast", "event": event, "payload": payload })
}

pub fn track_payload(meta: Value) -> Value {
    json!({ "type": "presence", "event": "track", "payload": meta })
}

pub fn untrack_payload() -> Value {
    json!({ "type": "presence", "event": "untrack" })
}

/// Flatten a presence map `{key: {"metas": [meta, ...]}}` into metas.
fn presence_metas(map: Option<&Value>) -> Vec<PresenceMeta> {
    let Some(Value::Object(entries)) = map else {
        return Vec::new();
    };
    entries
        .values()
        .filter_map(|entry| entry.get("metas").and_then(Value::as_array))
        .flatten()
        .filter_map(|meta| serde_json::from_value::<PresenceMeta>(meta.clone()).ok())
        .collect()
}

/// Translate a server push into zero or more [`InboundFrame`]s.
///
/// Replies and frames the client has no use for yield nothing. A presence
/// diff yields a join and a leave when it carries both.
pub fn to_inbound(frame: Frame) -> Vec<InboundFrame> {
    let channel = channel_of(&frame.topic).to_string();
    match frame.event.as_str() {
        events::CHANGES => change_frame(channel, &frame.payload).into_iter().collect(),
        events::BROADCAST => vec![InboundFrame::Broadcast {
            channel,
            event: frame
                .payload
                .get("event")
                .and_then(Value::as_str)
                .unwrap_or(events::BROADCAST)
                .to_string(),
            payload: frame.payload.get("payload").cloned().unwrap_or(Value::Null),
        }],
        events::PRESENCE_STATE => vec![InboundFrame::PresenceSync {
            channel,
            state: presence_metas(Some(&frame.payload)),
        }],
        events::PRESENCE_DIFF => {
            let joined = presence_metas(frame.payload.get("joins"));
            let left = presence_metas(frame.payload.get("leaves"));
            let mut out = Vec::new();
            if !joined.is_empty() {
                out.push(InboundFrame::PresenceJoin {
                    channel: channel.clone(),
                    joined,
                });
            }
            if !left.is_empty() {
                out.push(InboundFrame::PresenceLeave { channel, left });
            }
            out
        }
        events::CLOSE | events::ERROR => vec![InboundFrame::Closed {
            reason: format!("{} on {}", frame.event, frame.topic),
        }],
        _ => Vec::new(),
    }
}

fn change_frame(channel: String, payload: &Value) -> Option<InboundFrame> {
    let data = payload.get("data")?;
    let table = data.get("table")?.as_str()?.to_string();
    let event = data
        .get("type")
        .and_then(Value::as_str)
        .and_then(|t| ChangeEvent::from_str(t).ok())?;
    let record = match event {
        ChangeEvent::Delete => data.get("old_record").cloned(),
        _ => data.get("record").cloned(),
    }
    .unwrap_or(Value::Null);
    Some(InboundFrame::Change {
        channel,
        table,
        event,
        record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_serializes_ref_field() {
        let f = Frame::new(PHOENIX_TOPIC, events::HEARTBEAT, json!({}), "7".to_string());
        let text = f.encode().unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["ref"], "7");
        assert_eq!(v["topic"], "phoenix");
        assert_eq!(Frame::decode(&text).unwrap(), f);
    }

    #[test]
    fn reply_reports_status() {
        let ok = Frame::decode(
            r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"3"}"#,
        )
        .unwrap();
        assert_eq!(ok.reply(), Some(("3", Ok(()))));

        let err = Frame::decode(
            r#"{"topic":"realtime:x","event":"phx_reply","payload":{"status":"error","response":{"reason":"unmatched topic"}},"ref":"4"}"#,
        )
        .unwrap();
        assert_eq!(err.reply(), Some(("4", Err("unmatched topic".to_string()))));
    }

    #[test]
    fn join_payload_carries_row_filter() {
        let filter = ChannelFilter::table("notifications").where_eq("recipient_id", "ana");
        let payload = join_payload(&filter, "ana");
        let change = &payload["config"]["postgres_changes"][0];
        assert_eq!(change["event"], "*");
        assert_eq!(change["table"], "notifications");
        assert_eq!(change["filter"], "recipient_id=eq.ana");
        assert_eq!(payload["config"]["presence"]["key"], "ana");

        let plain = join_payload(&ChannelFilter::default(), "ana");
        assert_eq!(plain["config"]["postgres_changes"], json!([]));
    }

    #[test]
    fn change_push_becomes_change_frame() {
        let frame = Frame::decode(
            r#"{"topic":"realtime:notifications","event":"postgres_changes",
                "payload":{"data":{"table":"notifications","type":"INSERT","record":{"id":"n-1"}}},"ref":null}"#,
        )
        .unwrap();
        match to_inbound(frame).as_slice() {
            [InboundFrame::Change {
                channel,
                table,
                event,
                record,
            }] => {
                assert_eq!(channel, "notifications");
                assert_eq!(table, "notifications");
                assert_eq!(*event, ChangeEvent::Insert);
                assert_eq!(record["id"], "n-1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn presence_frames_flatten_metas() {
        let meta = json!({"user_id": "ana", "role": "responder", "online_at": "2026-01-05T10:00:00Z"});
        let state = Frame {
            topic: topic_for("online_users"),
            event: events::PRESENCE_STATE.to_string(),
            payload: json!({"ana": {"metas": [meta.clone()]}}),
            reference: None,
        };
        match to_inbound(state).as_slice() {
            [InboundFrame::PresenceSync { channel, state }] => {
                assert_eq!(channel, "online_users");
                assert_eq!(state.len(), 1);
                assert_eq!(state[0].user_id, "ana");
            }
            other => panic!("unexpected {other:?}"),
        }

        let leave = Frame {
            topic: topic_for("online_users"),
            event: events::PRESENCE_DIFF.to_string(),
            payload: json!({"joins": {}, "leaves": {"ana": {"metas": [meta.clone()]}}}),
            reference: None,
        };
        assert!(matches!(
            to_inbound(leave).as_slice(),
            [InboundFrame::PresenceLeave { left, .. }] if left.len() == 1
        ));

        let both = Frame {
            topic: topic_for("online_users"),
            event: events::PRESENCE_DIFF.to_string(),
            payload: json!({"joins": {"ana": {"metas": [meta.clone()]}}, "leaves": {"ana": {"metas": [meta]}}}),
            reference: None,
        };
        assert!(matches!(
            to_inbound(both).as_slice(),
            [InboundFrame::PresenceJoin { .. }, InboundFrame::PresenceLeave { .. }]
        ));
    }

    #[test]
    fn broadcast_and_close_pushes() {
        let b = Frame {
            topic: topic_for("user:ana"),
            event: events::BROADCAST.to_string(),
            payload: broadcast_payload("new_request", json!({"id": "n-1"})),
            reference: None,
        };
        assert_eq!(
            to_inbound(b),
            vec![InboundFrame::Broadcast {
                channel: "user:ana".to_string(),
                event: "new_request".to_string(),
                payload: json!({"id": "n-1"}),
            }]
        );

        let close = Frame {
            topic: topic_for("user:ana"),
            event: events::ERROR.to_string(),
            payload: Value::Null,
            reference: None,
        };
        assert!(matches!(to_inbound(close).as_slice(), [InboundFrame::Closed { .. }]));

        let reply = Frame::new(PHOENIX_TOPIC, events::REPLY, json!({"status": "ok"}), "1".into());
        assert!(to_inbound(reply).is_empty());
    }

    #[test]
    fn channel_of_strips_namespace() {
        assert_eq!(channel_of("realtime:user:1"), "user:1");
        assert_eq!(channel_of("phoenix"), "phoenix");
    }
}
