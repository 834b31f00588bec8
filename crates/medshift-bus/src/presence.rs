// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Presence state for one channel.
//!
//! The realtime service pushes a full `sync` followed by incremental
//! `join`/`leave` deltas. The tracker folds them into the current online
//! set and turns each into a `user_status_changed` event.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use medshift_core::types::PresenceMeta;

use crate::event::{BusEvent, PresenceChange};

pub struct PresenceTracker {
    channel: String,
    online: Mutex<BTreeMap<String, PresenceMeta>>,
}

impl PresenceTracker {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            online: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Replace the online set. The event carries the full set.
    pub fn sync(&self, state: Vec<PresenceMeta>) -> BusEvent {
        let mut online = self.online.lock().unwrap_or_else(PoisonError::into_inner);
        online.clear();
        for meta in state {
            online.insert(meta.user_id.clone(), meta);
        }
        self.event(PresenceChange::Sync, online.values().cloned().collect())
    }

    /// Add identities. The event carries only the joined delta.
    pub fn join(&self, joined: Vec<PresenceMeta>) -> BusEvent {
        let mut online = self.online.lock().unwrap_or_else(PoisonError::into_inner);
        for meta in &joined {
            online.insert(meta.user_id.clone(), meta.clone());
        }
        self.event(PresenceChange::Join, joined)
    }

    /// Remove identities. The event carries only the departed delta.
    pub fn leave(&self, left: Vec<PresenceMeta>) -> BusEvent {
        let mut online = self.online.lock().unwrap_or_else(PoisonError::into_inner);
        for meta in &left {
            online.remove(&meta.user_id);
        }
        self.event(PresenceChange::Leave, left)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(user_id)
    }

    /// Online identities ordered by user id.
    pub fn online_users(&self) -> Vec<PresenceMeta> {
        self.online
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn reset(&self) {
        self.online
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn event(&self, change: PresenceChange, users: Vec<PresenceMeta>) -> BusEvent {
        BusEvent::UserStatusChanged {
            channel: self.channel.clone(),
            change,
            users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use medshift_core::RecipientRole;

    fn meta(user: &str) -> PresenceMeta {
        PresenceMeta {
            user_id: user.to_string(),
            role: Some(RecipientRole::Responder),
            online_at: Utc::now(),
        }
    }

    #[test]
    fn sync_replaces_and_reports_full_set() {
        let tracker = PresenceTracker::new("online_users");
        tracker.join(vec![meta("stale")]);
        let event = tracker.sync(vec![meta("b"), meta("a")]);
        match event {
            BusEvent::UserStatusChanged { change, users, .. } => {
                assert_eq!(change, PresenceChange::Sync);
                let ids: Vec<_> = users.iter().map(|u| u.user_id.as_str()).collect();
                assert_eq!(ids, vec!["a", "b"]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!tracker.is_online("stale"));
    }

    #[test]
    fn join_and_leave_report_deltas() {
        let tracker = PresenceTracker::new("online_users");
        tracker.sync(vec![meta("a")]);
        let joined = tracker.join(vec![meta("b")]);
        assert!(matches!(
            &joined,
            BusEvent::UserStatusChanged { change: PresenceChange::Join, users, .. } if users.len() == 1
        ));
        assert_eq!(tracker.online_users().len(), 2);

        tracker.leave(vec![meta("a")]);
        assert!(!tracker.is_online("a"));
        assert!(tracker.is_online("b"));
        tracker.reset();
        assert!(tracker.online_users().is_empty());
    }
}
