// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification persistence.

use chrono::Utc;
use medshift_core::types::Notification;
use medshift_core::MedshiftError;
use rusqlite::params;

use super::{get_enum, get_ts_opt, ts, ts_opt};
use crate::database::{map_tr_err, Database};

/// Insert a notification.
pub async fn insert(db: &Database, notification: &Notification) -> Result<(), MedshiftError> {
    let n = notification.clone();
    let created_at = ts(&Utc::now());
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO notifications (id, request_id, recipient_id, recipient_type, type, \
                 title, message, read, action_ref, expires_at, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    n.id,
                    n.request_id,
                    n.recipient_id,
                    n.recipient_type.to_string(),
                    n.kind.to_string(),
                    n.title,
                    n.message,
                    n.read,
                    n.action_ref,
                    ts_opt(&n.expires_at),
                    created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Notifications for a recipient, newest first.
pub async fn for_recipient(
    db: &Database,
    recipient_id: &str,
    unread_only: bool,
) -> Result<Vec<Notification>, MedshiftError> {
    let recipient_id = recipient_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Notification>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, request_id, recipient_id, recipient_type, type, title, message, read, \
                 action_ref, expires_at FROM notifications \
                 WHERE recipient_id = ?1 AND (?2 = 0 OR read = 0) \
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt.query_map(params![recipient_id, unread_only], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    request_id: row.get(1)?,
                    recipient_id: row.get(2)?,
                    recipient_type: get_enum(row, 3)?,
                    kind: get_enum(row, 4)?,
                    title: row.get(5)?,
                    message: row.get(6)?,
                    read: row.get(7)?,
                    action_ref: row.get(8)?,
                    expires_at: get_ts_opt(row, 9)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a notification read. Returns whether it was previously unread.
pub async fn mark_read(db: &Database, id: &str) -> Result<bool, MedshiftError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND read = 0",
                params![id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}
