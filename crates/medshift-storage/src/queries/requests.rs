// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Urgent request admission, lookup, and status transitions.

use chrono::{DateTime, Utc};
use medshift_core::types::{CreditLedgerEntry, GeoPoint, RequestFilter, UrgentRequest};
use medshift_core::{MedshiftError, RequestStatus};
use medshift_cost::ledger::debit_entry;
use rusqlite::{params, params_from_iter, OptionalExtension, TransactionBehavior};

use super::credits::insert_ledger_entry;
use super::{get_enum, get_ts, ts};
use crate::database::{map_tr_err, Database};

pub(crate) const REQUEST_COLUMNS: &str = "id, requester_id, title, description, specialty, \
     urgency, latitude, longitude, location_text, hourly_rate, priority_boost, featured, \
     shift_start, shift_end, credits_spent, response_count, view_count, status, created_at, \
     expires_at";

pub(crate) fn request_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UrgentRequest> {
    Ok(UrgentRequest {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        specialty: row.get(4)?,
        urgency: get_enum(row, 5)?,
        location: GeoPoint::from_parts(row.get(6)?, row.get(7)?),
        location_text: row.get(8)?,
        hourly_rate: row.get(9)?,
        priority_boost: row.get(10)?,
        featured: row.get(11)?,
        shift_start: get_ts(row, 12)?,
        shift_end: get_ts(row, 13)?,
        credits_spent: row.get(14)?,
        response_count: row.get(15)?,
        view_count: row.get(16)?,
        status: get_enum(row, 17)?,
        created_at: get_ts(row, 18)?,
        expires_at: get_ts(row, 19)?,
    })
}

pub(crate) fn load_request(
    conn: &rusqlite::Connection,
    id: &str,
) -> rusqlite::Result<Option<UrgentRequest>> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM urgent_requests WHERE id = ?1"),
        params![id],
        request_from_row,
    )
    .optional()
}

/// Result of an admit attempt.
pub enum AdmitOutcome {
    Admitted(CreditLedgerEntry),
    InsufficientCredits { balance: u32 },
    NoAccount,
}

/// Debit the requester and insert the request in one transaction.
///
/// The balance update is conditional on `balance >= cost`; if it touches no
/// row nothing is written.
pub async fn admit(
    db: &Database,
    request: &UrgentRequest,
    cost: u32,
) -> Result<AdmitOutcome, MedshiftError> {
    let request = request.clone();
    db.connection()
        .call(move |conn| -> Result<AdmitOutcome, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let balance: Option<u32> = tx
                .query_row(
                    "SELECT balance FROM credit_accounts WHERE requester_id = ?1 AND active = 1",
                    params![request.requester_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(balance) = balance else {
                return Ok(AdmitOutcome::NoAccount);
            };
            let Ok(entry) = debit_entry(
                &request.requester_id,
                &request.id,
                balance,
                cost,
                request.created_at,
            ) else {
                return Ok(AdmitOutcome::InsufficientCredits { balance });
            };

            let debited = tx.execute(
                "UPDATE credit_accounts SET balance = balance - ?1, updated_at = ?2 \
                 WHERE requester_id = ?3 AND active = 1 AND balance >= ?1",
                params![cost, ts(&request.created_at), request.requester_id],
            )?;
            if debited != 1 {
                return Ok(AdmitOutcome::InsufficientCredits { balance });
            }

            let (latitude, longitude) = match request.location {
                Some(p) => (Some(p.latitude), Some(p.longitude)),
                None => (None, None),
            };
            tx.execute(
                &format!(
                    "INSERT INTO urgent_requests ({REQUEST_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                     ?17, ?18, ?19, ?20)"
                ),
                params![
                    request.id,
                    request.requester_id,
                    request.title,
                    request.description,
                    request.specialty,
                    request.urgency.to_string(),
                    latitude,
                    longitude,
                    request.location_text,
                    request.hourly_rate,
                    request.priority_boost,
                    request.featured,
                    ts(&request.shift_start),
                    ts(&request.shift_end),
                    cost,
                    0u32,
                    0u32,
                    RequestStatus::Open.to_string(),
                    ts(&request.created_at),
                    ts(&request.expires_at),
                ],
            )?;
            insert_ledger_entry(&tx, &entry)?;
            tx.commit()?;
            Ok(AdmitOutcome::Admitted(entry))
        })
        .await
        .map_err(map_tr_err)
}

/// Get a request by ID.
pub async fn get_request(db: &Database, id: &str) -> Result<Option<UrgentRequest>, MedshiftError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<UrgentRequest>, rusqlite::Error> {
            load_request(conn, &id)
        })
        .await
        .map_err(map_tr_err)
}

/// List requests matching `filter`, newest first.
pub async fn list_requests(
    db: &Database,
    filter: &RequestFilter,
) -> Result<Vec<UrgentRequest>, MedshiftError> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(status) = filter.status {
        values.push(status.to_string());
        clauses.push(format!("status = ?{}", values.len()));
    }
    if let Some(specialty) = &filter.specialty {
        values.push(specialty.clone());
        clauses.push(format!("specialty = ?{} COLLATE NOCASE", values.len()));
    }
    if let Some(requester_id) = &filter.requester_id {
        values.push(requester_id.clone());
        clauses.push(format!("requester_id = ?{}", values.len()));
    }
    let mut sql = format!("SELECT {REQUEST_COLUMNS} FROM urgent_requests");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC, rowid DESC");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    db.connection()
        .call(move |conn| -> Result<Vec<UrgentRequest>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), request_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Set `status = to` only when the current status is one of `from`.
pub async fn transition(
    db: &Database,
    id: &str,
    from: &[RequestStatus],
    to: RequestStatus,
) -> Result<bool, MedshiftError> {
    if from.is_empty() {
        return Ok(false);
    }
    let mut values = vec![to.to_string(), id.to_string()];
    let placeholders: Vec<String> = from
        .iter()
        .map(|status| {
            values.push(status.to_string());
            format!("?{}", values.len())
        })
        .collect();
    let sql = format!(
        "UPDATE urgent_requests SET status = ?1 WHERE id = ?2 AND status IN ({})",
        placeholders.join(", ")
    );
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Increment the view counter of an open request.
pub async fn increment_view_count(db: &Database, id: &str) -> Result<bool, MedshiftError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE urgent_requests SET view_count = view_count + 1 \
                 WHERE id = ?1 AND status = 'open'",
                params![id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Expire every open request whose expiry is before `now`.
pub async fn expire_before(db: &Database, now: DateTime<Utc>) -> Result<Vec<String>, MedshiftError> {
    let now = ts(&now);
    db.connection()
        .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM urgent_requests WHERE status = 'open' AND expires_at < ?1 \
                     ORDER BY expires_at ASC",
                )?;
                let rows = stmt.query_map(params![now], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            tx.execute(
                "UPDATE urgent_requests SET status = 'expired' \
                 WHERE status = 'open' AND expires_at < ?1",
                params![now],
            )?;
            tx.commit()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}
