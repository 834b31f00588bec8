// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response submission and the accept/reject transitions.

use chrono::{DateTime, Utc};
use medshift_core::types::{AcceptOutcome, Response};
use medshift_core::{MedshiftError, RequestStatus, ResponseStatus};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::requests::load_request;
use super::{get_enum, get_ts, get_ts_opt, ts, ts_opt};
use crate::database::{map_tr_err, Database};

const RESPONSE_COLUMNS: &str = "id, request_id, responder_id, responder_name, \
     responder_specialty, responder_rating, distance_km, kind, available_from, available_until, \
     counter_rate, message, status, rejection_reason, latency_secs, created_at, updated_at";

fn response_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Response> {
    Ok(Response {
        id: row.get(0)?,
        request_id: row.get(1)?,
        responder_id: row.get(2)?,
        responder_name: row.get(3)?,
        responder_specialty: row.get(4)?,
        responder_rating: row.get(5)?,
        distance_km: row.get(6)?,
        kind: get_enum(row, 7)?,
        available_from: get_ts_opt(row, 8)?,
        available_until: get_ts_opt(row, 9)?,
        counter_rate: row.get(10)?,
        message: row.get(11)?,
        status: get_enum(row, 12)?,
        rejection_reason: row.get(13)?,
        latency_secs: row.get(14)?,
        created_at: get_ts(row, 15)?,
        updated_at: get_ts(row, 16)?,
    })
}

fn load_response(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Response>> {
    conn.query_row(
        &format!("SELECT {RESPONSE_COLUMNS} FROM responses WHERE id = ?1"),
        params![id],
        response_from_row,
    )
    .optional()
}

fn load_responses(
    conn: &rusqlite::Connection,
    request_id: &str,
) -> rusqlite::Result<Vec<Response>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESPONSE_COLUMNS} FROM responses WHERE request_id = ?1 \
         ORDER BY created_at ASC, rowid ASC"
    ))?;
    let rows = stmt.query_map(params![request_id], response_from_row)?;
    rows.collect()
}

/// Result of inserting a response.
pub enum InsertOutcome {
    Inserted,
    MissingRequest,
    RequestClosed(RequestStatus),
    Duplicate,
}

/// Insert a pending response and bump the parent's response counter.
pub async fn insert(db: &Database, response: &Response) -> Result<InsertOutcome, MedshiftError> {
    let r = response.clone();
    db.connection()
        .call(move |conn| -> Result<InsertOutcome, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(request) = load_request(&tx, &r.request_id)? else {
                return Ok(InsertOutcome::MissingRequest);
            };
            if request.status != RequestStatus::Open {
                return Ok(InsertOutcome::RequestClosed(request.status));
            }
            let duplicate = tx
                .query_row(
                    "SELECT 1 FROM responses WHERE request_id = ?1 AND responder_id = ?2",
                    params![r.request_id, r.responder_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if duplicate {
                return Ok(InsertOutcome::Duplicate);
            }
            tx.execute(
                &format!(
                    "INSERT INTO responses ({RESPONSE_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    r.id,
                    r.request_id,
                    r.responder_id,
                    r.responder_name,
                    r.responder_specialty,
                    r.responder_rating,
                    r.distance_km,
                    r.kind.to_string(),
                    ts_opt(&r.available_from),
                    ts_opt(&r.available_until),
                    r.counter_rate,
                    r.message,
                    ResponseStatus::Pending.to_string(),
                    Option::<String>::None,
                    r.latency_secs,
                    ts(&r.created_at),
                    ts(&r.updated_at),
                ],
            )?;
            tx.execute(
                "UPDATE urgent_requests SET response_count = response_count + 1 WHERE id = ?1",
                params![r.request_id],
            )?;
            tx.commit()?;
            Ok(InsertOutcome::Inserted)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a response by ID.
pub async fn get_response(db: &Database, id: &str) -> Result<Option<Response>, MedshiftError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Response>, rusqlite::Error> {
            load_response(conn, &id)
        })
        .await
        .map_err(map_tr_err)
}

/// Responses for a request, oldest first.
pub async fn for_request(db: &Database, request_id: &str) -> Result<Vec<Response>, MedshiftError> {
    let request_id = request_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Response>, rusqlite::Error> {
            load_responses(conn, &request_id)
        })
        .await
        .map_err(map_tr_err)
}

/// Result of an accept attempt.
pub enum AcceptResult {
    Accepted(AcceptOutcome),
    MissingResponse,
    MissingRequest,
    AlreadyResolved {
        request_id: String,
        status: ResponseStatus,
    },
    RequestClosed {
        request_id: String,
        status: RequestStatus,
    },
}

/// Accept one response, move the request to in_progress, and reject every
/// other pending response, all in one transaction.
pub async fn accept(
    db: &Database,
    response_id: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<AcceptResult, MedshiftError> {
    let response_id = response_id.to_string();
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| -> Result<AcceptResult, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(target) = load_response(&tx, &response_id)? else {
                return Ok(AcceptResult::MissingResponse);
            };
            let request_id = target.request_id.clone();

            let winner_exists = tx
                .query_row(
                    "SELECT 1 FROM responses WHERE request_id = ?1 AND status = 'accepted'",
                    params![request_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if winner_exists {
                return Ok(AcceptResult::AlreadyResolved {
                    request_id,
                    status: ResponseStatus::Accepted,
                });
            }
            if target.status != ResponseStatus::Pending {
                return Ok(AcceptResult::AlreadyResolved {
                    request_id,
                    status: target.status,
                });
            }
            let Some(request) = load_request(&tx, &request_id)? else {
                return Ok(AcceptResult::MissingRequest);
            };
            if request.status != RequestStatus::Open {
                return Ok(AcceptResult::RequestClosed {
                    request_id,
                    status: request.status,
                });
            }

            let now = ts(&now);
            tx.execute(
                "UPDATE responses SET status = 'accepted', updated_at = ?1 \
                 WHERE id = ?2 AND status = 'pending'",
                params![now, response_id],
            )?;
            tx.execute(
                "UPDATE urgent_requests SET status = 'in_progress' \
                 WHERE id = ?1 AND status = 'open'",
                params![request_id],
            )?;
            let loser_ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM responses WHERE request_id = ?1 AND status = 'pending' \
                     ORDER BY created_at ASC, rowid ASC",
                )?;
                let rows = stmt.query_map(params![request_id], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            tx.execute(
                "UPDATE responses SET status = 'rejected', rejection_reason = ?1, updated_at = ?2 \
                 WHERE request_id = ?3 AND status = 'pending'",
                params![reason, now, request_id],
            )?;

            let request =
                load_request(&tx, &request_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            let accepted =
                load_response(&tx, &response_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            let rejected = load_responses(&tx, &request_id)?
                .into_iter()
                .filter(|r| loser_ids.contains(&r.id))
                .collect();
            tx.commit()?;
            Ok(AcceptResult::Accepted(AcceptOutcome {
                request,
                accepted,
                rejected,
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Result of a single reject.
pub enum RejectResult {
    Rejected(Response),
    MissingResponse,
    AlreadyResolved {
        request_id: String,
        status: ResponseStatus,
    },
}

/// Reject one pending response. The request is untouched.
pub async fn reject(
    db: &Database,
    response_id: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<RejectResult, MedshiftError> {
    let response_id = response_id.to_string();
    let reason = reason.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<RejectResult, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(target) = load_response(&tx, &response_id)? else {
                return Ok(RejectResult::MissingResponse);
            };
            if target.status != ResponseStatus::Pending {
                return Ok(RejectResult::AlreadyResolved {
                    request_id: target.request_id,
                    status: target.status,
                });
            }
            tx.execute(
                "UPDATE responses SET status = 'rejected', rejection_reason = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND status = 'pending'",
                params![reason, ts(&now), response_id],
            )?;
            let updated =
                load_response(&tx, &response_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok(RejectResult::Rejected(updated))
        })
        .await
        .map_err(map_tr_err)
}
