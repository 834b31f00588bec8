// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credit account and ledger operations.

use chrono::{DateTime, Utc};
use medshift_core::types::{CreditAccount, CreditLedgerEntry};
use medshift_core::MedshiftError;
use medshift_cost::ledger::grant_entry;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::{get_ts, ts};
use crate::database::{map_tr_err, Database};

/// Result of opening an account.
pub enum OpenOutcome {
    Opened(CreditAccount),
    AlreadyExists,
}

/// Result of a grant.
pub enum GrantOutcome {
    Granted(CreditLedgerEntry),
    NoAccount,
    Overflow,
}

pub(crate) fn insert_ledger_entry(
    conn: &rusqlite::Connection,
    entry: &CreditLedgerEntry,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO credit_ledger (id, requester_id, balance_before, balance_after, delta, \
         reason, request_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id,
            entry.requester_id,
            entry.balance_before,
            entry.balance_after,
            entry.delta,
            entry.reason,
            entry.request_id,
            ts(&entry.created_at),
        ],
    )?;
    Ok(())
}

/// Create an active account. A positive opening balance is recorded as a grant.
pub async fn open_account(
    db: &Database,
    requester_id: &str,
    initial_balance: u32,
    now: DateTime<Utc>,
) -> Result<OpenOutcome, MedshiftError> {
    let opening = if initial_balance > 0 {
        Some(grant_entry(requester_id, 0, initial_balance, "opening balance", now)?)
    } else {
        None
    };
    let requester_id = requester_id.to_string();
    db.connection()
        .call(move |conn| -> Result<OpenOutcome, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let exists = tx
                .query_row(
                    "SELECT 1 FROM credit_accounts WHERE requester_id = ?1",
                    params![requester_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if exists {
                return Ok(OpenOutcome::AlreadyExists);
            }
            tx.execute(
                "INSERT INTO credit_accounts (requester_id, balance, active, created_at, updated_at) \
                 VALUES (?1, ?2, 1, ?3, ?3)",
                params![requester_id, initial_balance, ts(&now)],
            )?;
            if let Some(entry) = &opening {
                insert_ledger_entry(&tx, entry)?;
            }
            tx.commit()?;
            Ok(OpenOutcome::Opened(CreditAccount {
                requester_id,
                balance: initial_balance,
                active: true,
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Look up an account.
pub async fn get_account(
    db: &Database,
    requester_id: &str,
) -> Result<Option<CreditAccount>, MedshiftError> {
    let requester_id = requester_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<CreditAccount>, rusqlite::Error> {
            conn.query_row(
                "SELECT requester_id, balance, active FROM credit_accounts WHERE requester_id = ?1",
                params![requester_id],
                |row| {
                    Ok(CreditAccount {
                        requester_id: row.get(0)?,
                        balance: row.get(1)?,
                        active: row.get(2)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Add credits to an active account and record the ledger entry.
pub async fn grant(
    db: &Database,
    requester_id: &str,
    amount: u32,
    note: &str,
    now: DateTime<Utc>,
) -> Result<GrantOutcome, MedshiftError> {
    let requester_id = requester_id.to_string();
    let note = note.to_string();
    db.connection()
        .call(move |conn| -> Result<GrantOutcome, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let balance: Option<u32> = tx
                .query_row(
                    "SELECT balance FROM credit_accounts WHERE requester_id = ?1 AND active = 1",
                    params![requester_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(balance) = balance else {
                return Ok(GrantOutcome::NoAccount);
            };
            let Ok(entry) = grant_entry(&requester_id, balance, amount, &note, now) else {
                return Ok(GrantOutcome::Overflow);
            };
            tx.execute(
                "UPDATE credit_accounts SET balance = ?1, updated_at = ?2 WHERE requester_id = ?3",
                params![entry.balance_after, ts(&now), requester_id],
            )?;
            insert_ledger_entry(&tx, &entry)?;
            tx.commit()?;
            Ok(GrantOutcome::Granted(entry))
        })
        .await
        .map_err(map_tr_err)
}

/// Ledger entries for a requester, oldest first.
pub async fn ledger_entries(
    db: &Database,
    requester_id: &str,
) -> Result<Vec<CreditLedgerEntry>, MedshiftError> {
    let requester_id = requester_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<CreditLedgerEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, requester_id, balance_before, balance_after, delta, reason, \
                 request_id, created_at FROM credit_ledger WHERE requester_id = ?1 \
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![requester_id], |row| {
                Ok(CreditLedgerEntry {
                    id: row.get(0)?,
                    requester_id: row.get(1)?,
                    balance_before: row.get(2)?,
                    balance_after: row.get(3)?,
                    delta: row.get(4)?,
                    reason: row.get(5)?,
                    request_id: row.get(6)?,
                    created_at: get_ts(row, 7)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
