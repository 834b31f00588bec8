// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credit ledger entry construction and consistency checks.
//!
//! Every balance movement produces exactly one [`CreditLedgerEntry`]. Debits
//! are paired with the request they paid for; grants carry no request id.
//! Entries for one requester form a chain where each `balance_before`
//! equals the previous `balance_after`.

use chrono::{DateTime, Utc};
use medshift_core::types::CreditLedgerEntry;
use medshift_core::MedshiftError;
use strum::{Display, EnumString};

/// Why a ledger entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum LedgerReason {
    /// Credits spent to admit an urgent request.
    RequestCost,
    /// Credits added to the account (purchase, promotion, refund).
    Grant,
}

/// Build the debit entry for admitting `request_id` at `cost` credits.
///
/// Fails with `InsufficientCredits` when `cost` exceeds `balance_before`,
/// so no entry with a negative balance can be constructed.
pub fn debit_entry(
    requester_id: &str,
    request_id: &str,
    balance_before: u32,
    cost: u32,
    at: DateTime<Utc>,
) -> Result<CreditLedgerEntry, MedshiftError> {
    let balance_after =
        balance_before
            .checked_sub(cost)
            .ok_or(MedshiftError::InsufficientCredits {
                balance: balance_before,
                cost,
            })?;
    Ok(CreditLedgerEntry {
        id: uuid::Uuid::new_v4().to_string(),
        requester_id: requester_id.to_string(),
        balance_before,
        balance_after,
        delta: -i64::from(cost),
        reason: LedgerReason::RequestCost.to_string(),
        request_id: Some(request_id.to_string()),
        created_at: at,
    })
}

/// Build the entry for adding `amount` credits.
pub fn grant_entry(
    requester_id: &str,
    balance_before: u32,
    amount: u32,
    note: &str,
    at: DateTime<Utc>,
) -> Result<CreditLedgerEntry, MedshiftError> {
    let balance_after = balance_before.checked_add(amount).ok_or_else(|| {
        MedshiftError::Validation(format!("grant of {amount} credits overflows the balance"))
    })?;
    let reason = if note.trim().is_empty() {
        LedgerReason::Grant.to_string()
    } else {
        format!("{}: {}", LedgerReason::Grant, note.trim())
    };
    Ok(CreditLedgerEntry {
        id: uuid::Uuid::new_v4().to_string(),
        requester_id: requester_id.to_string(),
        balance_before,
        balance_after,
        delta: i64::from(amount),
        reason,
        request_id: None,
        created_at: at,
    })
}

/// Aggregate view over one requester's ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub total_spent: u64,
    pub total_granted: u64,
    pub requests_admitted: usize,
    pub current_balance: u32,
}

impl LedgerSummary {
    /// Summarize entries ordered oldest first.
    pub fn from_entries(entries: &[CreditLedgerEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            if entry.delta < 0 {
                summary.total_spent += entry.delta.unsigned_abs();
            } else {
                summary.total_granted += entry.delta.unsigned_abs();
            }
            if entry.request_id.is_some() {
                summary.requests_admitted += 1;
            }
            summary.current_balance = entry.balance_after;
        }
        summary
    }
}

/// Check that entries (oldest first) form an unbroken, arithmetically
/// consistent chain.
pub fn verify_chain(entries: &[CreditLedgerEntry]) -> Result<(), MedshiftError> {
    let mut previous: Option<&CreditLedgerEntry> = None;
    for entry in entries {
        let expected_after = i64::from(entry.balance_before) + entry.delta;
        if expected_after != i64::from(entry.balance_after) {
            return Err(MedshiftError::Internal(format!(
                "ledger entry {} does not balance: {} {:+} != {}",
                entry.id, entry.balance_before, entry.delta, entry.balance_after
            )));
        }
        if let Some(prev) = previous
            && prev.balance_after != entry.balance_before
        {
            return Err(MedshiftError::Internal(format!(
                "ledger entry {} starts at {} but previous entry {} ended at {}",
                entry.id, entry.balance_before, prev.id, prev.balance_after
            )));
        }
        previous = Some(entry);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_entry_records_negative_delta() {
        let e = debit_entry("req-owner", "r-1", 20, 20, Utc::now()).unwrap();
        assert_eq!(e.balance_before, 20);
        assert_eq!(e.balance_after, 0);
        assert_eq!(e.delta, -20);
        assert_eq!(e.reason, "request_cost");
        assert_eq!(e.request_id.as_deref(), Some("r-1"));
    }

    #[test]
    fn debit_beyond_balance_fails() {
        let err = debit_entry("req-owner", "r-1", 12, 15, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            MedshiftError::InsufficientCredits {
                balance: 12,
                cost: 15
            }
        ));
    }

    #[test]
    fn grant_entry_includes_note() {
        let e = grant_entry("req-owner", 5, 100, "starter pack", Utc::now()).unwrap();
        assert_eq!(e.balance_after, 105);
        assert_eq!(e.delta, 100);
        assert_eq!(e.reason, "grant: starter pack");
        assert!(e.request_id.is_none());
    }

    #[test]
    fn summary_and_chain_over_mixed_entries() {
        let now = Utc::now();
        let g = grant_entry("o", 0, 50, "", now).unwrap();
        let d1 = debit_entry("o", "r-1", 50, 20, now).unwrap();
        let d2 = debit_entry("o", "r-2", 30, 10, now).unwrap();
        let entries = vec![g, d1, d2];

        verify_chain(&entries).unwrap();
        let s = LedgerSummary::from_entries(&entries);
        assert_eq!(s.total_granted, 50);
        assert_eq!(s.total_spent, 30);
        assert_eq!(s.requests_admitted, 2);
        assert_eq!(s.current_balance, 20);
    }

    #[test]
    fn broken_chain_is_detected() {
        let now = Utc::now();
        let d1 = debit_entry("o", "r-1", 50, 20, now).unwrap();
        let d2 = debit_entry("o", "r-2", 40, 10, now).unwrap();
        let err = verify_chain(&[d1, d2]).unwrap_err();
        assert!(err.to_string().contains("previous entry"));
    }
}
