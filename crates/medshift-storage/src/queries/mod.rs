// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for operations on storage entities.
//!
//! Multi-row operations return a small outcome enum from inside the
//! connection closure; the adapter maps outcomes to `MedshiftError`.

pub mod credits;
pub mod notifications;
pub mod requests;
pub mod responders;
pub mod responses;

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;

/// Encode a timestamp for storage.
///
/// Full nanosecond precision at a fixed width, so stored values compare
/// equal to what callers hold and still sort as text.
pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn ts_opt(at: &Option<DateTime<Utc>>) -> Option<String> {
    at.as_ref().map(ts)
}

/// Decode a stored timestamp from column `idx`.
pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn get_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

pub(crate) fn get_ts_opt(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_ts(idx, &r)).transpose()
}

/// Decode a strum-backed enum stored as text.
pub(crate) fn get_enum<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
