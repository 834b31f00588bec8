// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Responder directory.

use chrono::Utc;
use medshift_core::types::{GeoPoint, ResponderProfile};
use medshift_core::MedshiftError;
use rusqlite::{params, OptionalExtension};

use super::ts;
use crate::database::{map_tr_err, Database};

const PROFILE_COLUMNS: &str = "id, display_name, specialty, rating, latitude, longitude, \
     location_text, min_hourly_rate, available";

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResponderProfile> {
    Ok(ResponderProfile {
        id: row.get(0)?,
        display_name: row.get(1)?,
        specialty: row.get(2)?,
        rating: row.get(3)?,
        location: GeoPoint::from_parts(row.get(4)?, row.get(5)?),
        location_text: row.get(6)?,
        min_hourly_rate: row.get(7)?,
        available: row.get(8)?,
    })
}

/// Insert or replace a responder profile.
pub async fn upsert(db: &Database, profile: &ResponderProfile) -> Result<(), MedshiftError> {
    let p = profile.clone();
    let updated_at = ts(&Utc::now());
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO responder_profiles (id, display_name, specialty, rating, latitude, \
                 longitude, location_text, min_hourly_rate, available, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                 ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name, \
                 specialty = excluded.specialty, rating = excluded.rating, \
                 latitude = excluded.latitude, longitude = excluded.longitude, \
                 location_text = excluded.location_text, \
                 min_hourly_rate = excluded.min_hourly_rate, available = excluded.available, \
                 updated_at = excluded.updated_at",
                params![
                    p.id,
                    p.display_name,
                    p.specialty,
                    p.rating,
                    p.location.map(|l| l.latitude),
                    p.location.map(|l| l.longitude),
                    p.location_text,
                    p.min_hourly_rate,
                    p.available,
                    updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Profiles in directory order, optionally narrowed to one specialty.
pub async fn list(
    db: &Database,
    specialty: Option<&str>,
) -> Result<Vec<ResponderProfile>, MedshiftError> {
    let specialty = specialty.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<Vec<ResponderProfile>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROFILE_COLUMNS} FROM responder_profiles \
                 WHERE ?1 IS NULL OR specialty = ?1 COLLATE NOCASE ORDER BY rowid ASC"
            ))?;
            let rows = stmt.query_map(params![specialty], profile_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Get one profile.
pub async fn get(db: &Database, id: &str) -> Result<Option<ResponderProfile>, MedshiftError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ResponderProfile>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM responder_profiles WHERE id = ?1"),
                params![id],
                profile_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
