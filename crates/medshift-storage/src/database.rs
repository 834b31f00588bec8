// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use medshift_core::MedshiftError;
use tracing::debug;

use crate::migrations::run_migrations;

/// Convert a tokio-rusqlite error into `MedshiftError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> MedshiftError {
    MedshiftError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the single SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, MedshiftError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| MedshiftError::Storage {
                source: Box::new(e),
            })?;
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| MedshiftError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        debug!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database with the full schema applied.
    pub async fn open_in_memory() -> Result<Self, MedshiftError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| MedshiftError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), MedshiftError> {
        self.conn
            .call(
                move |conn| -> Result<Result<(), MedshiftError>, rusqlite::Error> {
                    if wal_mode {
                        let mode: String =
                            conn.query_row("PRAGMA journal_mode=WAL;", [], |row| row.get(0))?;
                        debug!(journal_mode = %mode, "journal mode set");
                        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
                    }
                    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
                    conn.busy_timeout(Duration::from_secs(5))?;
                    Ok(run_migrations(conn))
                },
            )
            .await
            .map_err(map_tr_err)?
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL so the main database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), MedshiftError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_parent_dirs_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("medshift.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        assert!(path.exists());

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();
        for expected in [
            "credit_accounts",
            "credit_ledger",
            "notifications",
            "responder_profiles",
            "responses",
            "urgent_requests",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn reopening_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medshift.db");
        let path = path.to_str().unwrap();
        Database::open(path, true).await.unwrap();
        let db = Database::open(path, true).await.unwrap();
        db.checkpoint().await.unwrap();
    }
}
