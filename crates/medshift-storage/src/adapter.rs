// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the `MarketplaceStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use medshift_config::model::StorageConfig;
use medshift_core::types::{
    AcceptOutcome, CreditAccount, CreditLedgerEntry, Notification, RequestFilter,
    ResponderProfile, Response, UrgentRequest,
};
use medshift_core::{
    AdapterType, HealthStatus, MarketplaceStore, MedshiftError, PluginAdapter, RequestStatus,
};

use crate::database::{map_tr_err, Database};
use crate::queries;
use crate::queries::credits::{GrantOutcome, OpenOutcome};
use crate::queries::requests::AdmitOutcome;
use crate::queries::responses::{AcceptResult, InsertOutcome, RejectResult};

/// SQLite-backed marketplace store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily opened on the first call to
/// [`MarketplaceStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a new store with the given configuration.
    ///
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already-open database.
    pub fn with_database(config: StorageConfig, db: Database) -> Self {
        Self {
            config,
            db: OnceCell::from(db),
        }
    }

    fn db(&self) -> Result<&Database, MedshiftError> {
        self.db.get().ok_or_else(|| MedshiftError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MedshiftError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MedshiftError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl MarketplaceStore for SqliteStore {
    async fn initialize(&self) -> Result<(), MedshiftError> {
        if self.db.initialized() {
            return Ok(());
        }
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| MedshiftError::Storage {
            source: "storage already initialized".into(),
        })?;
        info!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), MedshiftError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Credit accounts and ledger ---

    async fn open_credit_account(
        &self,
        requester_id: &str,
        initial_balance: u32,
    ) -> Result<CreditAccount, MedshiftError> {
        match queries::credits::open_account(self.db()?, requester_id, initial_balance, Utc::now())
            .await?
        {
            OpenOutcome::Opened(account) => Ok(account),
            OpenOutcome::AlreadyExists => Err(MedshiftError::Validation(format!(
                "credit account for {requester_id} already exists"
            ))),
        }
    }

    async fn credit_account(
        &self,
        requester_id: &str,
    ) -> Result<Option<CreditAccount>, MedshiftError> {
        queries::credits::get_account(self.db()?, requester_id).await
    }

    async fn grant_credits(
        &self,
        requester_id: &str,
        amount: u32,
        reason: &str,
    ) -> Result<CreditLedgerEntry, MedshiftError> {
        match queries::credits::grant(self.db()?, requester_id, amount, reason, Utc::now()).await? {
            GrantOutcome::Granted(entry) => Ok(entry),
            GrantOutcome::NoAccount => Err(MedshiftError::NoCreditAccount {
                requester_id: requester_id.to_string(),
            }),
            GrantOutcome::Overflow => Err(MedshiftError::Validation(format!(
                "grant of {amount} credits overflows the balance"
            ))),
        }
    }

    async fn ledger_entries(
        &self,
        requester_id: &str,
    ) -> Result<Vec<CreditLedgerEntry>, MedshiftError> {
        queries::credits::ledger_entries(self.db()?, requester_id).await
    }

    // --- Requests ---

    async fn admit_request(
        &self,
        request: &UrgentRequest,
        cost: u32,
    ) -> Result<CreditLedgerEntry, MedshiftError> {
        match queries::requests::admit(self.db()?, request, cost).await? {
            AdmitOutcome::Admitted(entry) => Ok(entry),
            AdmitOutcome::InsufficientCredits { balance } => {
                Err(MedshiftError::InsufficientCredits { balance, cost })
            }
            AdmitOutcome::NoAccount => Err(MedshiftError::NoCreditAccount {
                requester_id: request.requester_id.clone(),
            }),
        }
    }

    async fn get_request(&self, id: &str) -> Result<Option<UrgentRequest>, MedshiftError> {
        queries::requests::get_request(self.db()?, id).await
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<UrgentRequest>, MedshiftError> {
        queries::requests::list_requests(self.db()?, filter).await
    }

    async fn transition_request(
        &self,
        id: &str,
        from: &[RequestStatus],
        to: RequestStatus,
    ) -> Result<bool, MedshiftError> {
        queries::requests::transition(self.db()?, id, from, to).await
    }

    async fn increment_view_count(&self, id: &str) -> Result<bool, MedshiftError> {
        queries::requests::increment_view_count(self.db()?, id).await
    }

    async fn expire_requests(&self, now: DateTime<Utc>) -> Result<Vec<String>, MedshiftError> {
        queries::requests::expire_before(self.db()?, now).await
    }

    // --- Responses ---

    async fn insert_response(&self, response: &Response) -> Result<(), MedshiftError> {
        match queries::responses::insert(self.db()?, response).await? {
            InsertOutcome::Inserted => Ok(()),
            InsertOutcome::MissingRequest => {
                Err(MedshiftError::not_found("request", &response.request_id))
            }
            InsertOutcome::RequestClosed(status) => Err(MedshiftError::RequestClosed {
                request_id: response.request_id.clone(),
                status,
            }),
            InsertOutcome::Duplicate => Err(MedshiftError::DuplicateResponse {
                request_id: response.request_id.clone(),
                responder_id: response.responder_id.clone(),
            }),
        }
    }

    async fn get_response(&self, id: &str) -> Result<Option<Response>, MedshiftError> {
        queries::responses::get_response(self.db()?, id).await
    }

    async fn responses_for_request(
        &self,
        request_id: &str,
    ) -> Result<Vec<Response>, MedshiftError> {
        queries::responses::for_request(self.db()?, request_id).await
    }

    async fn accept_response(
        &self,
        response_id: &str,
        reason: &str,
    ) -> Result<AcceptOutcome, MedshiftError> {
        match queries::responses::accept(self.db()?, response_id, reason, Utc::now()).await? {
            AcceptResult::Accepted(outcome) => Ok(outcome),
            AcceptResult::MissingResponse => Err(MedshiftError::not_found("response", response_id)),
            AcceptResult::MissingRequest => Err(MedshiftError::Internal(format!(
                "response {response_id} references a missing request"
            ))),
            AcceptResult::AlreadyResolved { request_id, status } => {
                Err(MedshiftError::AlreadyResolved { request_id, status })
            }
            AcceptResult::RequestClosed { request_id, status } => {
                Err(MedshiftError::RequestClosed { request_id, status })
            }
        }
    }

    async fn reject_response(
        &self,
        response_id: &str,
        reason: Option<&str>,
    ) -> Result<Response, MedshiftError> {
        match queries::responses::reject(self.db()?, response_id, reason, Utc::now()).await? {
            RejectResult::Rejected(response) => Ok(response),
            RejectResult::MissingResponse => Err(MedshiftError::not_found("response", response_id)),
            RejectResult::AlreadyResolved { request_id, status } => {
                Err(MedshiftError::AlreadyResolved { request_id, status })
            }
        }
    }

    // --- Notifications ---

    async fn insert_notification(
        &self,
        notification: &Notification,
    ) -> Result<(), MedshiftError> {
        queries::notifications::insert(self.db()?, notification).await
    }

    async fn notifications_for(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, MedshiftError> {
        queries::notifications::for_recipient(self.db()?, recipient_id, unread_only).await
    }

    async fn mark_notification_read(&self, id: &str) -> Result<bool, MedshiftError> {
        queries::notifications::mark_read(self.db()?, id).await
    }

    // --- Responder directory ---

    async fn upsert_responder(&self, profile: &ResponderProfile) -> Result<(), MedshiftError> {
        queries::responders::upsert(self.db()?, profile).await
    }

    async fn responder_profiles(
        &self,
        specialty: Option<&str>,
    ) -> Result<Vec<ResponderProfile>, MedshiftError> {
        queries::responders::list(self.db()?, specialty).await
    }

    async fn get_responder(&self, id: &str) -> Result<Option<ResponderProfile>, MedshiftError> {
        queries::responders::get(self.db()?, id).await
    }
}
