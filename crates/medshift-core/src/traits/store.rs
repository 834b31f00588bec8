// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence boundary for requests, responses, credits, and notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MedshiftError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AcceptOutcome, CreditAccount, CreditLedgerEntry, Notification, RequestFilter, RequestStatus,
    ResponderProfile, Response, UrgentRequest,
};

/// Adapter for the external record store.
///
/// The core only relies on insert-with-return, filtered select, and
/// conditional update ("update where status = X"). Operations that touch
/// more than one row are committed as a single transaction so partial
/// results are never visible.
#[async_trait]
pub trait MarketplaceStore: PluginAdapter {
    /// Initializes the backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), MedshiftError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), MedshiftError>;

    // --- Credit accounts and ledger ---

    /// Create an active credit account. Fails if one already exists.
    async fn open_credit_account(
        &self,
        requester_id: &str,
        initial_balance: u32,
    ) -> Result<CreditAccount, MedshiftError>;

    async fn credit_account(
        &self,
        requester_id: &str,
    ) -> Result<Option<CreditAccount>, MedshiftError>;

    /// Add credits to an account and record a positive ledger entry.
    async fn grant_credits(
        &self,
        requester_id: &str,
        amount: u32,
        reason: &str,
    ) -> Result<CreditLedgerEntry, MedshiftError>;

    /// Ledger entries for a requester, oldest first.
    async fn ledger_entries(
        &self,
        requester_id: &str,
    ) -> Result<Vec<CreditLedgerEntry>, MedshiftError>;

    // --- Requests ---

    /// Atomically debit `cost` credits and insert `request` with its ledger entry.
    ///
    /// The debit is a conditional decrement (`balance >= cost`), so two
    /// concurrent admits can never both succeed against an insufficient
    /// balance. Fails with `InsufficientCredits` or `NoCreditAccount`
    /// without changing any state.
    async fn admit_request(
        &self,
        request: &UrgentRequest,
        cost: u32,
    ) -> Result<CreditLedgerEntry, MedshiftError>;

    async fn get_request(&self, id: &str) -> Result<Option<UrgentRequest>, MedshiftError>;

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<UrgentRequest>, MedshiftError>;

    /// Conditional status update: applies only when the current status is
    /// one of `from`. Returns whether a row changed.
    async fn transition_request(
        &self,
        id: &str,
        from: &[RequestStatus],
        to: RequestStatus,
    ) -> Result<bool, MedshiftError>;

    /// Increment the view counter of an open request.
    async fn increment_view_count(&self, id: &str) -> Result<bool, MedshiftError>;

    /// Expire every open request whose `expires_at` is before `now`.
    /// Returns the ids of expired requests.
    async fn expire_requests(&self, now: DateTime<Utc>) -> Result<Vec<String>, MedshiftError>;

    // --- Responses ---

    /// Insert a pending response and increment the parent's response count.
    ///
    /// Fails with `DuplicateResponse` if the (request, responder) pair
    /// already exists and with `RequestClosed` if the request is not open.
    async fn insert_response(&self, response: &Response) -> Result<(), MedshiftError>;

    async fn get_response(&self, id: &str) -> Result<Option<Response>, MedshiftError>;

    /// Responses for a request, oldest first.
    async fn responses_for_request(
        &self,
        request_id: &str,
    ) -> Result<Vec<Response>, MedshiftError>;

    /// Accept one response and reject every other pending response.
    ///
    /// In one transaction: target pending -> accepted, request open ->
    /// in_progress, other pending -> rejected with `reason`.
    async fn accept_response(
        &self,
        response_id: &str,
        reason: &str,
    ) -> Result<AcceptOutcome, MedshiftError>;

    /// Reject a single pending response. The request is left untouched.
    async fn reject_response(
        &self,
        response_id: &str,
        reason: Option<&str>,
    ) -> Result<Response, MedshiftError>;

    // --- Notifications ---

    async fn insert_notification(&self, notification: &Notification)
        -> Result<(), MedshiftError>;

    async fn notifications_for(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, MedshiftError>;

    async fn mark_notification_read(&self, id: &str) -> Result<bool, MedshiftError>;

    // --- Responder directory ---

    async fn upsert_responder(&self, profile: &ResponderProfile) -> Result<(), MedshiftError>;

    /// Responder profiles, optionally narrowed to one specialty.
    async fn responder_profiles(
        &self,
        specialty: Option<&str>,
    ) -> Result<Vec<ResponderProfile>, MedshiftError>;

    async fn get_responder(&self, id: &str) -> Result<Option<ResponderProfile>, MedshiftError>;
}
