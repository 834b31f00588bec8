// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the store, bus, transport, and dispatch crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Transport,
}

// --- Marketplace enums ---

/// Severity classification driving both ranking priority and price.
///
/// Variants are declared in ascending severity so the derived `Ord`
/// matches ranking order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    High,
    Critical,
    Emergency,
}

impl Urgency {
    /// All tiers in ascending severity.
    pub const ALL: [Urgency; 4] = [
        Urgency::Normal,
        Urgency::High,
        Urgency::Critical,
        Urgency::Emergency,
    ];
}

/// Lifecycle status of an urgent request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    InProgress,
    Filled,
    Expired,
    Cancelled,
}

impl RequestStatus {
    /// Whether the request can no longer change status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Filled | RequestStatus::Expired | RequestStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal, forward-only transition.
    ///
    /// open -> in_progress | expired | cancelled;
    /// in_progress -> filled | cancelled.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)
                | (Open, Expired)
                | (Open, Cancelled)
                | (InProgress, Filled)
                | (InProgress, Cancelled)
        )
    }
}

/// How a responder answered a request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Interested,
    Available,
    Maybe,
}

/// Decision status of a response.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Which marketplace party a notification is addressed to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    Requester,
    Responder,
}

/// Notification event kinds on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewRequest,
    NewResponse,
    ResponseAccepted,
    ResponseRejected,
}

// --- Records ---

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build a point only when both coordinates are present.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        Some(Self::new(latitude?, longitude?))
    }
}

/// A time-critical staffing request posted by a requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrgentRequest {
    pub id: String,
    pub requester_id: String,
    pub title: String,
    pub description: Option<String>,
    pub specialty: String,
    pub urgency: Urgency,
    pub location: Option<GeoPoint>,
    pub location_text: String,
    pub hourly_rate: f64,
    pub priority_boost: bool,
    pub featured: bool,
    pub shift_start: DateTime<Utc>,
    pub shift_end: DateTime<Utc>,
    pub credits_spent: u32,
    pub response_count: u32,
    pub view_count: u32,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UrgentRequest {
    /// Whether the request is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Caller-supplied fields for admitting a new request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUrgentRequest {
    pub title: String,
    pub description: Option<String>,
    pub specialty: String,
    pub urgency: Option<Urgency>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_text: String,
    pub hourly_rate: f64,
    pub priority_boost: bool,
    pub featured: bool,
    pub shift_start: Option<DateTime<Utc>>,
    pub shift_end: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A responder's answer to an urgent request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub request_id: String,
    pub responder_id: String,
    pub responder_name: String,
    pub responder_specialty: String,
    pub responder_rating: Option<f64>,
    pub distance_km: Option<f64>,
    pub kind: ResponseKind,
    pub available_from: Option<DateTime<Utc>>,
    pub available_until: Option<DateTime<Utc>>,
    pub counter_rate: Option<f64>,
    pub message: Option<String>,
    pub status: ResponseStatus,
    pub rejection_reason: Option<String>,
    pub latency_secs: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for submitting a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSubmission {
    pub kind: ResponseKind,
    pub available_from: Option<DateTime<Utc>>,
    pub available_until: Option<DateTime<Utc>>,
    pub counter_rate: Option<f64>,
    pub message: Option<String>,
}

impl ResponseSubmission {
    pub fn new(kind: ResponseKind) -> Self {
        Self {
            kind,
            available_from: None,
            available_until: None,
            counter_rate: None,
            message: None,
        }
    }
}

/// Outcome of an accept operation, committed as one transaction.
#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    pub request: UrgentRequest,
    pub accepted: Response,
    /// Responses that were pending and are now rejected.
    pub rejected: Vec<Response>,
}

/// Decision a requester can take on a pending response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ResponseDecision {
    Accepted,
    Rejected,
}

/// Prepaid credit balance owned by a requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    pub requester_id: String,
    pub balance: u32,
    pub active: bool,
}

/// One balance movement in the credit ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    pub id: String,
    pub requester_id: String,
    pub balance_before: u32,
    pub balance_after: u32,
    /// Negative for spend, positive for grants.
    pub delta: i64,
    pub reason: String,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted notification. Field names form the stable wire schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub request_id: String,
    pub recipient_id: String,
    pub recipient_type: RecipientRole,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub action_ref: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Responder directory entry used for qualification and ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderProfile {
    pub id: String,
    pub display_name: String,
    pub specialty: String,
    pub rating: Option<f64>,
    pub location: Option<GeoPoint>,
    pub location_text: String,
    pub min_hourly_rate: Option<f64>,
    pub available: bool,
}

/// Selection criteria for listing requests from the store.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub specialty: Option<String>,
    pub requester_id: Option<String>,
    pub limit: Option<usize>,
}

// --- Realtime transport types ---

/// Connection state of a realtime session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Row-change operations a channel subscription can listen for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    #[strum(serialize = "*")]
    #[serde(rename = "*")]
    All,
    Insert,
    Update,
    Delete,
}

/// Server-side filter attached to a channel subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFilter {
    pub event: Option<ChangeEvent>,
    pub table: Option<String>,
    /// Row filter in `column=eq.value` form.
    pub row_filter: Option<String>,
}

impl ChannelFilter {
    /// Listen for every change on `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            event: Some(ChangeEvent::All),
            table: Some(table.into()),
            row_filter: None,
        }
    }

    /// Narrow the filter to rows where `column` equals `value`.
    pub fn where_eq(mut self, column: &str, value: &str) -> Self {
        self.row_filter = Some(format!("{column}=eq.{value}"));
        self
    }

    /// Restrict to one change operation.
    pub fn on(mut self, event: ChangeEvent) -> Self {
        self.event = Some(event);
        self
    }
}

/// Presence metadata published by `track` for one connected identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMeta {
    pub user_id: String,
    pub role: Option<RecipientRole>,
    pub online_at: DateTime<Utc>,
}

/// Frames pushed by the realtime service into the client process.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// A row change on a subscribed table.
    Change {
        channel: String,
        table: String,
        event: ChangeEvent,
        record: serde_json::Value,
    },
    /// A broadcast message on a subscribed channel.
    Broadcast {
        channel: String,
        event: String,
        payload: serde_json::Value,
    },
    /// Full presence state for a channel.
    PresenceSync {
        channel: String,
        state: Vec<PresenceMeta>,
    },
    /// Identities that came online.
    PresenceJoin {
        channel: String,
        joined: Vec<PresenceMeta>,
    },
    /// Identities that went offline.
    PresenceLeave {
        channel: String,
        left: Vec<PresenceMeta>,
    },
    /// The server closed the connection or reported a channel error.
    Closed { reason: String },
}
