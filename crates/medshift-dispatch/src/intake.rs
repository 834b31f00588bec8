// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request intake and the requester's credit account.
//!
//! Admission runs in two phases:
//!
//! 1. Validate, price, then hand the request to the store, which debits the
//!    balance and inserts the request and its ledger entry in one
//!    transaction.
//! 2. After commit, select the qualified responders and notify each one.
//!    Failures in this phase are logged and never roll back phase 1.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use medshift_bus::EventBus;
use medshift_config::model::MedshiftConfig;
use medshift_core::types::{CreditLedgerEntry, GeoPoint, NewUrgentRequest, UrgentRequest};
use medshift_core::{
    MarketplaceStore, MedshiftError, NotificationKind, RecipientRole, RequestStatus, Urgency,
};
use medshift_cost::{PriceBreakdown, PricingTable};
use medshift_matching::{select_candidates, CandidateQuery};
use tracing::{debug, info, warn};

use crate::notify::{NotificationDraft, Notifier};

/// Admits urgent requests against a requester's credit balance.
pub struct RequestIntake {
    store: Arc<dyn MarketplaceStore>,
    notifier: Notifier,
    pricing: PricingTable,
    audience: CandidateQuery,
}

/// Checked, normalized request fields.
struct ValidRequest {
    urgency: Urgency,
    location: Option<GeoPoint>,
    shift_start: DateTime<Utc>,
    shift_end: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

fn validate(fields: &NewUrgentRequest, now: DateTime<Utc>) -> Result<ValidRequest, MedshiftError> {
    let invalid = |msg: &str| Err(MedshiftError::Validation(msg.to_string()));

    if fields.specialty.trim().is_empty() {
        return invalid("specialty is required");
    }
    if !fields.hourly_rate.is_finite() || fields.hourly_rate <= 0.0 {
        return invalid("hourly rate must be positive");
    }
    let (Some(shift_start), Some(shift_end)) = (fields.shift_start, fields.shift_end) else {
        return invalid("shift start and end are required");
    };
    if shift_end <= shift_start {
        return invalid("shift must end after it starts");
    }
    let location = match (fields.latitude, fields.longitude) {
        (None, None) => None,
        (Some(lat), Some(lon)) => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                return invalid("coordinates are out of range");
            }
            Some(GeoPoint::new(lat, lon))
        }
        _ => return invalid("latitude and longitude must be given together"),
    };
    // A request nobody answered is moot once the shift has started.
    let expires_at = fields.expires_at.unwrap_or(shift_start);
    if expires_at <= now {
        return invalid("expiry must be in the future");
    }

    Ok(ValidRequest {
        urgency: fields.urgency.unwrap_or(Urgency::Normal),
        location,
        shift_start,
        shift_end,
        expires_at,
    })
}

impl RequestIntake {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        bus: Arc<EventBus>,
        config: &MedshiftConfig,
    ) -> Self {
        Self {
            notifier: Notifier::new(store.clone(), bus, config.dispatch.notification_ttl_hours),
            store,
            pricing: PricingTable::from(&config.pricing),
            audience: CandidateQuery {
                max_distance_km: config.dispatch.default_max_distance_km,
                ..CandidateQuery::default()
            },
        }
    }

    /// Itemized price of a request with these fields, without admitting it.
    pub fn quote(&self, fields: &NewUrgentRequest) -> PriceBreakdown {
        self.pricing.breakdown(
            fields.urgency.unwrap_or(Urgency::Normal),
            fields.priority_boost,
            fields.featured,
        )
    }

    /// Validate, price, debit, and persist a request, then notify its audience.
    pub async fn admit_request(
        &self,
        requester_id: &str,
        fields: NewUrgentRequest,
    ) -> Result<UrgentRequest, MedshiftError> {
        self.admit_request_at(requester_id, fields, Utc::now()).await
    }

    /// [`admit_request`](Self::admit_request) with an explicit clock.
    pub async fn admit_request_at(
        &self,
        requester_id: &str,
        fields: NewUrgentRequest,
        now: DateTime<Utc>,
    ) -> Result<UrgentRequest, MedshiftError> {
        if requester_id.trim().is_empty() {
            return Err(MedshiftError::Validation(
                "requester id is required".to_string(),
            ));
        }
        let valid = validate(&fields, now)?;

        match self.store.credit_account(requester_id).await? {
            Some(account) if account.active => {}
            _ => {
                return Err(MedshiftError::NoCreditAccount {
                    requester_id: requester_id.to_string(),
                });
            }
        }

        let cost = self
            .pricing
            .price(valid.urgency, fields.priority_boost, fields.featured);
        let specialty = fields.specialty.trim().to_string();
        let title = match fields.title.trim() {
            "" => format!("Urgent {specialty} coverage"),
            t => t.to_string(),
        };
        let request = UrgentRequest {
            id: uuid::Uuid::new_v4().to_string(),
            requester_id: requester_id.to_string(),
            title,
            description: fields.description,
            specialty,
            urgency: valid.urgency,
            location: valid.location,
            location_text: fields.location_text.trim().to_string(),
            hourly_rate: fields.hourly_rate,
            priority_boost: fields.priority_boost,
            featured: fields.featured,
            shift_start: valid.shift_start,
            shift_end: valid.shift_end,
            credits_spent: cost,
            response_count: 0,
            view_count: 0,
            status: RequestStatus::Open,
            created_at: now,
            expires_at: valid.expires_at,
        };

        let entry = self.store.admit_request(&request, cost).await?;
        info!(
            request_id = %request.id,
            requester_id,
            urgency = %request.urgency,
            cost,
            balance = entry.balance_after,
            "urgent request admitted"
        );

        self.notify_audience(&request).await;
        Ok(request)
    }

    async fn notify_audience(&self, request: &UrgentRequest) {
        let profiles = match self.store.responder_profiles(Some(&request.specialty)).await {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "could not load responder directory");
                return;
            }
        };
        let candidates = select_candidates(request, &profiles, &self.audience);
        let drafts = candidates
            .into_iter()
            .map(|c| NotificationDraft {
                kind: NotificationKind::NewRequest,
                request_id: request.id.clone(),
                recipient_id: c.profile.id,
                recipient_type: RecipientRole::Responder,
                title: format!("{} {} request", request.urgency, request.specialty),
                message: match c.distance_km {
                    Some(km) => format!(
                        "{} at {:.0}/h, {:.1} km away",
                        request.title, request.hourly_rate, km
                    ),
                    None => format!("{} at {:.0}/h", request.title, request.hourly_rate),
                },
                action_ref: Some(request.id.clone()),
            })
            .collect::<Vec<_>>();
        let audience = drafts.len();
        let delivered = self.notifier.deliver_all(drafts).await;
        debug!(request_id = %request.id, audience, delivered, "audience notified");
    }

    /// Open an active credit account with a starting balance.
    pub async fn open_account(
        &self,
        requester_id: &str,
        initial_balance: u32,
    ) -> Result<u32, MedshiftError> {
        let account = self
            .store
            .open_credit_account(requester_id, initial_balance)
            .await?;
        info!(requester_id, balance = account.balance, "credit account opened");
        Ok(account.balance)
    }

    /// Add credits and record the grant in the ledger.
    pub async fn grant_credits(
        &self,
        requester_id: &str,
        amount: u32,
        reason: &str,
    ) -> Result<CreditLedgerEntry, MedshiftError> {
        if amount == 0 {
            return Err(MedshiftError::Validation(
                "grant amount must be positive".to_string(),
            ));
        }
        let entry = self.store.grant_credits(requester_id, amount, reason).await?;
        info!(requester_id, amount, balance = entry.balance_after, "credits granted");
        Ok(entry)
    }

    pub async fn balance(&self, requester_id: &str) -> Result<u32, MedshiftError> {
        match self.store.credit_account(requester_id).await? {
            Some(account) if account.active => Ok(account.balance),
            _ => Err(MedshiftError::NoCreditAccount {
                requester_id: requester_id.to_string(),
            }),
        }
    }

    /// Ledger entries, oldest first.
    pub async fn ledger_history(
        &self,
        requester_id: &str,
    ) -> Result<Vec<CreditLedgerEntry>, MedshiftError> {
        self.store.ledger_entries(requester_id).await
    }
}
