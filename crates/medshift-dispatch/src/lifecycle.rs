// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response submission and decisions.
//!
//! A request collects pending responses until its owner accepts one. The
//! accept commits the winner, moves the request to `in_progress`, and
//! rejects every other pending response in a single store transaction;
//! notifications go out only after that commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use medshift_bus::{BusEvent, EventBus};
use medshift_core::types::{
    AcceptOutcome, RequestFilter, Response, ResponseDecision, ResponseSubmission, UrgentRequest,
};
use medshift_core::{
    MarketplaceStore, MedshiftError, NotificationKind, RecipientRole, RequestStatus,
    ResponseStatus,
};
use medshift_matching::{distance_km, rank_requests, CandidateQuery, RankedRequest};
use tracing::{info, warn};

use crate::notify::{NotificationDraft, Notifier};

/// Reason recorded on responses rejected because another one was accepted.
pub const AUTO_REJECT_REASON: &str = "position filled";

/// Drives responses from submission to a single accepted outcome.
pub struct ResponseLifecycle {
    store: Arc<dyn MarketplaceStore>,
    notifier: Notifier,
}

impl ResponseLifecycle {
    pub fn new(store: Arc<dyn MarketplaceStore>, bus: Arc<EventBus>, ttl_hours: u32) -> Self {
        Self {
            notifier: Notifier::new(store.clone(), bus, ttl_hours),
            store,
        }
    }

    async fn load_request(&self, id: &str) -> Result<UrgentRequest, MedshiftError> {
        self.store
            .get_request(id)
            .await?
            .ok_or_else(|| MedshiftError::not_found("request", id))
    }

    async fn load_owned(
        &self,
        requester_id: &str,
        request_id: &str,
    ) -> Result<UrgentRequest, MedshiftError> {
        let request = self.load_request(request_id).await?;
        if request.requester_id != requester_id {
            return Err(MedshiftError::Forbidden(format!(
                "request {request_id} belongs to another requester"
            )));
        }
        Ok(request)
    }

    /// Submit a response on behalf of `responder_id`.
    pub async fn submit_response(
        &self,
        request_id: &str,
        responder_id: &str,
        submission: ResponseSubmission,
    ) -> Result<Response, MedshiftError> {
        self.submit_response_at(request_id, responder_id, submission, Utc::now())
            .await
    }

    /// [`submit_response`](Self::submit_response) with an explicit clock.
    pub async fn submit_response_at(
        &self,
        request_id: &str,
        responder_id: &str,
        submission: ResponseSubmission,
        now: DateTime<Utc>,
    ) -> Result<Response, MedshiftError> {
        let request = self.load_request(request_id).await?;
        if request.status != RequestStatus::Open {
            return Err(MedshiftError::RequestClosed {
                request_id: request.id,
                status: request.status,
            });
        }
        if request.is_expired_at(now) {
            return Err(MedshiftError::ExpiredRequest {
                request_id: request.id,
                expires_at: request.expires_at.to_rfc3339(),
            });
        }
        if let Some(rate) = submission.counter_rate
            && (!rate.is_finite() || rate <= 0.0)
        {
            return Err(MedshiftError::Validation(
                "counter rate must be positive".to_string(),
            ));
        }
        if let (Some(from), Some(until)) = (submission.available_from, submission.available_until)
            && until <= from
        {
            return Err(MedshiftError::Validation(
                "availability must end after it starts".to_string(),
            ));
        }
        let profile = self
            .store
            .get_responder(responder_id)
            .await?
            .ok_or_else(|| MedshiftError::not_found("responder", responder_id))?;

        let response = Response {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request.id.clone(),
            responder_id: profile.id.clone(),
            responder_name: profile.display_name.clone(),
            responder_specialty: profile.specialty.clone(),
            responder_rating: profile.rating,
            distance_km: distance_km(request.location, profile.location),
            kind: submission.kind,
            available_from: submission.available_from,
            available_until: submission.available_until,
            counter_rate: submission.counter_rate,
            message: submission.message,
            status: ResponseStatus::Pending,
            rejection_reason: None,
            latency_secs: (now - request.created_at).num_seconds().max(0),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_response(&response).await?;
        info!(
            request_id = %request.id,
            response_id = %response.id,
            responder_id,
            latency_secs = response.latency_secs,
            "response submitted"
        );

        let draft = NotificationDraft {
            kind: NotificationKind::NewResponse,
            request_id: request.id.clone(),
            recipient_id: request.requester_id.clone(),
            recipient_type: RecipientRole::Requester,
            title: "New response".to_string(),
            message: format!(
                "{} is {} for \"{}\"",
                response.responder_name, response.kind, request.title
            ),
            action_ref: Some(response.id.clone()),
        };
        if let Err(e) = self.notifier.deliver(draft).await {
            warn!(response_id = %response.id, error = %e, "new response notification failed");
        }
        Ok(response)
    }

    /// Apply the owner's decision to one response.
    pub async fn set_response_status(
        &self,
        requester_id: &str,
        response_id: &str,
        decision: ResponseDecision,
    ) -> Result<Response, MedshiftError> {
        match decision {
            ResponseDecision::Accepted => self
                .accept(requester_id, response_id)
                .await
                .map(|outcome| outcome.accepted),
            ResponseDecision::Rejected => self.reject(requester_id, response_id, None).await,
        }
    }

    async fn owning_request(
        &self,
        requester_id: &str,
        response_id: &str,
    ) -> Result<UrgentRequest, MedshiftError> {
        let response = self
            .store
            .get_response(response_id)
            .await?
            .ok_or_else(|| MedshiftError::not_found("response", response_id))?;
        self.load_owned(requester_id, &response.request_id).await
    }

    /// Accept one response; every other pending response is rejected.
    pub async fn accept(
        &self,
        requester_id: &str,
        response_id: &str,
    ) -> Result<AcceptOutcome, MedshiftError> {
        self.owning_request(requester_id, response_id).await?;
        let outcome = self
            .store
            .accept_response(response_id, AUTO_REJECT_REASON)
            .await?;
        info!(
            request_id = %outcome.request.id,
            response_id,
            rejected = outcome.rejected.len(),
            "response accepted"
        );

        let request = &outcome.request;
        let mut drafts = vec![NotificationDraft {
            kind: NotificationKind::ResponseAccepted,
            request_id: request.id.clone(),
            recipient_id: outcome.accepted.responder_id.clone(),
            recipient_type: RecipientRole::Responder,
            title: "You got the shift".to_string(),
            message: format!("Your response to \"{}\" was accepted", request.title),
            action_ref: Some(outcome.accepted.id.clone()),
        }];
        drafts.extend(outcome.rejected.iter().map(|loser| NotificationDraft {
            kind: NotificationKind::ResponseRejected,
            request_id: request.id.clone(),
            recipient_id: loser.responder_id.clone(),
            recipient_type: RecipientRole::Responder,
            title: "Position filled".to_string(),
            message: format!("\"{}\" has been filled by another responder", request.title),
            action_ref: Some(loser.id.clone()),
        }));
        self.notifier.deliver_all(drafts).await;
        self.publish_status(request.id.clone(), request.status);
        Ok(outcome)
    }

    /// Reject a single pending response. The request stays open.
    pub async fn reject(
        &self,
        requester_id: &str,
        response_id: &str,
        reason: Option<&str>,
    ) -> Result<Response, MedshiftError> {
        let request = self.owning_request(requester_id, response_id).await?;
        let response = self.store.reject_response(response_id, reason).await?;
        info!(request_id = %request.id, response_id, "response rejected");

        let draft = NotificationDraft {
            kind: NotificationKind::ResponseRejected,
            request_id: request.id.clone(),
            recipient_id: response.responder_id.clone(),
            recipient_type: RecipientRole::Responder,
            title: "Response declined".to_string(),
            message: match reason {
                Some(r) => format!("Your response to \"{}\" was declined: {r}", request.title),
                None => format!("Your response to \"{}\" was declined", request.title),
            },
            action_ref: Some(response.id.clone()),
        };
        if let Err(e) = self.notifier.deliver(draft).await {
            warn!(response_id, error = %e, "rejection notification failed");
        }
        Ok(response)
    }

    /// Cancel an open or in-progress request.
    pub async fn cancel_request(
        &self,
        requester_id: &str,
        request_id: &str,
    ) -> Result<UrgentRequest, MedshiftError> {
        self.close_request(
            requester_id,
            request_id,
            &[RequestStatus::Open, RequestStatus::InProgress],
            RequestStatus::Cancelled,
        )
        .await
    }

    /// Mark an in-progress request as filled.
    pub async fn mark_filled(
        &self,
        requester_id: &str,
        request_id: &str,
    ) -> Result<UrgentRequest, MedshiftError> {
        self.close_request(
            requester_id,
            request_id,
            &[RequestStatus::InProgress],
            RequestStatus::Filled,
        )
        .await
    }

    async fn close_request(
        &self,
        requester_id: &str,
        request_id: &str,
        from: &[RequestStatus],
        to: RequestStatus,
    ) -> Result<UrgentRequest, MedshiftError> {
        self.load_owned(requester_id, request_id).await?;
        if !self.store.transition_request(request_id, from, to).await? {
            // Lost a race or the status was never eligible; report what is there now.
            let current = self.load_request(request_id).await?;
            return Err(MedshiftError::RequestClosed {
                request_id: current.id,
                status: current.status,
            });
        }
        info!(request_id, status = %to, "request status changed");
        self.publish_status(request_id.to_string(), to);
        self.load_request(request_id).await
    }

    /// Count one view of an open request. Returns whether it was counted.
    pub async fn record_view(&self, request_id: &str) -> Result<bool, MedshiftError> {
        self.store.increment_view_count(request_id).await
    }

    /// Responses for a request, oldest first. Owner only.
    pub async fn responses_for(
        &self,
        requester_id: &str,
        request_id: &str,
    ) -> Result<Vec<Response>, MedshiftError> {
        self.load_owned(requester_id, request_id).await?;
        self.store.responses_for_request(request_id).await
    }

    /// The ranked feed of open, unexpired requests a responder sees.
    pub async fn feed(
        &self,
        responder_id: &str,
        query: &CandidateQuery,
    ) -> Result<Vec<RankedRequest>, MedshiftError> {
        let viewer = self
            .store
            .get_responder(responder_id)
            .await?
            .ok_or_else(|| MedshiftError::not_found("responder", responder_id))?;
        let now = Utc::now();
        let open: Vec<UrgentRequest> = self
            .store
            .list_requests(&RequestFilter {
                status: Some(RequestStatus::Open),
                ..RequestFilter::default()
            })
            .await?
            .into_iter()
            .filter(|r| !r.is_expired_at(now))
            .collect();
        Ok(rank_requests(&open, Some(&viewer), query))
    }

    fn publish_status(&self, request_id: String, status: RequestStatus) {
        let event = BusEvent::RequestUpdated { request_id, status };
        if let Err(e) = self.notifier.bus().publish(&event) {
            warn!(error = %e, "request status event rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::RequestIntake;
    use crate::testing::{self, fields, responder};
    use chrono::Duration;
    use medshift_bus::EventKind;
    use medshift_config::model::MedshiftConfig;
    use medshift_core::{ResponseKind, Urgency};
    use std::sync::Mutex;

    struct Fixture {
        store: Arc<dyn MarketplaceStore>,
        bus: Arc<EventBus>,
        intake: RequestIntake,
        lifecycle: ResponseLifecycle,
    }

    async fn fixture() -> Fixture {
        let store = testing::store().await;
        let bus = Arc::new(EventBus::new());
        let intake = RequestIntake::new(store.clone(), bus.clone(), &MedshiftConfig::default());
        let lifecycle = ResponseLifecycle::new(store.clone(), bus.clone(), 72);
        intake.open_account("clinic", 200).await.unwrap();
        for id in ["ana", "ben", "cho"] {
            store.upsert_responder(&responder(id, "ICU")).await.unwrap();
        }
        Fixture {
            store,
            bus,
            intake,
            lifecycle,
        }
    }

    async fn post(fx: &Fixture) -> UrgentRequest {
        let now = Utc::now();
        fx.intake
            .admit_request_at("clinic", fields("ICU", Urgency::Critical, now), now)
            .await
            .unwrap()
    }

    async fn respond(fx: &Fixture, request: &UrgentRequest, who: &str) -> Response {
        fx.lifecycle
            .submit_response(&request.id, who, ResponseSubmission::new(ResponseKind::Available))
            .await
            .unwrap()
    }

    fn record(bus: &EventBus, kind: EventKind) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _h = bus.subscribe(kind, move |event| {
            sink.lock()
                .unwrap()
                .push(event.recipient_id().unwrap_or_default().to_string());
            Ok(())
        });
        seen
    }

    #[tokio::test]
    async fn submission_snapshots_responder_and_notifies_requester() {
        let fx = fixture().await;
        let request = post(&fx).await;
        let new_responses = record(&fx.bus, EventKind::NewResponse);

        let response = respond(&fx, &request, "ana").await;

        assert_eq!(response.status, ResponseStatus::Pending);
        assert_eq!(response.responder_name, "Dr. ana");
        assert!(response.distance_km.unwrap() > 0.0);
        assert!(response.latency_secs >= 0);
        assert_eq!(*new_responses.lock().unwrap(), vec!["clinic"]);
        let stored = fx.store.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.response_count, 1);
    }

    #[tokio::test]
    async fn duplicate_response_is_rejected() {
        let fx = fixture().await;
        let request = post(&fx).await;
        respond(&fx, &request, "ana").await;

        let err = fx
            .lifecycle
            .submit_response(&request.id, "ana", ResponseSubmission::new(ResponseKind::Maybe))
            .await
            .unwrap_err();
        assert!(matches!(err, MedshiftError::DuplicateResponse { .. }));
        let stored = fx.store.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.response_count, 1);
    }

    #[tokio::test]
    async fn unknown_request_and_responder_are_not_found() {
        let fx = fixture().await;
        let err = fx
            .lifecycle
            .submit_response("missing", "ana", ResponseSubmission::new(ResponseKind::Maybe))
            .await
            .unwrap_err();
        assert!(matches!(err, MedshiftError::NotFound { kind: "request", .. }));

        let request = post(&fx).await;
        let err = fx
            .lifecycle
            .submit_response(&request.id, "ghost", ResponseSubmission::new(ResponseKind::Maybe))
            .await
            .unwrap_err();
        assert!(matches!(err, MedshiftError::NotFound { kind: "responder", .. }));
    }

    #[tokio::test]
    async fn late_response_is_expired() {
        let fx = fixture().await;
        let request = post(&fx).await;
        let late = request.expires_at + Duration::seconds(1);
        let err = fx
            .lifecycle
            .submit_response_at(
                &request.id,
                "ana",
                ResponseSubmission::new(ResponseKind::Interested),
                late,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MedshiftError::ExpiredRequest { .. }));
    }

    #[tokio::test]
    async fn response_at_the_expiry_instant_is_still_taken() {
        let fx = fixture().await;
        let request = post(&fx).await;
        let stored = fx.store.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.created_at, request.created_at);
        assert_eq!(stored.expires_at, request.expires_at);

        let response = fx
            .lifecycle
            .submit_response_at(
                &request.id,
                "ana",
                ResponseSubmission::new(ResponseKind::Available),
                request.expires_at,
            )
            .await
            .unwrap();
        assert_eq!(response.status, ResponseStatus::Pending);
    }

    #[tokio::test]
    async fn accept_resolves_request_and_rejects_the_rest() {
        let fx = fixture().await;
        let request = post(&fx).await;
        let a = respond(&fx, &request, "ana").await;
        let b = respond(&fx, &request, "ben").await;
        let c = respond(&fx, &request, "cho").await;
        let accepted = record(&fx.bus, EventKind::ResponseAccepted);
        let rejected = record(&fx.bus, EventKind::ResponseRejected);

        let winner = fx
            .lifecycle
            .set_response_status("clinic", &a.id, ResponseDecision::Accepted)
            .await
            .unwrap();

        assert_eq!(winner.status, ResponseStatus::Accepted);
        let stored = fx.store.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::InProgress);
        for loser in [&b, &c] {
            let r = fx.store.get_response(&loser.id).await.unwrap().unwrap();
            assert_eq!(r.status, ResponseStatus::Rejected);
            assert_eq!(r.rejection_reason.as_deref(), Some(AUTO_REJECT_REASON));
        }
        assert_eq!(*accepted.lock().unwrap(), vec!["ana"]);
        assert_eq!(*rejected.lock().unwrap(), vec!["ben", "cho"]);

        let err = fx
            .lifecycle
            .set_response_status("clinic", &b.id, ResponseDecision::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, MedshiftError::AlreadyResolved { .. }));
    }

    #[tokio::test]
    async fn only_the_owner_decides() {
        let fx = fixture().await;
        let request = post(&fx).await;
        let a = respond(&fx, &request, "ana").await;
        let err = fx
            .lifecycle
            .set_response_status("other-clinic", &a.id, ResponseDecision::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, MedshiftError::Forbidden(_)));
        let r = fx.store.get_response(&a.id).await.unwrap().unwrap();
        assert_eq!(r.status, ResponseStatus::Pending);
    }

    #[tokio::test]
    async fn reject_touches_only_the_target() {
        let fx = fixture().await;
        let request = post(&fx).await;
        let a = respond(&fx, &request, "ana").await;
        let b = respond(&fx, &request, "ben").await;
        let rejected = record(&fx.bus, EventKind::ResponseRejected);

        let r = fx
            .lifecycle
            .set_response_status("clinic", &a.id, ResponseDecision::Rejected)
            .await
            .unwrap();

        assert_eq!(r.status, ResponseStatus::Rejected);
        assert_eq!(*rejected.lock().unwrap(), vec!["ana"]);
        let other = fx.store.get_response(&b.id).await.unwrap().unwrap();
        assert_eq!(other.status, ResponseStatus::Pending);
        let stored = fx.store.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Open);

        let err = fx
            .lifecycle
            .set_response_status("clinic", &a.id, ResponseDecision::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, MedshiftError::AlreadyResolved { .. }));
    }

    #[tokio::test]
    async fn cancelled_request_refuses_responses() {
        let fx = fixture().await;
        let request = post(&fx).await;
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = updates.clone();
        let _h = fx.bus.subscribe(EventKind::RequestUpdated, move |event| {
            if let BusEvent::RequestUpdated { status, .. } = event {
                sink.lock().unwrap().push(*status);
            }
            Ok(())
        });

        let cancelled = fx
            .lifecycle
            .cancel_request("clinic", &request.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert_eq!(*updates.lock().unwrap(), vec![RequestStatus::Cancelled]);

        let err = fx
            .lifecycle
            .submit_response(&request.id, "ana", ResponseSubmission::new(ResponseKind::Available))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MedshiftError::RequestClosed {
                status: RequestStatus::Cancelled,
                ..
            }
        ));
        let err = fx
            .lifecycle
            .cancel_request("clinic", &request.id)
            .await
            .unwrap_err();
        assert!(matches!(err, MedshiftError::RequestClosed { .. }));
    }

    #[tokio::test]
    async fn filled_only_after_acceptance() {
        let fx = fixture().await;
        let request = post(&fx).await;
        let err = fx
            .lifecycle
            .mark_filled("clinic", &request.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MedshiftError::RequestClosed {
                status: RequestStatus::Open,
                ..
            }
        ));

        let a = respond(&fx, &request, "ana").await;
        fx.lifecycle.accept("clinic", &a.id).await.unwrap();
        let filled = fx.lifecycle.mark_filled("clinic", &request.id).await.unwrap();
        assert_eq!(filled.status, RequestStatus::Filled);
    }

    #[tokio::test]
    async fn views_and_listing() {
        let fx = fixture().await;
        let request = post(&fx).await;
        assert!(fx.lifecycle.record_view(&request.id).await.unwrap());
        assert!(fx.lifecycle.record_view(&request.id).await.unwrap());
        respond(&fx, &request, "ben").await;
        respond(&fx, &request, "ana").await;

        let listed = fx
            .lifecycle
            .responses_for("clinic", &request.id)
            .await
            .unwrap();
        let who: Vec<_> = listed.iter().map(|r| r.responder_id.as_str()).collect();
        assert_eq!(who, vec!["ben", "ana"]);
        assert!(matches!(
            fx.lifecycle.responses_for("ana", &request.id).await,
            Err(MedshiftError::Forbidden(_))
        ));
        let stored = fx.store.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.view_count, 2);
    }

    #[tokio::test]
    async fn feed_orders_open_requests_by_urgency() {
        let fx = fixture().await;
        let now = Utc::now();
        let normal = fx
            .intake
            .admit_request_at("clinic", fields("ICU", Urgency::Normal, now), now)
            .await
            .unwrap();
        let emergency = fx
            .intake
            .admit_request_at("clinic", fields("ICU", Urgency::Emergency, now), now)
            .await
            .unwrap();
        let closed = fx
            .intake
            .admit_request_at("clinic", fields("ICU", Urgency::Critical, now), now)
            .await
            .unwrap();
        fx.lifecycle.cancel_request("clinic", &closed.id).await.unwrap();

        let feed = fx
            .lifecycle
            .feed("ana", &CandidateQuery::default())
            .await
            .unwrap();
        let ids: Vec<_> = feed.iter().map(|r| r.request.id.clone()).collect();
        assert_eq!(ids, vec![emergency.id, normal.id]);
        assert!(feed.iter().all(|r| r.distance_km.is_some()));
    }
}
