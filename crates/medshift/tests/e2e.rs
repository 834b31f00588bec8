// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete dispatch pipeline.
//!
//! Each test creates an isolated TestHarness with a temp SQLite database,
//! a mock realtime transport, and the dispatch components. Tests are
//! independent and order-insensitive.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use medshift_bus::{BusEvent, EventKind};
use medshift_core::types::ResponseDecision;
use medshift_core::{
    ConnectionState, MedshiftError, NotificationKind, RecipientRole,
    RequestStatus, ResponseKind, ResponseStatus, Urgency,
};
use medshift_matching::CandidateQuery;
use medshift_resilience::{ConnectionManager, Identity};
use medshift_test_utils::TestHarness;

// ---- Test 1: Critical request, two responders, one accept ----

#[tokio::test]
async fn critical_request_is_filled_by_first_accepted_responder() {
    let h = TestHarness::builder()
        .with_account("clinic", 20)
        .with_responder("ana", "ICU")
        .with_responder("ben", "ICU")
        .build()
        .await
        .unwrap();

    let request = h.post_request("clinic", "ICU", Urgency::Critical).await.unwrap();
    assert_eq!(request.credits_spent, 20);
    assert_eq!(request.status, RequestStatus::Open);
    assert_eq!(h.balance("clinic").await.unwrap(), 0);

    let a = h.respond(&request.id, "ana", ResponseKind::Available).await.unwrap();
    let b = h.respond(&request.id, "ben", ResponseKind::Interested).await.unwrap();

    h.lifecycle
        .set_response_status("clinic", &a.id, ResponseDecision::Accepted)
        .await
        .unwrap();

    let a = h.store.get_response(&a.id).await.unwrap().unwrap();
    let b = h.store.get_response(&b.id).await.unwrap().unwrap();
    assert_eq!(a.status, ResponseStatus::Accepted);
    assert_eq!(b.status, ResponseStatus::Rejected);
    assert_eq!(b.rejection_reason.as_deref(), Some("position filled"));
    let request = h.store.get_request(&request.id).await.unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::InProgress);
    assert_eq!(request.response_count, 2);
}

#[tokio::test]
async fn accept_notifies_winner_and_losers() {
    let h = TestHarness::builder()
        .with_account("clinic", 50)
        .with_responder("ana", "ICU")
        .with_responder("ben", "ICU")
        .with_responder("cam", "ICU")
        .build()
        .await
        .unwrap();
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = outcomes.clone();
    let _accepted = h.bus.subscribe(EventKind::ResponseAccepted, {
        let sink = sink.clone();
        move |event| {
            if let BusEvent::ResponseAccepted { notification } = event {
                sink.lock().unwrap().push(("accepted", notification.recipient_id.clone()));
            }
            Ok(())
        }
    });
    let _rejected = h.bus.subscribe(EventKind::ResponseRejected, move |event| {
        if let BusEvent::ResponseRejected { notification } = event {
            sink.lock().unwrap().push(("rejected", notification.recipient_id.clone()));
        }
        Ok(())
    });

    let request = h.post_request("clinic", "ICU", Urgency::High).await.unwrap();
    let a = h.respond(&request.id, "ana", ResponseKind::Available).await.unwrap();
    h.respond(&request.id, "ben", ResponseKind::Maybe).await.unwrap();
    h.respond(&request.id, "cam", ResponseKind::Interested).await.unwrap();

    let outcome = h.lifecycle.accept("clinic", &a.id).await.unwrap();
    assert_eq!(outcome.rejected.len(), 2);

    let mut seen = outcomes.lock().unwrap().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("accepted", "ana".to_string()),
            ("rejected", "ben".to_string()),
            ("rejected", "cam".to_string()),
        ]
    );

    let inbox = h.store.notifications_for("ben", true).await.unwrap();
    assert!(inbox
        .iter()
        .any(|n| n.kind == NotificationKind::ResponseRejected
            && n.recipient_type == RecipientRole::Responder));
}

// ---- Test 2: State-machine violations ----

#[tokio::test]
async fn second_accept_on_same_request_is_already_resolved() {
    let h = TestHarness::builder()
        .with_account("clinic", 40)
        .with_responder("ana", "ICU")
        .with_responder("ben", "ICU")
        .build()
        .await
        .unwrap();
    let request = h.post_request("clinic", "ICU", Urgency::Normal).await.unwrap();
    let a = h.respond(&request.id, "ana", ResponseKind::Available).await.unwrap();
    let b = h.respond(&request.id, "ben", ResponseKind::Available).await.unwrap();

    h.lifecycle.accept("clinic", &a.id).await.unwrap();
    let err = h.lifecycle.accept("clinic", &b.id).await.unwrap_err();
    assert!(matches!(err, MedshiftError::AlreadyResolved { .. }), "{err:?}");
}

#[tokio::test]
async fn duplicate_response_is_refused() {
    let h = TestHarness::builder()
        .with_account("clinic", 40)
        .with_responder("ana", "ICU")
        .build()
        .await
        .unwrap();
    let request = h.post_request("clinic", "ICU", Urgency::Normal).await.unwrap();
    h.respond(&request.id, "ana", ResponseKind::Interested).await.unwrap();

    let err = h
        .respond(&request.id, "ana", ResponseKind::Available)
        .await
        .unwrap_err();
    assert!(matches!(err, MedshiftError::DuplicateResponse { .. }), "{err:?}");
}

#[tokio::test]
async fn reject_leaves_request_open_for_others() {
    let h = TestHarness::builder()
        .with_account("clinic", 40)
        .with_responder("ana", "ICU")
        .with_responder("ben", "ICU")
        .build()
        .await
        .unwrap();
    let request = h.post_request("clinic", "ICU", Urgency::Normal).await.unwrap();
    let a = h.respond(&request.id, "ana", ResponseKind::Maybe).await.unwrap();

    h.lifecycle
        .set_response_status("clinic", &a.id, ResponseDecision::Rejected)
        .await
        .unwrap();

    let request = h.store.get_request(&request.id).await.unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Open);
    let b = h.respond(&request.id, "ben", ResponseKind::Available).await.unwrap();
    assert_eq!(b.status, ResponseStatus::Pending);
}

// ---- Test 3: Credits ----

#[tokio::test]
async fn insufficient_credits_leave_balance_and_requests_untouched() {
    let h = TestHarness::builder()
        .with_account("clinic", 12)
        .build()
        .await
        .unwrap();

    let err = h.post_request("clinic", "ICU", Urgency::High).await.unwrap_err();
    assert!(matches!(
        err,
        MedshiftError::InsufficientCredits {
            balance: 12,
            cost: 15
        }
    ));
    assert_eq!(h.balance("clinic").await.unwrap(), 12);
    let ledger = h.intake.ledger_history("clinic").await.unwrap();
    assert_eq!(ledger.len(), 1, "only the opening grant");
    assert_eq!(ledger[0].delta, 12);
    assert!(ledger.iter().all(|entry| entry.delta > 0));
}

#[tokio::test]
async fn concurrent_admits_never_overdraw() {
    let h = TestHarness::builder()
        .with_account("clinic", 25)
        .build()
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        h.post_request("clinic", "ICU", Urgency::High),
        h.post_request("clinic", "ICU", Urgency::High),
    );
    let admitted = [first.is_ok(), second.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(h.balance("clinic").await.unwrap(), 10);
}

// ---- Test 4: Expiry ----

#[tokio::test]
async fn sweep_expires_request_and_blocks_new_responses() {
    let h = TestHarness::builder()
        .with_account("clinic", 40)
        .with_responder("ana", "ICU")
        .with_responder("ben", "ICU")
        .build()
        .await
        .unwrap();
    let request = h.post_request("clinic", "ICU", Urgency::Normal).await.unwrap();
    let pending = h.respond(&request.id, "ana", ResponseKind::Maybe).await.unwrap();

    let later = Utc::now() + Duration::hours(4);
    let expired = h.sweeper.sweep_at(later).await.unwrap();
    assert_eq!(expired, vec![request.id.clone()]);

    let err = h
        .respond(&request.id, "ben", ResponseKind::Available)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MedshiftError::RequestClosed {
            status: RequestStatus::Expired,
            ..
        }
    ));
    let pending = h.store.get_response(&pending.id).await.unwrap().unwrap();
    assert_eq!(pending.status, ResponseStatus::Pending);
}

// ---- Test 5: Responder feed ----

#[tokio::test]
async fn feed_puts_most_urgent_request_first() {
    let h = TestHarness::builder()
        .with_account("clinic", 100)
        .with_responder("ana", "ICU")
        .build()
        .await
        .unwrap();
    let normal = h.post_request("clinic", "ICU", Urgency::Normal).await.unwrap();
    let emergency = h.post_request("clinic", "ICU", Urgency::Emergency).await.unwrap();
    h.post_request("clinic", "Pediatrics", Urgency::Emergency)
        .await
        .unwrap();

    let feed = h
        .lifecycle
        .feed("ana", &CandidateQuery::default())
        .await
        .unwrap();
    let ids: Vec<_> = feed.iter().map(|r| r.request.id.clone()).collect();
    assert_eq!(ids, vec![emergency.id, normal.id]);
    assert!(feed.iter().all(|r| r.distance_km.is_some()));
}

// ---- Test 6: Live delivery through the connection manager ----

#[tokio::test]
async fn connected_session_fans_notifications_out_to_user_channels() {
    let h = TestHarness::builder()
        .with_account("clinic", 40)
        .with_responder("ana", "ICU")
        .build()
        .await
        .unwrap();
    let manager = ConnectionManager::new(h.transport.clone(), h.bus.clone(), &h.config.realtime);
    manager
        .initialize(Identity::new("clinic", RecipientRole::Requester))
        .await
        .unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);

    let request = h.post_request("clinic", "ICU", Urgency::High).await.unwrap();
    h.respond(&request.id, "ana", ResponseKind::Available).await.unwrap();

    let sent = h.transport.broadcasts().await;
    let targets: Vec<_> = sent.iter().map(|(c, e, _)| (c.as_str(), e.as_str())).collect();
    assert!(targets.contains(&("user:ana", "new_request")));
    assert!(targets.contains(&("user:clinic", "new_response")));

    manager.disconnect().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!h.bus.has_transport());
}
