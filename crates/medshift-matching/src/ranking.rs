// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Responder qualification and request ranking.
//!
//! Two views over the same filters:
//!
//! - [`select_candidates`] answers "who should hear about this request?"
//!   for the intake path. Output keeps directory order.
//! - [`rank_requests`] answers "which open requests should this responder
//!   see first?" for the responder feed. Output is ordered by urgency,
//!   priority boost, hourly rate, and recency, all descending.

use std::cmp::Ordering;

use medshift_core::types::{ResponderProfile, UrgentRequest};
use medshift_core::RequestStatus;
use serde::Serialize;
use tracing::debug;

use crate::geo::distance_km;

/// Optional caller-side filters.
#[derive(Debug, Clone, Default)]
pub struct CandidateQuery {
    /// Skip the specialty equality check.
    pub broaden_specialty: bool,
    /// Drop pairs farther apart than this. Unknown distances are kept.
    pub max_distance_km: Option<f64>,
    /// Drop requests paying less than this hourly rate.
    pub min_rate: Option<f64>,
    /// Case-insensitive substring the free-text location must contain.
    pub location_contains: Option<String>,
}

/// A responder qualified for a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub profile: ResponderProfile,
    /// `None` when either side lacks coordinates.
    pub distance_km: Option<f64>,
}

/// An open request in a responder's feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRequest {
    pub request: UrgentRequest,
    pub distance_km: Option<f64>,
}

fn specialty_matches(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn location_matches(haystack: &str, needle: Option<&str>) -> bool {
    match needle.map(str::trim) {
        None | Some("") => true,
        Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
    }
}

fn within_distance(distance: Option<f64>, max: Option<f64>) -> bool {
    match (distance, max) {
        (Some(d), Some(max)) => d <= max,
        _ => true,
    }
}

/// Select the responders that qualify for `request`.
///
/// Unavailable responders, responders whose own minimum rate exceeds the
/// offered rate, and responders failing the query filters are skipped.
/// Each candidate carries its distance to the request when both sides
/// have coordinates.
pub fn select_candidates(
    request: &UrgentRequest,
    profiles: &[ResponderProfile],
    query: &CandidateQuery,
) -> Vec<Candidate> {
    if let Some(min) = query.min_rate
        && request.hourly_rate < min
    {
        return Vec::new();
    }

    let candidates: Vec<Candidate> = profiles
        .iter()
        .filter(|p| p.available)
        .filter(|p| query.broaden_specialty || specialty_matches(&p.specialty, &request.specialty))
        .filter(|p| p.min_hourly_rate.is_none_or(|min| request.hourly_rate >= min))
        .filter(|p| location_matches(&p.location_text, query.location_contains.as_deref()))
        .filter_map(|p| {
            let distance = distance_km(request.location, p.location);
            within_distance(distance, query.max_distance_km).then(|| Candidate {
                profile: p.clone(),
                distance_km: distance,
            })
        })
        .collect();

    debug!(
        request_id = %request.id,
        considered = profiles.len(),
        selected = candidates.len(),
        "selected candidates"
    );
    candidates
}

/// Feed ordering: urgency, priority boost, hourly rate, created_at; all descending.
fn feed_order(a: &UrgentRequest, b: &UrgentRequest) -> Ordering {
    b.urgency
        .cmp(&a.urgency)
        .then_with(|| b.priority_boost.cmp(&a.priority_boost))
        .then_with(|| b.hourly_rate.total_cmp(&a.hourly_rate))
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Filter and order open requests for a responder's feed.
///
/// With a `viewer`, requests outside the viewer's specialty are skipped
/// (unless broadened) and distances are measured from the viewer. Equal
/// keys keep input order.
pub fn rank_requests(
    requests: &[UrgentRequest],
    viewer: Option<&ResponderProfile>,
    query: &CandidateQuery,
) -> Vec<RankedRequest> {
    let mut ranked: Vec<RankedRequest> = requests
        .iter()
        .filter(|r| r.status == RequestStatus::Open)
        .filter(|r| {
            query.broaden_specialty
                || viewer.is_none_or(|v| specialty_matches(&v.specialty, &r.specialty))
        })
        .filter(|r| query.min_rate.is_none_or(|min| r.hourly_rate >= min))
        .filter(|r| location_matches(&r.location_text, query.location_contains.as_deref()))
        .filter_map(|r| {
            let distance = distance_km(r.location, viewer.and_then(|v| v.location));
            within_distance(distance, query.max_distance_km).then(|| RankedRequest {
                request: r.clone(),
                distance_km: distance,
            })
        })
        .collect();

    // `sort_by` is stable, so ties keep input order.
    ranked.sort_by(|a, b| feed_order(&a.request, &b.request));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use medshift_core::types::GeoPoint;
    use medshift_core::Urgency;
    use proptest::prelude::*;

    fn request(id: &str, urgency: Urgency, boost: bool, rate: f64, age_mins: i64) -> UrgentRequest {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        UrgentRequest {
            id: id.to_string(),
            requester_id: "facility-1".to_string(),
            title: format!("Shift {id}"),
            description: None,
            specialty: "Emergency Medicine".to_string(),
            urgency,
            location: Some(GeoPoint::new(40.7128, -74.0060)),
            location_text: "Brooklyn, NY".to_string(),
            hourly_rate: rate,
            priority_boost: boost,
            featured: false,
            shift_start: base + Duration::hours(2),
            shift_end: base + Duration::hours(10),
            credits_spent: 10,
            response_count: 0,
            view_count: 0,
            status: RequestStatus::Open,
            created_at: base - Duration::minutes(age_mins),
            expires_at: base + Duration::hours(1),
        }
    }

    fn profile(id: &str, specialty: &str, location: Option<GeoPoint>) -> ResponderProfile {
        ResponderProfile {
            id: id.to_string(),
            display_name: format!("Dr. {id}"),
            specialty: specialty.to_string(),
            rating: Some(4.5),
            location,
            location_text: "New York, NY".to_string(),
            min_hourly_rate: None,
            available: true,
        }
    }

    #[test]
    fn filters_by_specialty_and_keeps_input_order() {
        let r = request("r1", Urgency::Critical, false, 120.0, 0);
        let nearby = Some(GeoPoint::new(40.73, -73.99));
        let profiles = vec![
            profile("a", "Emergency Medicine", nearby),
            profile("b", "Pediatrics", nearby),
            profile("c", "emergency medicine", nearby),
        ];
        let out = select_candidates(&r, &profiles, &CandidateQuery::default());
        let ids: Vec<_> = out.iter().map(|c| c.profile.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(out.iter().all(|c| c.distance_km.is_some()));
    }

    #[test]
    fn broadened_query_skips_specialty_check() {
        let r = request("r1", Urgency::Normal, false, 90.0, 0);
        let profiles = vec![profile("a", "Pediatrics", None)];
        let query = CandidateQuery {
            broaden_specialty: true,
            ..Default::default()
        };
        assert_eq!(select_candidates(&r, &profiles, &query).len(), 1);
    }

    #[test]
    fn unknown_distance_is_never_filtered_out() {
        let r = request("r1", Urgency::High, false, 100.0, 0);
        let far = Some(GeoPoint::new(34.0522, -118.2437));
        let profiles = vec![
            profile("no-coords", "Emergency Medicine", None),
            profile("far", "Emergency Medicine", far),
        ];
        let query = CandidateQuery {
            max_distance_km: Some(50.0),
            ..Default::default()
        };
        let out = select_candidates(&r, &profiles, &query);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].profile.id, "no-coords");
        assert_eq!(out[0].distance_km, None);
    }

    #[test]
    fn responder_minimum_rate_and_availability_are_respected() {
        let r = request("r1", Urgency::High, false, 80.0, 0);
        let mut picky = profile("picky", "Emergency Medicine", None);
        picky.min_hourly_rate = Some(100.0);
        let mut away = profile("away", "Emergency Medicine", None);
        away.available = false;
        let ok = profile("ok", "Emergency Medicine", None);
        let out = select_candidates(&r, &[picky, away, ok], &CandidateQuery::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].profile.id, "ok");
    }

    #[test]
    fn location_substring_is_case_insensitive() {
        let r = request("r1", Urgency::High, false, 80.0, 0);
        let mut jersey = profile("nj", "Emergency Medicine", None);
        jersey.location_text = "Newark, NJ".to_string();
        let ny = profile("ny", "Emergency Medicine", None);
        let query = CandidateQuery {
            location_contains: Some("new york".to_string()),
            ..Default::default()
        };
        let out = select_candidates(&r, &[jersey, ny], &query);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].profile.id, "ny");
    }

    #[test]
    fn selection_does_not_mutate_inputs() {
        let r = request("r1", Urgency::High, false, 80.0, 0);
        let profiles = vec![profile("a", "Emergency Medicine", None)];
        let before = (r.clone(), profiles.clone());
        let _ = select_candidates(&r, &profiles, &CandidateQuery::default());
        assert_eq!(before, (r, profiles));
    }

    #[test]
    fn feed_orders_by_urgency_boost_rate_recency() {
        let requests = vec![
            request("normal", Urgency::Normal, true, 300.0, 0),
            request("critical-old", Urgency::Critical, false, 100.0, 30),
            request("critical-new", Urgency::Critical, false, 100.0, 5),
            request("critical-boost", Urgency::Critical, true, 90.0, 60),
            request("critical-rich", Urgency::Critical, false, 150.0, 60),
            request("emergency", Urgency::Emergency, false, 50.0, 90),
        ];
        let out = rank_requests(&requests, None, &CandidateQuery::default());
        let ids: Vec<_> = out.iter().map(|r| r.request.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "emergency",
                "critical-boost",
                "critical-rich",
                "critical-new",
                "critical-old",
                "normal",
            ]
        );
    }

    #[test]
    fn feed_skips_closed_requests_and_other_specialties() {
        let mut filled = request("filled", Urgency::Emergency, false, 100.0, 0);
        filled.status = RequestStatus::InProgress;
        let mut peds = request("peds", Urgency::Emergency, false, 100.0, 0);
        peds.specialty = "Pediatrics".to_string();
        let open = request("open", Urgency::Normal, false, 100.0, 0);
        let viewer = profile("v", "Emergency Medicine", None);
        let out = rank_requests(&[filled, peds, open], Some(&viewer), &CandidateQuery::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].request.id, "open");
    }

    #[test]
    fn feed_min_rate_filter() {
        let cheap = request("cheap", Urgency::Emergency, false, 40.0, 0);
        let fair = request("fair", Urgency::Normal, false, 95.0, 0);
        let query = CandidateQuery {
            min_rate: Some(60.0),
            ..Default::default()
        };
        let out = rank_requests(&[cheap, fair], None, &query);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].request.id, "fair");
    }

    fn arb_request() -> impl Strategy<Value = (usize, bool, u8, i64)> {
        (0usize..4, any::<bool>(), 0u8..4, 0i64..4)
    }

    proptest! {
        #[test]
        fn feed_is_sorted_and_stable(specs in prop::collection::vec(arb_request(), 0..24)) {
            let requests: Vec<UrgentRequest> = specs
                .iter()
                .enumerate()
                .map(|(i, (u, boost, rate, age))| {
                    request(&i.to_string(), Urgency::ALL[*u], *boost, f64::from(*rate) * 25.0, *age)
                })
                .collect();
            let out = rank_requests(&requests, None, &CandidateQuery::default());
            prop_assert_eq!(out.len(), requests.len());
            for pair in out.windows(2) {
                let ord = feed_order(&pair[0].request, &pair[1].request);
                prop_assert!(ord != Ordering::Greater);
                if ord == Ordering::Equal {
                    let a: usize = pair[0].request.id.parse().unwrap();
                    let b: usize = pair[1].request.id.parse().unwrap();
                    prop_assert!(a < b, "equal keys must keep input order");
                }
            }
        }
    }
}
