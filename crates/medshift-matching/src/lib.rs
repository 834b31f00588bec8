// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Qualification and ranking for urgent requests.
//!
//! Everything here is query-only: inputs are borrowed and never mutated.
//!
//! - [`geo`]: great-circle distance between optional coordinates
//! - [`ranking`]: the audience of a new request, and the ordered request
//!   feed a responder sees

pub mod geo;
pub mod ranking;

pub use geo::{distance_km, haversine_km};
pub use ranking::{rank_requests, select_candidates, Candidate, CandidateQuery, RankedRequest};
