// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Great-circle distance.

use medshift_core::types::GeoPoint;

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres between two points.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1.0 for antipodal points.
    let c = 2.0 * h.min(1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Distance between two optional positions.
///
/// `None` means "unknown": callers must not filter a candidate out because
/// its distance is unknown.
pub fn distance_km(a: Option<GeoPoint>, b: Option<GeoPoint>) -> Option<f64> {
    Some(haversine_km(a?, b?))
}
