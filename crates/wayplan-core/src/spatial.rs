//! Spatial math for trace distances.

use crate::models::LatLon;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters (Haversine formula).
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Distance between two positions in meters.
pub fn distance_between(a: &LatLon, b: &LatLon) -> f64 {
    haversine_distance(a.lat, a.lon, b.lat, b.lon)
}

/// Total length of a trace in meters.
pub fn trace_length_m(trace: &[LatLon]) -> f64 {
    trace
        .windows(2)
        .map(|pair| distance_between(&pair[0], &pair[1]))
        .sum()
}
