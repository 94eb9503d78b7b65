//! Trace simplification for derived views.
//!
//! The raw trace from the routing service is dense. The elevation profile
//! and stats only need points spaced far enough apart to chart, each
//! annotated with the cumulative distance from the segment start.

use crate::models::{LatLon, TrackPoint};
use crate::spatial::distance_between;

/// Downsample a trace, keeping the first and last point and every point at
/// least `min_spacing_m` along the trace from the previously kept one.
///
/// `distance_m` on the output is the cumulative distance along the *full*
/// trace, so the final point carries the true path length regardless of how
/// many points were dropped.
pub fn simplify_trace(trace: &[LatLon], min_spacing_m: f64) -> Vec<TrackPoint> {
    let spacing = min_spacing_m.max(1.0);
    let mut out = Vec::new();
    let Some(first) = trace.first() else {
        return out;
    };

    out.push(track_point(first, 0.0));
    let mut cumulative_m = 0.0;
    let mut since_kept_m = 0.0;

    for i in 1..trace.len() {
        let step = distance_between(&trace[i - 1], &trace[i]);
        cumulative_m += step;
        since_kept_m += step;

        let is_last = i == trace.len() - 1;
        if is_last || since_kept_m >= spacing {
            out.push(track_point(&trace[i], cumulative_m));
            since_kept_m = 0.0;
        }
    }

    out
}

fn track_point(position: &LatLon, distance_m: f64) -> TrackPoint {
    TrackPoint {
        lat: position.lat,
        lon: position.lon,
        alt: position.alt,
        distance_m,
    }
}
