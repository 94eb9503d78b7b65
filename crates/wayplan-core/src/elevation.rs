//! Views derived from resolved segments: the distance-annotated polyline
//! for the altitude profile, route totals and nearest-point lookup.

use crate::models::{LatLon, RouteStats, Segment, TrackPoint};
use crate::spatial::haversine_distance;

/// Concatenate the resolved segments' tracks, in waypoint order, into one
/// polyline with a continuously increasing distance axis.
///
/// Each segment's distances are offset by the running total of the prior
/// resolved segments' final distance. Segments that are not resolved are
/// skipped; they show up as a gap in the profile, not as an error.
pub fn concat_tracks<'a, I>(segments_in_order: I) -> Vec<TrackPoint>
where
    I: IntoIterator<Item = &'a Segment>,
{
    let mut polyline = Vec::new();
    let mut offset_m = 0.0;

    for segment in segments_in_order {
        let Some(track) = segment.track() else {
            continue;
        };
        let Some(last) = track.last() else {
            continue;
        };
        polyline.extend(track.iter().map(|point| TrackPoint {
            distance_m: point.distance_m + offset_m,
            ..*point
        }));
        offset_m += last.distance_m;
    }

    polyline
}

/// Totals over the resolved parts of the route.
///
/// Distance is the sum of each resolved segment's own final track distance;
/// ascent/descent accumulate altitude deltas within each track (never
/// across the gap left by an unresolved segment).
pub fn route_stats<'a, I>(segments_in_order: I) -> RouteStats
where
    I: IntoIterator<Item = &'a Segment>,
{
    let mut stats = RouteStats::default();

    for segment in segments_in_order {
        let Some(track) = segment.track() else {
            continue;
        };
        if let Some(last) = track.last() {
            stats.distance_m += last.distance_m;
        }
        for pair in track.windows(2) {
            if let (Some(a), Some(b)) = (pair[0].alt, pair[1].alt) {
                let delta = b - a;
                if delta > 0.0 {
                    stats.ascent_m += delta;
                } else {
                    stats.descent_m -= delta;
                }
            }
        }
    }

    stats
}

/// Where a map position is closest to the resolved route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestTrackPoint {
    /// Adjacency slot of the owning segment.
    pub segment_index: usize,
    /// Index into that segment's track.
    pub point_index: usize,
    /// Distance from the queried position to the track point in meters.
    pub separation_m: f64,
}

/// Find the track point of any resolved segment closest to `position`.
///
/// `segments_in_order` must be the full adjacency sequence (unresolved
/// entries included) so that `segment_index` matches the slot a cut
/// operation expects.
pub fn nearest_track_point<'a, I>(segments_in_order: I, position: &LatLon) -> Option<NearestTrackPoint>
where
    I: IntoIterator<Item = &'a Segment>,
{
    let mut best: Option<NearestTrackPoint> = None;

    for (segment_index, segment) in segments_in_order.into_iter().enumerate() {
        let Some(track) = segment.track() else {
            continue;
        };
        for (point_index, point) in track.iter().enumerate() {
            let separation_m =
                haversine_distance(position.lat, position.lon, point.lat, point.lon);
            if best.map_or(true, |b| separation_m < b.separation_m) {
                best = Some(NearestTrackPoint {
                    segment_index,
                    point_index,
                    separation_m,
                });
            }
        }
    }

    best
}
