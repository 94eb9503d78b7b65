//! Derives the required segment set from the waypoint sequence.
//!
//! Runs synchronously on every sequence change, under the same lock that
//! owns the store: after a pass, a segment exists for `(A, B)` exactly when
//! `A` and `B` are adjacent in that order.

use std::collections::{HashMap, HashSet};

use crate::models::{LatLon, RouteProfile, Segment, SegmentKey, Waypoint, WaypointId};

/// A route computation the caller must start for `key`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub key: SegmentKey,
    pub from: LatLon,
    pub to: LatLon,
    pub profile: RouteProfile,
}

/// Keys of the currently adjacent waypoint pairs, in sequence order.
pub fn adjacent_keys(waypoints: &[Waypoint]) -> Vec<SegmentKey> {
    waypoints
        .windows(2)
        .map(|pair| SegmentKey::new(pair[0].id, pair[1].id))
        .collect()
}

/// Drop every segment whose key no longer matches an adjacent pair,
/// regardless of its state. Returns the number of segments dropped.
///
/// Runs as the prune step of [`reconcile`] and again after every fetch
/// result is applied, so a late-arriving result can never resurrect a
/// segment whose adjacency is gone.
pub fn prune_stale(waypoints: &[Waypoint], segments: &mut HashMap<SegmentKey, Segment>) -> usize {
    let wanted: HashSet<SegmentKey> = adjacent_keys(waypoints).into_iter().collect();
    let before = segments.len();
    segments.retain(|key, _| wanted.contains(key));
    before - segments.len()
}

/// Reconcile the segment store against the waypoint sequence.
///
/// Prunes segments for no-longer-adjacent keys, creates a `Pending` segment
/// for every adjacent pair that lacks one and returns a fetch request for
/// every segment left `Pending`. Segments that are `Fetching`, `Resolved`
/// or `Failed` for a still-adjacent key are left untouched; a failed
/// segment stays failed until the user explicitly retries it.
///
/// A newly created segment inherits the profile of the surviving segment
/// that ends at its `from` waypoint, falling back to `default_profile`.
pub fn reconcile(
    waypoints: &[Waypoint],
    segments: &mut HashMap<SegmentKey, Segment>,
    default_profile: RouteProfile,
) -> Vec<FetchRequest> {
    prune_stale(waypoints, segments);

    // Profiles of surviving segments keyed by the waypoint they end at, so
    // an extended route keeps the routing parameters of its last leg.
    let inherited: HashMap<WaypointId, RouteProfile> = segments
        .iter()
        .map(|(key, segment)| (key.to, segment.profile))
        .collect();

    let mut requests = Vec::new();
    for pair in waypoints.windows(2) {
        let key = SegmentKey::new(pair[0].id, pair[1].id);
        let segment = segments.entry(key).or_insert_with(|| {
            let profile = inherited.get(&key.from).copied().unwrap_or(default_profile);
            Segment::pending(profile)
        });
        if segment.is_pending() {
            requests.push(FetchRequest {
                key,
                from: pair[0].location,
                to: pair[1].location,
                profile: segment.profile,
            });
        }
    }
    requests
}
