//! Mutable route state and the read-only snapshots derived from it.

use std::collections::HashMap;

use serde::Serialize;
use wayplan_core::{concat_tracks, route_stats, RouteStats, Segment, SegmentKey, TrackPoint, Waypoint};

/// The authoritative waypoint sequence and segment store.
///
/// Mutated only under the engine lock, by the reconcile pass and the
/// fetch-result apply step. Everyone else reads [`RouteSnapshot`]s.
#[derive(Debug, Default)]
pub(crate) struct RouteStore {
    pub(crate) waypoints: Vec<Waypoint>,
    pub(crate) segments: HashMap<SegmentKey, Segment>,
    /// Index of the waypoint in interactive-reposition mode, if any.
    pub(crate) moving: Option<usize>,
}

impl RouteStore {
    /// Segments in waypoint order. After a reconcile pass every adjacent
    /// pair has exactly one segment, so this walks the sequence rather than
    /// the map.
    pub(crate) fn segments_in_order(&self) -> impl Iterator<Item = (SegmentKey, &Segment)> {
        self.waypoints.windows(2).filter_map(move |pair| {
            let key = SegmentKey::new(pair[0].id, pair[1].id);
            self.segments.get(&key).map(|segment| (key, segment))
        })
    }

    pub(crate) fn snapshot(&self) -> RouteSnapshot {
        let segments: Vec<SegmentView> = self
            .segments_in_order()
            .map(|(key, segment)| SegmentView {
                key,
                segment: segment.clone(),
            })
            .collect();
        let stats = route_stats(segments.iter().map(|view| &view.segment));

        RouteSnapshot {
            waypoints: self.waypoints.clone(),
            segments,
            moving_index: self.moving,
            stats,
        }
    }
}

/// One segment as handed to the rendering layer, in waypoint order.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentView {
    pub key: SegmentKey,
    #[serde(flatten)]
    pub segment: Segment,
}

/// Immutable view of the engine state for renderers and aggregation.
///
/// Carries the waypoint sequence (markers), each segment's state (status
/// icons, path overlays for resolved ones) and the route totals. The
/// rendering layer owns whatever handles it draws from this; the engine
/// never references them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteSnapshot {
    pub waypoints: Vec<Waypoint>,
    pub segments: Vec<SegmentView>,
    pub moving_index: Option<usize>,
    pub stats: RouteStats,
}

impl RouteSnapshot {
    /// True once no segment is waiting on the routing service.
    pub fn is_settled(&self) -> bool {
        self.segments.iter().all(|view| view.segment.is_settled())
    }

    pub fn segment(&self, key: &SegmentKey) -> Option<&SegmentView> {
        self.segments.iter().find(|view| view.key == *key)
    }

    /// Distance-annotated polyline over the resolved segments, with one
    /// continuously increasing distance axis across the whole route.
    pub fn elevation_profile(&self) -> Vec<TrackPoint> {
        concat_tracks(self.segments.iter().map(|view| &view.segment))
    }
}
