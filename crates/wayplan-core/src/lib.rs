//! Core domain logic for the route planner: the waypoint/segment data
//! model, the reconciler that derives the required segment set from the
//! waypoint sequence, and the views derived from resolved paths.

pub mod elevation;
pub mod models;
pub mod reconcile;
pub mod simplify;
pub mod spatial;

pub use elevation::{concat_tracks, nearest_track_point, route_stats, NearestTrackPoint};
pub use models::{
    LatLon, ParseTravelModeError, RouteProfile, RouteStats, Segment, SegmentKey, SegmentStatus,
    TrackMeta, TrackPoint, TravelMode, TriggeredSegment, Waypoint, WaypointId,
};
pub use reconcile::{adjacent_keys, prune_stale, reconcile, FetchRequest};
pub use simplify::simplify_trace;
pub use spatial::haversine_distance;
