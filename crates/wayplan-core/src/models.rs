//! Core data models for the route planner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// A geographic position with optional altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            alt: None,
        }
    }

    pub fn with_alt(lat: f64, lon: f64, alt: f64) -> Self {
        Self {
            lat,
            lon,
            alt: Some(alt),
        }
    }
}

/// Opaque identity of a waypoint.
///
/// A waypoint keeps its id for as long as it sits where the user put it.
/// Repositioning mints a fresh id, which re-keys both adjacent segments and
/// forces them to be refetched instead of silently keeping a stale path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaypointId(Uuid);

impl WaypointId {
    /// Mint a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WaypointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WaypointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A user-placed point defining route intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: WaypointId,
    pub location: LatLon,
}

impl Waypoint {
    /// Create a waypoint at `location` with a freshly minted id.
    pub fn at(location: LatLon) -> Self {
        Self {
            id: WaypointId::new(),
            location,
        }
    }
}

/// Vehicle/mode selector for route computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Motorcar,
    Bicycle,
    Foot,
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TravelMode::Motorcar => "motorcar",
            TravelMode::Bicycle => "bicycle",
            TravelMode::Foot => "foot",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("unknown travel mode: {0} (expected motorcar, bicycle or foot)")]
pub struct ParseTravelModeError(String);

impl FromStr for TravelMode {
    type Err = ParseTravelModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "motorcar" | "car" => Ok(TravelMode::Motorcar),
            "bicycle" | "bike" => Ok(TravelMode::Bicycle),
            "foot" | "walking" => Ok(TravelMode::Foot),
            other => Err(ParseTravelModeError(other.to_string())),
        }
    }
}

/// Routing parameters attached to a segment's fetch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteProfile {
    pub mode: TravelMode,
    /// Prefer the fastest route over the most economic one.
    pub fast: bool,
}

impl Default for RouteProfile {
    fn default() -> Self {
        Self {
            mode: TravelMode::Motorcar,
            fast: true,
        }
    }
}

/// Ordered pair of adjacent waypoint ids.
///
/// Direction matters: `(A, B)` and `(B, A)` are unrelated segments and no
/// state is carried over when two waypoints swap places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    pub from: WaypointId,
    pub to: WaypointId,
}

impl SegmentKey {
    pub fn new(from: WaypointId, to: WaypointId) -> Self {
        Self { from, to }
    }
}

/// Fetch/result state of a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SegmentStatus {
    /// Derived from the sequence but not yet handed to the fetch layer.
    Pending,
    /// Exactly one request is in flight for this segment.
    Fetching { request_id: u64 },
    /// The routing service returned a path.
    Resolved {
        /// Full trace as returned by the service.
        positions: Vec<LatLon>,
        /// Downsampled trace annotated with cumulative distance.
        track: Vec<TrackPoint>,
        meta: TrackMeta,
    },
    /// The routing service failed; stays failed until an explicit retry.
    Failed { message: String },
}

/// A derived path segment between two adjacent waypoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub profile: RouteProfile,
    pub status: SegmentStatus,
}

impl Segment {
    /// A segment that still has to be fetched.
    pub fn pending(profile: RouteProfile) -> Self {
        Self {
            profile,
            status: SegmentStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, SegmentStatus::Pending)
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.status, SegmentStatus::Fetching { .. })
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.status, SegmentStatus::Resolved { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SegmentStatus::Failed { .. })
    }

    /// True once the segment no longer waits on the routing service.
    pub fn is_settled(&self) -> bool {
        self.is_resolved() || self.is_failed()
    }

    /// The simplified trace, present only when resolved.
    pub fn track(&self) -> Option<&[TrackPoint]> {
        match &self.status {
            SegmentStatus::Resolved { track, .. } => Some(track),
            _ => None,
        }
    }

    /// The full trace, present only when resolved.
    pub fn positions(&self) -> Option<&[LatLon]> {
        match &self.status {
            SegmentStatus::Resolved { positions, .. } => Some(positions),
            _ => None,
        }
    }

    /// The failure message, present only when failed.
    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            SegmentStatus::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// One point of a simplified trace, annotated with the cumulative distance
/// in meters from the segment start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
    pub distance_m: f64,
}

impl TrackPoint {
    pub fn location(&self) -> LatLon {
        LatLon {
            lat: self.lat,
            lon: self.lon,
            alt: self.alt,
        }
    }
}

/// Summary metadata reported by the routing service for one track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub track_length_m: Option<f64>,
    pub total_time_s: Option<f64>,
    pub ascend_m: Option<f64>,
}

/// Selection of a point on a rendered segment; drives the cut operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggeredSegment {
    /// Adjacency slot of the selected segment: the one between waypoints
    /// `segment_index` and `segment_index + 1`.
    pub segment_index: usize,
    /// Point on the rendered path closest to where the user triggered.
    pub nearest_point: LatLon,
}

/// Aggregated totals over the resolved parts of the route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RouteStats {
    pub distance_m: f64,
    pub ascent_m: f64,
    pub descent_m: f64,
}
