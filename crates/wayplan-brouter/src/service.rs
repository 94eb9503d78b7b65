//! The outbound seam to the route computation service.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wayplan_core::{LatLon, RouteProfile, TrackMeta};

/// One route computation request. Exactly one service call per request; the
/// engine never batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub from: LatLon,
    pub to: LatLon,
    pub profile: RouteProfile,
}

/// An ordered coordinate trace with service-reported metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTrack {
    pub positions: Vec<LatLon>,
    pub meta: TrackMeta,
}

/// Failures surfaced by the route computation service.
///
/// Every variant is local to one segment: the engine records it as a failed
/// segment and carries on. Timeouts surface through [`Self::Transport`]
/// like any other transport problem.
#[derive(Debug, Error)]
pub enum RouteServiceError {
    #[error("route service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    /// The service answered, but with an error instead of a track.
    #[error("{0}")]
    Service(String),
    #[error("route service returned an empty track")]
    EmptyTrack,
}

/// Asynchronous route computation between two coordinates.
///
/// Implementations may take as long as they need; the engine never blocks
/// on them and discards results whose segment has been edited away.
pub trait RouteService: Send + Sync {
    fn compute_route(
        &self,
        request: RouteRequest,
    ) -> BoxFuture<'_, Result<RouteTrack, RouteServiceError>>;
}
