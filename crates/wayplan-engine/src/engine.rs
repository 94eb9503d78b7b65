//! The synchronization engine: inbound edits, fetch coordination and
//! snapshot publication.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use wayplan_brouter::{RouteRequest, RouteService, RouteServiceError, RouteTrack};
use wayplan_core::{
    prune_stale, reconcile, simplify_trace, LatLon, RouteProfile, SegmentKey, SegmentStatus,
    TriggeredSegment, Waypoint, WaypointId,
};

use crate::error::EditError;
use crate::store::{RouteSnapshot, RouteStore};

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Profile for segments with no predecessor to inherit from.
    pub default_profile: RouteProfile,
    /// Minimum spacing between kept points when simplifying a trace.
    pub simplify_spacing_m: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_profile: RouteProfile::default(),
            simplify_spacing_m: 25.0,
        }
    }
}

/// A fetch stamped for dispatch: the request id ties the eventual result to
/// the segment state it was issued for.
struct IssuedFetch {
    key: SegmentKey,
    request_id: u64,
    request: RouteRequest,
}

struct EngineInner {
    store: Mutex<RouteStore>,
    service: Arc<dyn RouteService>,
    config: EngineConfig,
    snapshot_tx: watch::Sender<RouteSnapshot>,
    request_counter: AtomicU64,
}

/// Handle to the route segment synchronization engine. Clones share state.
///
/// Waypoint edits reconcile the segment store synchronously; the route
/// fetches they trigger run as independent tasks and re-enter through an
/// apply step that re-reads the current store by key, so results for
/// since-invalidated adjacencies are discarded rather than applied.
/// Requires a Tokio runtime.
#[derive(Clone)]
pub struct RouteEngine {
    inner: Arc<EngineInner>,
}

impl RouteEngine {
    pub fn new(service: Arc<dyn RouteService>, config: EngineConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(RouteSnapshot::default());
        Self {
            inner: Arc::new(EngineInner {
                store: Mutex::new(RouteStore::default()),
                service,
                config,
                snapshot_tx,
                request_counter: AtomicU64::new(1),
            }),
        }
    }

    // ---- inbound operations ----

    /// Append a waypoint at the end of the sequence.
    pub fn append_waypoint(&self, location: LatLon) -> Result<WaypointId, EditError> {
        self.edit(|store| {
            ensure_not_repositioning(store)?;
            let waypoint = Waypoint::at(location);
            let id = waypoint.id;
            store.waypoints.push(waypoint);
            Ok(id)
        })
    }

    /// Insert a waypoint at `index` (0..=len).
    pub fn insert_waypoint(&self, index: usize, location: LatLon) -> Result<WaypointId, EditError> {
        self.edit(|store| {
            ensure_not_repositioning(store)?;
            let len = store.waypoints.len();
            if index > len {
                return Err(EditError::IndexOutOfRange { index, len });
            }
            let waypoint = Waypoint::at(location);
            let id = waypoint.id;
            store.waypoints.insert(index, waypoint);
            Ok(id)
        })
    }

    /// Remove the waypoint at `index`.
    pub fn remove_waypoint(&self, index: usize) -> Result<(), EditError> {
        self.edit(|store| {
            ensure_not_repositioning(store)?;
            let len = store.waypoints.len();
            if index >= len {
                return Err(EditError::IndexOutOfRange { index, len });
            }
            store.waypoints.remove(index);
            Ok(())
        })
    }

    /// Remove the last waypoint.
    pub fn remove_last_waypoint(&self) -> Result<(), EditError> {
        self.edit(|store| {
            ensure_not_repositioning(store)?;
            if store.waypoints.pop().is_none() {
                return Err(EditError::EmptySequence);
            }
            Ok(())
        })
    }

    /// Reorder the sequence; `order` must be a permutation of the current
    /// waypoint ids.
    pub fn reorder_waypoints(&self, order: &[WaypointId]) -> Result<(), EditError> {
        self.edit(|store| {
            ensure_not_repositioning(store)?;
            if order.len() != store.waypoints.len() {
                return Err(EditError::InvalidReorder);
            }
            let mut seen = HashSet::new();
            for id in order {
                if !seen.insert(*id) {
                    return Err(EditError::InvalidReorder);
                }
            }
            if !store.waypoints.iter().all(|wp| seen.contains(&wp.id)) {
                return Err(EditError::InvalidReorder);
            }

            let mut by_id: HashMap<WaypointId, Waypoint> = store
                .waypoints
                .drain(..)
                .map(|wp| (wp.id, wp))
                .collect();
            store.waypoints = order.iter().filter_map(|id| by_id.remove(id)).collect();
            Ok(())
        })
    }

    /// Cut the selected segment in two by inserting a waypoint at the
    /// triggered point. The original segment's adjacency disappears and the
    /// two new pairs are fetched.
    pub fn cut_segment(&self, triggered: TriggeredSegment) -> Result<WaypointId, EditError> {
        self.edit(|store| {
            ensure_not_repositioning(store)?;
            let count = store.waypoints.len().saturating_sub(1);
            if triggered.segment_index >= count {
                return Err(EditError::SegmentIndexOutOfRange {
                    index: triggered.segment_index,
                    count,
                });
            }
            let waypoint = Waypoint::at(triggered.nearest_point);
            let id = waypoint.id;
            store.waypoints.insert(triggered.segment_index + 1, waypoint);
            Ok(id)
        })
    }

    /// Enter interactive-reposition mode for the waypoint at `index`.
    /// Sequence edits are rejected until confirm or cancel.
    pub fn begin_reposition(&self, index: usize) -> Result<(), EditError> {
        self.edit(|store| {
            ensure_not_repositioning(store)?;
            let len = store.waypoints.len();
            if index >= len {
                return Err(EditError::IndexOutOfRange { index, len });
            }
            store.moving = Some(index);
            Ok(())
        })
    }

    /// Replace the repositioned waypoint with one at `location` carrying a
    /// freshly minted id, so both adjacent segments are re-keyed and
    /// refetched rather than keeping a stale path.
    pub fn confirm_reposition(&self, location: LatLon) -> Result<WaypointId, EditError> {
        self.edit(|store| {
            let index = store.moving.ok_or(EditError::NoRepositionActive)?;
            let len = store.waypoints.len();
            let slot = store
                .waypoints
                .get_mut(index)
                .ok_or(EditError::IndexOutOfRange { index, len })?;
            let waypoint = Waypoint::at(location);
            let id = waypoint.id;
            *slot = waypoint;
            store.moving = None;
            Ok(id)
        })
    }

    /// Leave reposition mode with the sequence untouched.
    pub fn cancel_reposition(&self) -> Result<(), EditError> {
        self.edit(|store| {
            if store.moving.take().is_none() {
                return Err(EditError::NoRepositionActive);
            }
            Ok(())
        })
    }

    /// Re-fetch a settled segment: clears its payload and re-enters the
    /// fetch-issuance path. Valid on failed segments and, as a forced
    /// refresh, on resolved ones.
    pub fn retry_segment(&self, key: SegmentKey) -> Result<(), EditError> {
        self.edit(|store| {
            let segment = store
                .segments
                .get_mut(&key)
                .ok_or(EditError::UnknownSegment)?;
            match segment.status {
                SegmentStatus::Fetching { .. } => Err(EditError::FetchInFlight),
                _ => {
                    segment.status = SegmentStatus::Pending;
                    Ok(())
                }
            }
        })
    }

    /// Change a segment's routing parameters and re-fetch it. A no-op when
    /// the profile is unchanged.
    pub fn set_segment_profile(
        &self,
        key: SegmentKey,
        profile: RouteProfile,
    ) -> Result<(), EditError> {
        self.edit(|store| {
            let segment = store
                .segments
                .get_mut(&key)
                .ok_or(EditError::UnknownSegment)?;
            if segment.profile == profile {
                return Ok(());
            }
            if segment.is_fetching() {
                return Err(EditError::FetchInFlight);
            }
            segment.profile = profile;
            segment.status = SegmentStatus::Pending;
            Ok(())
        })
    }

    /// Drop the whole route: waypoints, segments and reposition mode.
    pub fn reset(&self) {
        let mut store = self.lock();
        store.waypoints.clear();
        store.segments.clear();
        store.moving = None;
        self.publish_locked(&store);
    }

    // ---- read side ----

    pub fn snapshot(&self) -> RouteSnapshot {
        self.lock().snapshot()
    }

    /// Subscribe to snapshots; a new one is published after every store
    /// mutation.
    pub fn subscribe(&self) -> watch::Receiver<RouteSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn waypoints(&self) -> Vec<Waypoint> {
        self.lock().waypoints.clone()
    }

    // ---- internals ----

    fn lock(&self) -> MutexGuard<'_, RouteStore> {
        self.inner.store.lock().expect("route store lock poisoned")
    }

    /// Run one edit under the lock, reconcile, stamp the resulting fetches
    /// and publish, then dispatch the fetches outside the lock. A rejected
    /// edit leaves the store untouched.
    fn edit<T>(
        &self,
        op: impl FnOnce(&mut RouteStore) -> Result<T, EditError>,
    ) -> Result<T, EditError> {
        let (value, issued) = {
            let mut store = self.lock();
            let value = op(&mut store)?;
            let issued = self.sync_locked(&mut store);
            (value, issued)
        };
        self.dispatch(issued);
        Ok(value)
    }

    /// Reconcile the store against the sequence and mark every scheduled
    /// fetch as in flight. Runs under the store lock, so a segment can
    /// never be issued twice.
    fn sync_locked(&self, store: &mut RouteStore) -> Vec<IssuedFetch> {
        let requests = reconcile(
            &store.waypoints,
            &mut store.segments,
            self.inner.config.default_profile,
        );

        let issued: Vec<IssuedFetch> = requests
            .into_iter()
            .map(|request| {
                let request_id = self.inner.request_counter.fetch_add(1, Ordering::SeqCst);
                if let Some(segment) = store.segments.get_mut(&request.key) {
                    segment.status = SegmentStatus::Fetching { request_id };
                }
                IssuedFetch {
                    key: request.key,
                    request_id,
                    request: RouteRequest {
                        from: request.from,
                        to: request.to,
                        profile: request.profile,
                    },
                }
            })
            .collect();

        if !issued.is_empty() {
            tracing::debug!(count = issued.len(), "issuing route fetches");
        }
        self.publish_locked(store);
        issued
    }

    fn dispatch(&self, issued: Vec<IssuedFetch>) {
        for fetch in issued {
            let engine = self.clone();
            tokio::spawn(async move {
                let result = engine.inner.service.compute_route(fetch.request).await;
                engine.apply_fetch_result(fetch.key, fetch.request_id, result);
            });
        }
    }

    /// Apply a completed fetch. The closure that got us here carries only
    /// the key and request id; everything else is re-read from the current
    /// store, so results for segments that were pruned or re-issued while
    /// the fetch was outstanding are discarded silently.
    fn apply_fetch_result(
        &self,
        key: SegmentKey,
        request_id: u64,
        result: Result<RouteTrack, RouteServiceError>,
    ) {
        let mut store = self.lock();
        let store = &mut *store;

        let Some(segment) = store.segments.get_mut(&key) else {
            tracing::debug!(from = %key.from, to = %key.to, "discarding result for pruned segment");
            return;
        };
        match segment.status {
            SegmentStatus::Fetching { request_id: current } if current == request_id => {}
            _ => {
                tracing::debug!(from = %key.from, to = %key.to, "discarding superseded fetch result");
                return;
            }
        }

        match result {
            Ok(track) => {
                let simplified =
                    simplify_trace(&track.positions, self.inner.config.simplify_spacing_m);
                tracing::debug!(
                    from = %key.from,
                    to = %key.to,
                    points = track.positions.len(),
                    "segment resolved"
                );
                segment.status = SegmentStatus::Resolved {
                    positions: track.positions,
                    track: simplified,
                    meta: track.meta,
                };
            }
            Err(error) => {
                tracing::warn!(from = %key.from, to = %key.to, %error, "route fetch failed");
                segment.status = SegmentStatus::Failed {
                    message: error.to_string(),
                };
            }
        }

        // A sequence edit may have raced this fetch; prune once more so a
        // late result can never resurrect a stale segment.
        prune_stale(&store.waypoints, &mut store.segments);
        self.publish_locked(store);
    }

    fn publish_locked(&self, store: &RouteStore) {
        self.inner.snapshot_tx.send_replace(store.snapshot());
    }
}

fn ensure_not_repositioning(store: &RouteStore) -> Result<(), EditError> {
    if store.moving.is_some() {
        return Err(EditError::RepositionInProgress);
    }
    Ok(())
}
