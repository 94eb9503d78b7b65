//! End-to-end tests for the synchronization engine against a scripted
//! routing service: every request parks until the test releases it, so
//! edit/fetch races can be played out deterministically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

use wayplan_brouter::{RouteRequest, RouteService, RouteServiceError, RouteTrack};
use wayplan_core::{
    LatLon, RouteProfile, SegmentKey, TrackMeta, TravelMode, TriggeredSegment, WaypointId,
};
use wayplan_engine::{EditError, EngineConfig, RouteEngine, RouteSnapshot};

const WAIT: Duration = Duration::from_secs(2);

struct PendingFetch {
    request: RouteRequest,
    respond: oneshot::Sender<Result<RouteTrack, RouteServiceError>>,
}

impl PendingFetch {
    fn resolve(self) {
        let track = straight_track(&self.request);
        let _ = self.respond.send(Ok(track));
    }

    fn fail(self, message: &str) {
        let _ = self
            .respond
            .send(Err(RouteServiceError::Service(message.to_string())));
    }
}

/// Routing service double. Requests queue up until the test releases them.
#[derive(Default)]
struct GatedService {
    pending: Mutex<VecDeque<PendingFetch>>,
}

impl GatedService {
    fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    async fn next_pending(&self) -> PendingFetch {
        timeout(WAIT, async {
            loop {
                if let Some(fetch) = self.pending.lock().unwrap().pop_front() {
                    return fetch;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("no fetch arrived")
    }
}

impl RouteService for GatedService {
    fn compute_route(
        &self,
        request: RouteRequest,
    ) -> BoxFuture<'_, Result<RouteTrack, RouteServiceError>> {
        let (respond, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .push_back(PendingFetch { request, respond });
        async move {
            rx.await
                .unwrap_or_else(|_| Err(RouteServiceError::Service("request dropped".to_string())))
        }
        .boxed()
    }
}

/// Three-point trace from request start to end via a midpoint.
fn straight_track(request: &RouteRequest) -> RouteTrack {
    let mid = LatLon::new(
        (request.from.lat + request.to.lat) / 2.0,
        (request.from.lon + request.to.lon) / 2.0,
    );
    RouteTrack {
        positions: vec![request.from, mid, request.to],
        meta: TrackMeta {
            track_length_m: Some(1000.0),
            total_time_s: Some(120.0),
            ascend_m: None,
        },
    }
}

fn setup() -> (RouteEngine, Arc<GatedService>) {
    let service = Arc::new(GatedService::default());
    let engine = RouteEngine::new(service.clone(), EngineConfig::default());
    (engine, service)
}

async fn wait_for<F>(engine: &RouteEngine, predicate: F) -> RouteSnapshot
where
    F: Fn(&RouteSnapshot) -> bool,
{
    let mut rx = engine.subscribe();
    timeout(WAIT, async {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if predicate(&snapshot) {
                return snapshot;
            }
            rx.changed().await.expect("engine dropped");
        }
    })
    .await
    .expect("condition not reached in time")
}

fn berlin(offset: f64) -> LatLon {
    LatLon::new(52.5 + offset, 13.4 + offset)
}

#[tokio::test]
async fn first_waypoint_creates_no_segments() {
    let (engine, service) = setup();

    engine.append_waypoint(berlin(0.0)).unwrap();
    sleep(Duration::from_millis(20)).await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.waypoints.len(), 1);
    assert!(snapshot.segments.is_empty());
    assert_eq!(service.pending_count(), 0);
}

#[tokio::test]
async fn second_waypoint_is_fetched_and_resolved() {
    let (engine, service) = setup();

    let a = engine.append_waypoint(berlin(0.0)).unwrap();
    let b = engine.append_waypoint(berlin(0.1)).unwrap();

    let fetch = service.next_pending().await;
    assert_eq!(fetch.request.from, berlin(0.0));
    assert_eq!(fetch.request.to, berlin(0.1));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.segments.len(), 1);
    assert!(snapshot.segments[0].segment.is_fetching());

    fetch.resolve();
    let snapshot = wait_for(&engine, |snap| snap.is_settled()).await;

    let view = snapshot.segment(&SegmentKey::new(a, b)).unwrap();
    assert!(view.segment.is_resolved());
    let positions = view.segment.positions().unwrap();
    assert_eq!(positions.len(), 3);
    assert_eq!(positions[0], berlin(0.0));

    let track = view.segment.track().unwrap();
    assert_eq!(track[0].distance_m, 0.0);
    assert!(track.last().unwrap().distance_m > 0.0);
}

#[tokio::test]
async fn no_refetch_without_sequence_change() {
    let (engine, service) = setup();

    engine.append_waypoint(berlin(0.0)).unwrap();
    engine.append_waypoint(berlin(0.1)).unwrap();
    service.next_pending().await.resolve();
    wait_for(&engine, |snap| snap.is_settled()).await;

    // Mode changes reconcile too, but must not issue anything new.
    engine.begin_reposition(0).unwrap();
    engine.cancel_reposition().unwrap();
    sleep(Duration::from_millis(20)).await;

    assert_eq!(service.pending_count(), 0);
    assert!(engine.snapshot().is_settled());
}

#[tokio::test]
async fn cut_replaces_segment_with_two_fetches() {
    let (engine, service) = setup();

    let a = engine.append_waypoint(berlin(0.0)).unwrap();
    let b = engine.append_waypoint(berlin(0.1)).unwrap();
    service.next_pending().await.resolve();
    wait_for(&engine, |snap| snap.is_settled()).await;

    let cut_point = berlin(0.05);
    let c = engine
        .cut_segment(TriggeredSegment {
            segment_index: 0,
            nearest_point: cut_point,
        })
        .unwrap();

    // Task scheduling order is not guaranteed; match the fetches by origin.
    let one = service.next_pending().await;
    let two = service.next_pending().await;
    let (first, second) = if one.request.from == berlin(0.0) {
        (one, two)
    } else {
        (two, one)
    };
    assert_eq!(first.request.from, berlin(0.0));
    assert_eq!(first.request.to, cut_point);
    assert_eq!(second.request.from, cut_point);
    assert_eq!(second.request.to, berlin(0.1));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.segments.len(), 2);
    assert!(snapshot.segment(&SegmentKey::new(a, b)).is_none());
    assert!(snapshot.segment(&SegmentKey::new(a, c)).is_some());
    assert!(snapshot.segment(&SegmentKey::new(c, b)).is_some());
}

#[tokio::test]
async fn removing_middle_waypoint_refetches_joined_pair() {
    let (engine, service) = setup();

    let a = engine.append_waypoint(berlin(0.0)).unwrap();
    engine.append_waypoint(berlin(0.05)).unwrap();
    let b = engine.append_waypoint(berlin(0.1)).unwrap();
    service.next_pending().await.resolve();
    service.next_pending().await.resolve();
    wait_for(&engine, |snap| snap.is_settled()).await;

    engine.remove_waypoint(1).unwrap();

    let fetch = service.next_pending().await;
    assert_eq!(fetch.request.from, berlin(0.0));
    assert_eq!(fetch.request.to, berlin(0.1));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.segments.len(), 1);
    assert_eq!(snapshot.segments[0].key, SegmentKey::new(a, b));
    assert!(snapshot.segments[0].segment.is_fetching());
}

#[tokio::test]
async fn failed_fetch_is_reported_and_retried() {
    let (engine, service) = setup();

    let a = engine.append_waypoint(berlin(0.0)).unwrap();
    let b = engine.append_waypoint(berlin(0.1)).unwrap();
    service.next_pending().await.fail("no route found");

    let key = SegmentKey::new(a, b);
    let snapshot = wait_for(&engine, |snap| snap.is_settled()).await;
    let view = snapshot.segment(&key).unwrap();
    assert_eq!(view.segment.error_message(), Some("no route found"));

    // A failed segment stays failed until the user retries.
    engine.append_waypoint(berlin(0.2)).unwrap();
    service.next_pending().await.resolve();
    wait_for(&engine, |snap| snap.is_settled()).await;
    assert!(engine.snapshot().segment(&key).unwrap().segment.is_failed());

    engine.retry_segment(key).unwrap();
    service.next_pending().await.resolve();
    let snapshot = wait_for(&engine, |snap| snap.is_settled()).await;
    assert!(snapshot.segment(&key).unwrap().segment.is_resolved());
}

#[tokio::test]
async fn stale_result_is_discarded_after_prune() {
    let (engine, service) = setup();

    engine.append_waypoint(berlin(0.0)).unwrap();
    engine.append_waypoint(berlin(0.1)).unwrap();
    let fetch = service.next_pending().await;

    // Removing the second waypoint prunes the segment while its fetch is
    // still in flight.
    engine.remove_last_waypoint().unwrap();
    assert!(engine.snapshot().segments.is_empty());

    fetch.resolve();
    sleep(Duration::from_millis(50)).await;

    let snapshot = engine.snapshot();
    assert!(snapshot.segments.is_empty(), "stale segment was resurrected");
    assert_eq!(snapshot.stats.distance_m, 0.0);
}

#[tokio::test]
async fn reposition_mints_fresh_id_and_refetches_neighbors() {
    let (engine, service) = setup();

    let a = engine.append_waypoint(berlin(0.0)).unwrap();
    let b = engine.append_waypoint(berlin(0.05)).unwrap();
    let c = engine.append_waypoint(berlin(0.1)).unwrap();
    service.next_pending().await.resolve();
    service.next_pending().await.resolve();
    wait_for(&engine, |snap| snap.is_settled()).await;

    engine.begin_reposition(1).unwrap();
    assert_eq!(
        engine.append_waypoint(berlin(0.2)).unwrap_err(),
        EditError::RepositionInProgress
    );
    assert_eq!(
        engine.remove_waypoint(0).unwrap_err(),
        EditError::RepositionInProgress
    );

    let moved = berlin(0.06);
    let b2 = engine.confirm_reposition(moved).unwrap();
    assert_ne!(b2, b);

    let one = service.next_pending().await;
    let two = service.next_pending().await;
    let (first, second) = if one.request.to == moved {
        (one, two)
    } else {
        (two, one)
    };
    assert_eq!(first.request.to, moved);
    assert_eq!(second.request.from, moved);

    let snapshot = engine.snapshot();
    assert!(snapshot.segment(&SegmentKey::new(a, b2)).is_some());
    assert!(snapshot.segment(&SegmentKey::new(b2, c)).is_some());
    assert!(snapshot.segment(&SegmentKey::new(a, b)).is_none());
}

#[tokio::test]
async fn cancel_reposition_changes_nothing() {
    let (engine, service) = setup();

    engine.append_waypoint(berlin(0.0)).unwrap();
    engine.append_waypoint(berlin(0.1)).unwrap();
    service.next_pending().await.resolve();
    wait_for(&engine, |snap| snap.is_settled()).await;

    let before = engine.waypoints();
    engine.begin_reposition(1).unwrap();
    assert_eq!(engine.snapshot().moving_index, Some(1));
    engine.cancel_reposition().unwrap();

    let after = engine.waypoints();
    assert_eq!(
        before.iter().map(|wp| wp.id).collect::<Vec<_>>(),
        after.iter().map(|wp| wp.id).collect::<Vec<_>>()
    );
    assert_eq!(engine.snapshot().moving_index, None);
    assert_eq!(service.pending_count(), 0);
}

#[tokio::test]
async fn reversing_the_sequence_refetches_the_other_direction() {
    let (engine, service) = setup();

    let a = engine.append_waypoint(berlin(0.0)).unwrap();
    let b = engine.append_waypoint(berlin(0.1)).unwrap();
    service.next_pending().await.resolve();
    wait_for(&engine, |snap| snap.is_settled()).await;

    engine.reorder_waypoints(&[b, a]).unwrap();

    let fetch = service.next_pending().await;
    assert_eq!(fetch.request.from, berlin(0.1));
    assert_eq!(fetch.request.to, berlin(0.0));

    let snapshot = engine.snapshot();
    assert!(snapshot.segment(&SegmentKey::new(b, a)).is_some());
    assert!(snapshot.segment(&SegmentKey::new(a, b)).is_none());
}

#[tokio::test]
async fn one_fetch_in_flight_per_segment() {
    let (engine, service) = setup();

    let a = engine.append_waypoint(berlin(0.0)).unwrap();
    let b = engine.append_waypoint(berlin(0.1)).unwrap();
    let fetch = service.next_pending().await;

    // Appending elsewhere must not re-issue the in-flight pair.
    engine.append_waypoint(berlin(0.2)).unwrap();
    let other = service.next_pending().await;
    assert_eq!(other.request.from, berlin(0.1));
    assert_eq!(service.pending_count(), 0);

    // Neither may a manual retry while the fetch is running.
    assert_eq!(
        engine.retry_segment(SegmentKey::new(a, b)).unwrap_err(),
        EditError::FetchInFlight
    );

    fetch.resolve();
    other.resolve();
    wait_for(&engine, |snap| snap.is_settled()).await;
}

#[tokio::test]
async fn invalid_edits_leave_the_sequence_unchanged() {
    let (engine, service) = setup();

    let a = engine.append_waypoint(berlin(0.0)).unwrap();
    let b = engine.append_waypoint(berlin(0.1)).unwrap();
    service.next_pending().await.resolve();
    wait_for(&engine, |snap| snap.is_settled()).await;

    assert_eq!(
        engine.insert_waypoint(5, berlin(0.2)).unwrap_err(),
        EditError::IndexOutOfRange { index: 5, len: 2 }
    );
    assert_eq!(
        engine.remove_waypoint(7).unwrap_err(),
        EditError::IndexOutOfRange { index: 7, len: 2 }
    );
    assert_eq!(
        engine.reorder_waypoints(&[a]).unwrap_err(),
        EditError::InvalidReorder
    );
    assert_eq!(
        engine.reorder_waypoints(&[a, a]).unwrap_err(),
        EditError::InvalidReorder
    );
    assert_eq!(
        engine
            .cut_segment(TriggeredSegment {
                segment_index: 3,
                nearest_point: berlin(0.05),
            })
            .unwrap_err(),
        EditError::SegmentIndexOutOfRange { index: 3, count: 1 }
    );
    assert_eq!(
        engine
            .retry_segment(SegmentKey::new(a, WaypointId::default()))
            .unwrap_err(),
        EditError::UnknownSegment
    );

    let snapshot = engine.snapshot();
    assert_eq!(
        snapshot.waypoints.iter().map(|wp| wp.id).collect::<Vec<_>>(),
        vec![a, b]
    );
    assert!(snapshot.is_settled());
    assert_eq!(service.pending_count(), 0);
}

#[tokio::test]
async fn profile_change_refetches_with_new_parameters() {
    let (engine, service) = setup();

    let a = engine.append_waypoint(berlin(0.0)).unwrap();
    let b = engine.append_waypoint(berlin(0.1)).unwrap();
    let fetch = service.next_pending().await;
    assert_eq!(fetch.request.profile, RouteProfile::default());
    fetch.resolve();
    wait_for(&engine, |snap| snap.is_settled()).await;

    let key = SegmentKey::new(a, b);
    let trekking = RouteProfile {
        mode: TravelMode::Bicycle,
        fast: false,
    };
    engine.set_segment_profile(key, trekking).unwrap();

    let fetch = service.next_pending().await;
    assert_eq!(fetch.request.profile, trekking);
    fetch.resolve();

    let snapshot = wait_for(&engine, |snap| snap.is_settled()).await;
    assert_eq!(snapshot.segment(&key).unwrap().segment.profile, trekking);

    // Appending after the bicycle leg inherits its profile.
    engine.append_waypoint(berlin(0.2)).unwrap();
    let fetch = service.next_pending().await;
    assert_eq!(fetch.request.profile, trekking);
    fetch.resolve();
    wait_for(&engine, |snap| snap.is_settled()).await;
}

#[tokio::test]
async fn stats_accumulate_over_resolved_segments() {
    let (engine, service) = setup();

    engine.append_waypoint(berlin(0.0)).unwrap();
    engine.append_waypoint(berlin(0.1)).unwrap();
    engine.append_waypoint(berlin(0.2)).unwrap();
    service.next_pending().await.resolve();
    service.next_pending().await.resolve();

    let snapshot = wait_for(&engine, |snap| snap.is_settled()).await;
    let per_segment: f64 = snapshot
        .segments
        .iter()
        .map(|view| view.segment.track().unwrap().last().unwrap().distance_m)
        .sum();
    assert!(snapshot.stats.distance_m > 0.0);
    assert_eq!(snapshot.stats.distance_m, per_segment);

    // The combined profile runs on one continuously increasing axis.
    let profile = snapshot.elevation_profile();
    assert!(!profile.is_empty());
    for pair in profile.windows(2) {
        assert!(pair[1].distance_m >= pair[0].distance_m);
    }
    assert_eq!(profile.last().unwrap().distance_m, per_segment);
}

#[tokio::test]
async fn reset_clears_everything() {
    let (engine, service) = setup();

    engine.append_waypoint(berlin(0.0)).unwrap();
    engine.append_waypoint(berlin(0.1)).unwrap();
    let fetch = service.next_pending().await;

    engine.reset();
    fetch.resolve();
    sleep(Duration::from_millis(50)).await;

    let snapshot = engine.snapshot();
    assert!(snapshot.waypoints.is_empty());
    assert!(snapshot.segments.is_empty());
}
