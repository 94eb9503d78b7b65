//! Route planning demo against a live BRouter instance.
//!
//! Builds a waypoint sequence from the command line, lets the engine fetch
//! a path per adjacent pair and prints segment status plus route totals.
//! Optionally cuts the route at a given position afterwards to show the
//! segment store re-synchronizing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::time::timeout;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wayplan_brouter::BrouterClient;
use wayplan_core::{nearest_track_point, LatLon, RouteProfile, TravelMode, TriggeredSegment};
use wayplan_engine::{EngineConfig, RouteEngine, RouteSnapshot};

/// Plan a route across the given waypoints via BRouter
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// BRouter endpoint
    #[arg(long, default_value = "http://localhost:17777")]
    url: String,

    /// Travel mode: motorcar, bicycle or foot
    #[arg(long, default_value = "motorcar")]
    mode: TravelMode,

    /// Prefer the most economic route over the fastest one
    #[arg(long)]
    eco: bool,

    /// Cut the route at the segment nearest to this lat,lon afterwards
    #[arg(long)]
    cut_at: Option<String>,

    /// Give up waiting for the routing service after this many seconds
    #[arg(long, default_value_t = 60)]
    wait: u64,

    /// Waypoints as lat,lon pairs (at least two)
    #[arg(required = true, num_args = 2..)]
    waypoints: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let profile = RouteProfile {
        mode: args.mode,
        fast: !args.eco,
    };
    let config = EngineConfig {
        default_profile: profile,
        ..EngineConfig::default()
    };
    let engine = RouteEngine::new(Arc::new(BrouterClient::new(&args.url)), config);

    for raw in &args.waypoints {
        let location = parse_latlon(raw)?;
        engine.append_waypoint(location)?;
    }

    println!(
        "Planning {} route over {} waypoints via {}",
        args.mode,
        args.waypoints.len(),
        args.url
    );
    let snapshot = wait_for_settle(&engine, args.wait).await?;
    print_route(&snapshot);

    if let Some(raw) = &args.cut_at {
        let position = parse_latlon(raw)?;
        let nearest = nearest_track_point(
            snapshot.segments.iter().map(|view| &view.segment),
            &position,
        )
        .context("no resolved segment to cut")?;
        let view = &snapshot.segments[nearest.segment_index];
        let point = view.segment.track().context("segment not resolved")?[nearest.point_index];

        println!(
            "\nCutting segment {} at {:.5},{:.5} ({:.0} m from the given position)",
            nearest.segment_index + 1,
            point.lat,
            point.lon,
            nearest.separation_m
        );
        engine.cut_segment(TriggeredSegment {
            segment_index: nearest.segment_index,
            nearest_point: point.location(),
        })?;

        let snapshot = wait_for_settle(&engine, args.wait).await?;
        print_route(&snapshot);
    }

    Ok(())
}

async fn wait_for_settle(engine: &RouteEngine, wait_secs: u64) -> anyhow::Result<RouteSnapshot> {
    let mut rx = engine.subscribe();
    timeout(Duration::from_secs(wait_secs), async {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if !snapshot.segments.is_empty() && snapshot.is_settled() {
                return anyhow::Ok(snapshot);
            }
            rx.changed().await.context("engine gone")?;
        }
    })
    .await
    .context("routing service did not settle in time")?
}

fn print_route(snapshot: &RouteSnapshot) {
    for (index, view) in snapshot.segments.iter().enumerate() {
        match (view.segment.track(), view.segment.error_message()) {
            (Some(track), _) => {
                let distance_m = track.last().map(|point| point.distance_m).unwrap_or(0.0);
                println!(
                    "  segment {}: {:.2} km ({} points)",
                    index + 1,
                    distance_m / 1000.0,
                    view.segment.positions().map(|p| p.len()).unwrap_or(0)
                );
            }
            (_, Some(message)) => println!("  segment {}: FAILED: {}", index + 1, message),
            _ => println!("  segment {}: not resolved", index + 1),
        }
    }

    let stats = &snapshot.stats;
    println!(
        "Total: {:.2} km, up {:.0} m, down {:.0} m",
        stats.distance_m / 1000.0,
        stats.ascent_m,
        stats.descent_m
    );
}

fn parse_latlon(raw: &str) -> anyhow::Result<LatLon> {
    let (lat, lon) = raw
        .split_once(',')
        .with_context(|| format!("expected lat,lon but got '{raw}'"))?;
    Ok(LatLon::new(
        lat.trim().parse().with_context(|| format!("bad latitude in '{raw}'"))?,
        lon.trim().parse().with_context(|| format!("bad longitude in '{raw}'"))?,
    ))
}
