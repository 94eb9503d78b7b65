//! BRouter HTTP client.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;
use serde::Deserialize;
use wayplan_core::{LatLon, RouteProfile, TrackMeta, TravelMode};

use crate::service::{RouteRequest, RouteService, RouteServiceError, RouteTrack};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// HTTP client for a BRouter-compatible routing service.
pub struct BrouterClient {
    client: Client,
    base_url: String,
}

impl BrouterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.into(),
        }
    }

    fn route_url(&self, request: &RouteRequest) -> String {
        // BRouter takes lon,lat pairs separated by '|'.
        format!(
            "{}/brouter?lonlats={},{}|{},{}&profile={}&alternativeidx=0&format=geojson",
            self.base_url,
            request.from.lon,
            request.from.lat,
            request.to.lon,
            request.to.lat,
            brouter_profile(&request.profile),
        )
    }

    async fn fetch_track(&self, request: RouteRequest) -> Result<RouteTrack, RouteServiceError> {
        let url = self.route_url(&request);
        tracing::debug!(%url, "requesting route");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = if body.trim().is_empty() {
                format!("route service returned {}", status)
            } else {
                body.trim().to_string()
            };
            return Err(RouteServiceError::Service(message));
        }

        parse_track(&body)
    }
}

impl RouteService for BrouterClient {
    fn compute_route(
        &self,
        request: RouteRequest,
    ) -> BoxFuture<'_, Result<RouteTrack, RouteServiceError>> {
        self.fetch_track(request).boxed()
    }
}

/// Map routing parameters to a BRouter profile name.
pub fn brouter_profile(profile: &RouteProfile) -> &'static str {
    match (profile.mode, profile.fast) {
        (TravelMode::Motorcar, true) => "car-fast",
        (TravelMode::Motorcar, false) => "car-eco",
        (TravelMode::Bicycle, true) => "fastbike",
        (TravelMode::Bicycle, false) => "trekking",
        (TravelMode::Foot, _) => "hiking",
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
    #[serde(default)]
    properties: FeatureProperties,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[lon, lat]` or `[lon, lat, alt]` per point.
    #[serde(default)]
    coordinates: Vec<Vec<f64>>,
}

/// Track properties. BRouter encodes the numeric ones as strings.
#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    #[serde(default, rename = "track-length")]
    track_length: Option<String>,
    #[serde(default, rename = "total-time")]
    total_time: Option<String>,
    #[serde(default, rename = "filtered ascend")]
    filtered_ascend: Option<String>,
}

impl FeatureProperties {
    fn to_meta(&self) -> TrackMeta {
        TrackMeta {
            track_length_m: parse_numeric(&self.track_length),
            total_time_s: parse_numeric(&self.total_time),
            ascend_m: parse_numeric(&self.filtered_ascend),
        }
    }
}

fn parse_numeric(value: &Option<String>) -> Option<f64> {
    value.as_deref().and_then(|v| v.trim().parse().ok())
}

/// Parse a BRouter response body.
///
/// BRouter reports routing errors ("no route found" and friends) as a
/// plain-text body; anything that is not a feature collection is surfaced
/// verbatim as the failure message.
fn parse_track(body: &str) -> Result<RouteTrack, RouteServiceError> {
    let parsed: FeatureCollection = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) => return Err(RouteServiceError::Service(body.trim().to_string())),
    };

    let mut positions = Vec::new();
    for feature in &parsed.features {
        for coordinate in &feature.geometry.coordinates {
            let (Some(&lon), Some(&lat)) = (coordinate.first(), coordinate.get(1)) else {
                continue;
            };
            positions.push(LatLon {
                lat,
                lon,
                alt: coordinate.get(2).copied(),
            });
        }
    }

    if positions.is_empty() {
        return Err(RouteServiceError::EmptyTrack);
    }

    let meta = parsed
        .features
        .first()
        .map(|feature| feature.properties.to_meta())
        .unwrap_or_default();

    Ok(RouteTrack { positions, meta })
}
