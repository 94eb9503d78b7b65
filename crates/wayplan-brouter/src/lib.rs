//! Route computation client.
//!
//! [`RouteService`] is the engine's outbound seam; [`BrouterClient`] is the
//! production implementation, talking to a BRouter-compatible HTTP service.

pub mod client;
pub mod service;

pub use client::{brouter_profile, BrouterClient};
pub use service::{RouteRequest, RouteService, RouteServiceError, RouteTrack};
