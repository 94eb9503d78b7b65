//! Route segment synchronization engine.
//!
//! Keeps the set of fetched path segments consistent with a live-edited
//! waypoint sequence: derives which segments must exist, issues and
//! deduplicates asynchronous route fetches, and discards results that
//! concurrent edits have invalidated. Renderers observe the engine through
//! immutable snapshots on a watch channel.

mod engine;
mod error;
mod store;

pub use engine::{EngineConfig, RouteEngine};
pub use error::EditError;
pub use store::{RouteSnapshot, SegmentView};
