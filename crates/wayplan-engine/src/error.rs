//! Inbound boundary errors.
//!
//! Every invalid edit is rejected here with the sequence left unchanged;
//! nothing in this module is reachable from the fetch path.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("waypoint index {index} out of range (sequence length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("segment index {index} out of range ({count} segments)")]
    SegmentIndexOutOfRange { index: usize, count: usize },

    #[error("waypoint sequence is empty")]
    EmptySequence,

    #[error("reorder must be a permutation of the current waypoint ids")]
    InvalidReorder,

    #[error("a waypoint is being repositioned")]
    RepositionInProgress,

    #[error("no waypoint is being repositioned")]
    NoRepositionActive,

    #[error("no segment with the given key")]
    UnknownSegment,

    #[error("segment fetch already in flight")]
    FetchInFlight,
}
