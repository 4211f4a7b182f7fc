//! `bridge_ipc` — Zero-serialization shared-memory transport between the
//! simulator process and the flight core.
//!
//! # Module layout
//! - [`layout`]  — Fixed byte layout of the bridge region and field codecs
//! - [`reader`]  — Consumer side (flight core): poll / read / send_command
//! - [`writer`]  — Producer side (simulator): publish / latest_command
//! - [`station`] — Fixed-size operator-station packet codecs
//!
//! The region is a single file mapped by both processes. The producer
//! publishes a frame by writing the payload, then storing the header's
//! `state_flag` with release semantics; a consumer that observes the flag
//! with acquire semantics therefore sees the full payload.

pub mod layout;
pub mod reader;
mod region;
pub mod station;
pub mod writer;

use std::io;
use thiserror::Error;

pub use layout::{ControlCommand, SimRadarPoint};
pub use reader::{BridgeFrame, BridgeReader};
pub use writer::BridgeWriter;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur on the shared-memory bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Region file missing or not mappable — the peer has not created it yet.
    #[error("failed to open bridge region: {0}")]
    FailedOpen(#[from] io::Error),

    /// Region exists but the magic sentinel does not match.
    #[error("bridge magic mismatch: expected {expected:#018x}, got {actual:#018x}")]
    BadMagic { expected: u64, actual: u64 },

    /// Region file is smaller than the fixed layout requires.
    #[error("bridge region too small: {actual} bytes (need {required})")]
    RegionTooSmall { required: usize, actual: usize },

    /// The producer's frame counter moved backwards twice in a row.
    #[error("bridge frame id regressed: last seen {last_seen}, observed {observed}")]
    FrameRegression { last_seen: u64, observed: u64 },

    /// No frame is ready for reading.
    #[error("no new bridge frame available")]
    NoData,
}

impl BridgeError {
    /// True for conditions the caller handles by retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::FailedOpen(_) | BridgeError::NoData)
    }
}
