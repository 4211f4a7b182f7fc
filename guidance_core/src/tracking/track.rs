//! Track: filter state plus lifecycle metadata.

use crate::tracking::kalman::KalmanState;

/// One tracked target. Identity is stable: an id is never reused within a
/// run, and id 0 means "unassigned" everywhere in the system.
#[derive(Clone, Debug)]
pub struct Track {
    /// Unique id, always > 0
    pub id: u32,
    pub filter: KalmanState,
    /// Consecutive frames without an associated measurement
    pub missed_frames: i32,
    /// Total associated measurements, drives confirmation
    pub hits: u32,
    /// Confirmed after `confirm_hits` associations
    pub confirmed: bool,
    /// Smoothed measurement strength in [0,1]; orders the output
    pub confidence: f32,
}

impl Track {
    pub(crate) fn new(id: u32, filter: KalmanState, confidence: f32) -> Self {
        Self {
            id,
            filter,
            missed_frames: 0,
            hits: 1,
            confirmed: false,
            confidence,
        }
    }

    pub fn position(&self) -> [f32; 3] {
        self.filter.position()
    }

    pub fn velocity(&self) -> [f32; 3] {
        self.filter.velocity()
    }
}
