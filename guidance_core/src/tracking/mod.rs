//! Multi-target tracking: constant-velocity Kalman filters under a gated
//! greedy data-association engine with birth, confirmation, coasting, and
//! pruning.
//!
//! # Module layout
//! - [`kalman`]        — Diagonal-covariance CV filter (predict / update)
//! - [`track`]         — Track struct and lifecycle metadata
//! - [`track_manager`] — Association and the birth/confirm/coast/prune cycle

pub mod kalman;
pub mod track;
pub mod track_manager;

pub use kalman::{KalmanConfig, KalmanState};
pub use track::Track;
pub use track_manager::{TrackManager, TrackerConfig};
