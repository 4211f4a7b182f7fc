//! `guidance_core` — The autonomy stack of the pod: sensor fusion,
//! perception, multi-target tracking, command policy, and comms.
//!
//! # Module layout
//! - [`device`]     — Accelerator stream/ordering model
//! - [`fusion`]     — Radar→camera projection into depth/velocity maps
//! - [`perception`] — Detector adapter over a pre-compiled inference plan
//! - [`tracking`]   — Constant-velocity Kalman tracker with gated greedy
//!   association and birth/confirm/coast/prune lifecycle
//! - [`control`]    — Command policy and the fixed-rate guidance loop
//! - [`comms`]      — Operator-station TCP link and cloud telemetry link
//! - [`platform`]   — Real-time scheduling helpers (SCHED_FIFO, affinity)

pub mod comms;
pub mod control;
pub mod device;
pub mod error;
pub mod fusion;
pub mod perception;
pub mod platform;
pub mod tracking;

pub use error::{CoreError, CoreResult};
pub use fusion::{FusedFrame, FusionEngine};
pub use perception::{Detection, DetectorAdapter};
pub use tracking::{Track, TrackManager, TrackerConfig};
