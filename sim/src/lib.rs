//! `sim` — Deterministic training simulator: scripted entities, radar
//! phenomenology, weather, fire control, and the bridge publisher.
//!
//! # Module layout
//! - [`entity`]      — Simulated entities with waypoints and micro-Doppler
//! - [`physics`]     — Drone dynamics, gimbal kinematics, projectiles
//! - [`radar_model`] — Radar returns: SNR, noise, multipath, clutter
//! - [`environment`] — Static geometry and occlusion tests
//! - [`weather`]     — Rain/fog state and radar attenuation
//! - [`scenario`]    — JSON mission loader and the built-in default mission
//! - [`stepper`]     — The per-tick engine publishing into the bridge
//!
//! Given the same mission and seed, every run is bit-reproducible: all
//! randomness flows from one seeded generator on a single thread.

pub mod entity;
pub mod environment;
pub mod physics;
pub mod radar_model;
pub mod scenario;
pub mod stepper;
pub mod weather;

use thiserror::Error;

pub use scenario::Mission;
pub use stepper::{SimStepper, StepperConfig};

/// Result type for simulator operations.
pub type SimResult<T> = Result<T, SimError>;

/// Errors raised while loading or running a scenario.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("failed to read mission file: {0}")]
    Io(#[from] std::io::Error),

    #[error("mission file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mission contains no entities")]
    EmptyMission,

    #[error("bridge: {0}")]
    Bridge(#[from] bridge_ipc::BridgeError),
}
