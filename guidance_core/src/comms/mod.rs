//! Comms: the operator-station TCP link and the cloud telemetry link.
//!
//! # Module layout
//! - [`proto`]   — prost message types shared with the cloud ingestor
//! - [`station`] — accept-one TCP server for the local operator station
//! - [`cloud`]   — backpressured telemetry uplink with reconnect

pub mod cloud;
pub mod proto;
pub mod station;

pub use cloud::{CloudConfig, CloudLink};
pub use station::{StationConfig, StationLink};
