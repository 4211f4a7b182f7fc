//! Core error types.
//!
//! The guidance loop never panics on the hot path: every sub-call returns a
//! value or one of these. Fatal kinds bubble to the binary, which logs and
//! exits with code -1.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the autonomy stack.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Bridge transport failure. Protocol errors (bad magic, regression)
    /// are fatal; open failures are retried at 1 Hz by the caller.
    #[error("bridge: {0}")]
    Bridge(#[from] bridge_ipc::BridgeError),

    /// Sensor intake failure while bringing a source up.
    #[error("sensor: {0}")]
    Sensor(#[from] sensor_hal::SensorError),

    /// Detector plan could not be loaded. Raised at construction only.
    #[error("failed to load detector plan {path:?}: {reason}")]
    DetectorLoad { path: PathBuf, reason: String },

    /// A fusion/preprocess kernel failed. Fatal.
    #[error("kernel failure: {0}")]
    Kernel(String),

    /// The frame handed to fusion carried no pixel data.
    #[error("invalid image frame")]
    InvalidFrame,

    /// Station or cloud transport failure. Handled locally by the link.
    #[error("transport: {0}")]
    Transport(#[from] io::Error),
}

impl CoreError {
    /// Fatal errors terminate the process with exit code -1.
    pub fn is_fatal(&self) -> bool {
        match self {
            CoreError::Bridge(e) => !e.is_retryable(),
            CoreError::DetectorLoad { .. } | CoreError::Kernel(_) => true,
            _ => false,
        }
    }
}
