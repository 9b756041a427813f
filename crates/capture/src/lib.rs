//! Concurrent log capture and rotation engine.
//!
//! One background worker per active capture session streams lines from its
//! source (a device log subprocess or a synthetic generator) into rotated
//! files. The [`CaptureSupervisor`] owns all per-platform session state and
//! enforces the single-session-per-platform invariant; workers report state
//! changes over an event channel consumed by a single aggregator.

mod layout;
mod rotation;
mod session;
mod source;
mod supervisor;

pub use layout::LogLayout;
pub use rotation::{DEFAULT_ROTATE_THRESHOLD, RotatingWriter, RotationPolicy};
pub use session::{CaptureEvent, StopReason};
pub use source::{CommandSource, LineSource, SyntheticSource};
pub use supervisor::{CaptureConfig, CaptureSupervisor};

/// Errors from capture start requests. Everything that goes wrong *inside*
/// a running session is reported as a [`CaptureEvent::Stopped`] instead.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("capture already running for {0}")]
    AlreadyRunning(String),

    #[error("no device present for {0}")]
    DeviceAbsent(String),
}
