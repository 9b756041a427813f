//! Device connectivity monitoring.
//!
//! Polls external device-listing commands on a fixed interval, publishes a
//! per-class presence snapshot, and emits a debounced alert when every
//! monitored class has been absent for longer than a threshold. Probe
//! failures of any kind (missing binary, non-zero exit, timeout) are treated
//! as absence, never as errors.

mod debounce;
mod monitor;
mod probe;

pub use debounce::AbsenceDebouncer;
pub use monitor::{
    ConnectivityEvent, ConnectivityHandle, ConnectivityMonitor, ConnectivitySnapshot,
    MonitorConfig,
};
pub use probe::{CommandProbe, PresenceParser};
