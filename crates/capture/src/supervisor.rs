//! Session orchestration.
//!
//! The supervisor owns one optional session per platform, re-validates
//! connectivity on every start request, and aggregates line counters for
//! display. Connectivity loss does not stop an in-flight session: capture
//! continues until the underlying stream ends or a stop is requested; only
//! the start gate is affected.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use logscribe_connectivity::ConnectivityHandle;
use logscribe_platform::PlatformRegistry;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::CaptureError;
use crate::layout::LogLayout;
use crate::rotation::RotationPolicy;
use crate::session::{self, CaptureEvent, SessionContext};

/// Capture tuning knobs.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub rotation: RotationPolicy,
    /// Tick interval of synthetic line generators.
    pub synthetic_interval: Duration,
    /// Grace period before a lingering log subprocess is killed.
    pub shutdown_grace: Duration,
    /// Timeout for the best-effort device buffer clear.
    pub clear_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            rotation: RotationPolicy::default(),
            synthetic_interval: Duration::from_secs(1),
            shutdown_grace: crate::source::DEFAULT_SHUTDOWN_GRACE,
            clear_timeout: Duration::from_secs(5),
        }
    }
}

struct SessionHandle {
    /// Guards against a finished worker reaping a successor session slot.
    id: u64,
    cancel: CancellationToken,
    lines: Arc<AtomicU64>,
    rotation_index: Arc<AtomicU32>,
    join: tokio::task::JoinHandle<()>,
}

/// Starts and stops capture sessions; at most one per platform.
pub struct CaptureSupervisor {
    inner: Arc<Mutex<SupervisorInner>>,
    events_tx: mpsc::Sender<CaptureEvent>,
}

struct SupervisorInner {
    registry: PlatformRegistry,
    layout: LogLayout,
    config: CaptureConfig,
    connectivity: ConnectivityHandle,
    sessions: HashMap<String, SessionHandle>,
    /// Lines from completed sessions, per platform, since startup.
    totals: HashMap<String, u64>,
    next_id: u64,
}

impl CaptureSupervisor {
    /// Creates the supervisor and the capture event receiver for the
    /// aggregator.
    pub fn new(
        registry: PlatformRegistry,
        layout: LogLayout,
        connectivity: ConnectivityHandle,
        config: CaptureConfig,
    ) -> (Self, mpsc::Receiver<CaptureEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        (
            Self {
                inner: Arc::new(Mutex::new(SupervisorInner {
                    registry,
                    layout,
                    config,
                    connectivity,
                    sessions: HashMap::new(),
                    totals: HashMap::new(),
                    next_id: 0,
                })),
                events_tx,
            },
            events_rx,
        )
    }

    /// Starts a capture session for `platform_name`.
    ///
    /// Rejected when a session is already active for the platform or when
    /// the platform's connectivity class currently reports absent. The
    /// caller's UI is expected to disable the control, but the supervisor
    /// re-validates.
    pub async fn start(&self, platform_name: &str) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;

        let platform = inner
            .registry
            .get(platform_name)
            .cloned()
            .ok_or_else(|| CaptureError::UnknownPlatform(platform_name.to_string()))?;

        if inner.sessions.contains_key(platform_name) {
            return Err(CaptureError::AlreadyRunning(platform_name.to_string()));
        }
        if !inner.connectivity.is_present(platform.class) {
            return Err(CaptureError::DeviceAbsent(platform_name.to_string()));
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let cancel = CancellationToken::new();
        let lines = Arc::new(AtomicU64::new(0));
        let rotation_index = Arc::new(AtomicU32::new(1));

        let ctx = SessionContext {
            platform,
            layout: inner.layout.clone(),
            policy: inner.config.rotation,
            synthetic_interval: inner.config.synthetic_interval,
            shutdown_grace: inner.config.shutdown_grace,
            clear_timeout: inner.config.clear_timeout,
            cancel: cancel.clone(),
            events_tx: self.events_tx.clone(),
            lines: Arc::clone(&lines),
            rotation_index: Arc::clone(&rotation_index),
        };

        let supervisor = Arc::clone(&self.inner);
        let name = platform_name.to_string();
        let worker_lines = Arc::clone(&lines);

        let join = tokio::spawn(async move {
            session::run(ctx).await;

            // Fold the final count into the running totals and release the
            // slot so a new start can be honored. Both under one lock.
            let mut inner = supervisor.lock().await;
            let total = worker_lines.load(Ordering::Relaxed);
            *inner.totals.entry(name.clone()).or_default() += total;
            if inner.sessions.get(&name).is_some_and(|h| h.id == id) {
                inner.sessions.remove(&name);
            }
        });

        inner.sessions.insert(
            platform_name.to_string(),
            SessionHandle {
                id,
                cancel,
                lines,
                rotation_index,
                join,
            },
        );
        Ok(())
    }

    /// Requests a cooperative stop and waits for the worker to finish.
    /// Returns `false` if no session was running.
    pub async fn stop(&self, platform_name: &str) -> bool {
        let handle = {
            let mut inner = self.inner.lock().await;
            inner.sessions.remove(platform_name)
        };

        match handle {
            Some(handle) => {
                handle.cancel.cancel();
                let _ = handle.join.await;
                true
            }
            None => false,
        }
    }

    /// Stops every active session, waiting for each worker.
    pub async fn stop_all(&self) {
        let handles: Vec<(String, SessionHandle)> = {
            let mut inner = self.inner.lock().await;
            inner.sessions.drain().collect()
        };

        for (platform, handle) in handles {
            handle.cancel.cancel();
            let _ = handle.join.await;
            tracing::debug!(platform = %platform, "session stopped");
        }
    }

    pub async fn is_running(&self, platform_name: &str) -> bool {
        self.inner.lock().await.sessions.contains_key(platform_name)
    }

    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    /// Cumulative line counts per platform since startup, recomputed on
    /// demand: completed-session totals plus live session counters.
    pub async fn counters(&self) -> HashMap<String, u64> {
        let inner = self.inner.lock().await;
        let mut counters = inner.totals.clone();
        for (platform, handle) in &inner.sessions {
            *counters.entry(platform.clone()).or_default() +=
                handle.lines.load(Ordering::Relaxed);
        }
        counters
    }

    /// Current rotation index of a running session.
    pub async fn rotation_index(&self, platform_name: &str) -> Option<u32> {
        self.inner
            .lock()
            .await
            .sessions
            .get(platform_name)
            .map(|h| h.rotation_index.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logscribe_connectivity::ConnectivitySnapshot;
    use logscribe_platform::{CaptureStrategy, ConnectivityClass, Platform};

    fn synthetic_registry() -> PlatformRegistry {
        PlatformRegistry::new(vec![Platform {
            name: "WebGL".into(),
            strategy: CaptureStrategy::Synthetic,
            class: ConnectivityClass::AlwaysOn,
        }])
    }

    fn fast_config() -> CaptureConfig {
        CaptureConfig {
            synthetic_interval: Duration::from_millis(5),
            shutdown_grace: Duration::from_millis(100),
            ..CaptureConfig::default()
        }
    }

    fn supervisor_with(
        registry: PlatformRegistry,
        dir: &std::path::Path,
        snapshot: ConnectivitySnapshot,
    ) -> (CaptureSupervisor, mpsc::Receiver<CaptureEvent>) {
        CaptureSupervisor::new(
            registry,
            LogLayout::new(dir, "tester", "feat"),
            ConnectivityHandle::fixed(snapshot),
            fast_config(),
        )
    }

    #[tokio::test]
    async fn start_unknown_platform_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (supervisor, _rx) = supervisor_with(
            synthetic_registry(),
            tmp.path(),
            ConnectivitySnapshot::default(),
        );
        assert!(matches!(
            supervisor.start("Switch").await,
            Err(CaptureError::UnknownPlatform(_))
        ));
    }

    #[tokio::test]
    async fn second_start_rejected_while_running() {
        let tmp = tempfile::tempdir().unwrap();
        let (supervisor, _rx) = supervisor_with(
            synthetic_registry(),
            tmp.path(),
            ConnectivitySnapshot::default(),
        );

        supervisor.start("WebGL").await.unwrap();
        assert!(matches!(
            supervisor.start("WebGL").await,
            Err(CaptureError::AlreadyRunning(_))
        ));
        assert_eq!(supervisor.active_count().await, 1);
        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn start_gated_on_connectivity() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = PlatformRegistry::new(vec![Platform {
            name: "Android".into(),
            strategy: CaptureStrategy::Synthetic,
            class: ConnectivityClass::AndroidLike,
        }]);

        // Absent by default.
        let (supervisor, _rx) =
            supervisor_with(registry.clone(), tmp.path(), ConnectivitySnapshot::default());
        assert!(matches!(
            supervisor.start("Android").await,
            Err(CaptureError::DeviceAbsent(_))
        ));

        // Present once the snapshot says so.
        let mut snapshot = ConnectivitySnapshot::default();
        snapshot.set(ConnectivityClass::AndroidLike, true);
        let (supervisor, _rx) = supervisor_with(registry, tmp.path(), snapshot);
        supervisor.start("Android").await.unwrap();
        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn stop_returns_false_when_idle() {
        let tmp = tempfile::tempdir().unwrap();
        let (supervisor, _rx) = supervisor_with(
            synthetic_registry(),
            tmp.path(),
            ConnectivitySnapshot::default(),
        );
        assert!(!supervisor.stop("WebGL").await);
    }

    #[tokio::test]
    async fn stream_end_releases_slot_for_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = PlatformRegistry::new(vec![Platform {
            name: "Android".into(),
            strategy: CaptureStrategy::DeviceLog {
                command: "sh".into(),
                args: vec!["-c".into(), "printf 'a\\nb\\nc\\n'".into()],
                clear: None,
            },
            class: ConnectivityClass::AlwaysOn,
        }]);
        let (supervisor, mut events) =
            supervisor_with(registry, tmp.path(), ConnectivitySnapshot::default());

        supervisor.start("Android").await.unwrap();

        // The stream ends on its own; the supervisor slot must clear.
        let mut stopped = None;
        while let Some(event) = events.recv().await {
            if let CaptureEvent::Stopped { reason, total_lines, .. } = event {
                stopped = Some((reason, total_lines));
                break;
            }
        }
        let (reason, total_lines) = stopped.expect("expected a Stopped event");
        assert_eq!(reason, crate::StopReason::StreamEnded);
        assert_eq!(total_lines, 3);

        // The worker releases the slot right after emitting Stopped.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!supervisor.is_running("Android").await);

        // A new start is honored again.
        supervisor.start("Android").await.unwrap();
        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn counters_accumulate_across_sessions() {
        let tmp = tempfile::tempdir().unwrap();
        let (supervisor, _rx) = supervisor_with(
            synthetic_registry(),
            tmp.path(),
            ConnectivitySnapshot::default(),
        );

        supervisor.start("WebGL").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(supervisor.stop("WebGL").await);
        let after_first = supervisor.counters().await["WebGL"];
        assert!(after_first > 0);

        supervisor.start("WebGL").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(supervisor.stop("WebGL").await);
        let after_second = supervisor.counters().await["WebGL"];
        assert!(after_second > after_first, "totals must accumulate");
    }
}
