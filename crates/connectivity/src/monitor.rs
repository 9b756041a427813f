//! Background connectivity polling worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use logscribe_platform::ConnectivityClass;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::debounce::{AbsenceDebouncer, DEFAULT_ABSENCE_THRESHOLD};
use crate::probe::CommandProbe;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Monitor timing configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub absence_threshold: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            absence_threshold: DEFAULT_ABSENCE_THRESHOLD,
        }
    }
}

/// Per-class presence as of the latest poll.
///
/// `AlwaysOn` is present by definition; probed classes default to absent
/// until the first poll completes.
#[derive(Debug, Clone, Default)]
pub struct ConnectivitySnapshot {
    present: HashMap<ConnectivityClass, bool>,
}

impl ConnectivitySnapshot {
    pub fn is_present(&self, class: ConnectivityClass) -> bool {
        match class {
            ConnectivityClass::AlwaysOn => true,
            other => self.present.get(&other).copied().unwrap_or(false),
        }
    }

    pub fn set(&mut self, class: ConnectivityClass, present: bool) {
        self.present.insert(class, present);
    }
}

/// Events emitted by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// A probed class transitioned between present and absent.
    Changed {
        class: ConnectivityClass,
        present: bool,
    },
    /// Every probed class has been absent for at least the configured
    /// threshold. Fires once per unbroken absence interval.
    AllDevicesAbsent { absent_for: Duration },
}

/// Read-only view of the latest snapshot, cheap to clone.
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    rx: watch::Receiver<ConnectivitySnapshot>,
}

impl ConnectivityHandle {
    /// Handle pinned to a fixed snapshot, for contexts without a monitor
    /// (tests, always-on-only runs). A `watch` receiver keeps the last
    /// value after the sender drops.
    pub fn fixed(snapshot: ConnectivitySnapshot) -> Self {
        let (tx, rx) = watch::channel(snapshot);
        drop(tx);
        Self { rx }
    }

    pub fn snapshot(&self) -> ConnectivitySnapshot {
        self.rx.borrow().clone()
    }

    pub fn is_present(&self, class: ConnectivityClass) -> bool {
        self.rx.borrow().is_present(class)
    }
}

/// Polls device-presence probes on an interval.
pub struct ConnectivityMonitor {
    inner: Arc<Mutex<MonitorInner>>,
    snapshot_tx: watch::Sender<ConnectivitySnapshot>,
}

struct MonitorInner {
    probes: Vec<(ConnectivityClass, CommandProbe)>,
    config: MonitorConfig,
    events_tx: mpsc::Sender<ConnectivityEvent>,
    cancel: Option<CancellationToken>,
}

impl ConnectivityMonitor {
    /// Creates a monitor over the given probes. Returns the monitor and
    /// the event receiver for the aggregator.
    pub fn new(
        probes: Vec<(ConnectivityClass, CommandProbe)>,
        config: MonitorConfig,
    ) -> (Self, mpsc::Receiver<ConnectivityEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (snapshot_tx, _) = watch::channel(ConnectivitySnapshot::default());
        (
            Self {
                inner: Arc::new(Mutex::new(MonitorInner {
                    probes,
                    config,
                    events_tx,
                    cancel: None,
                })),
                snapshot_tx,
            },
            events_rx,
        )
    }

    /// Monitor with the standard `adb` / `idevice_id` probes.
    pub fn standard(config: MonitorConfig) -> (Self, mpsc::Receiver<ConnectivityEvent>) {
        Self::new(
            vec![
                (ConnectivityClass::AndroidLike, CommandProbe::adb()),
                (ConnectivityClass::IosLike, CommandProbe::idevice()),
            ],
            config,
        )
    }

    /// Returns a cloneable read handle on the latest snapshot.
    pub fn handle(&self) -> ConnectivityHandle {
        ConnectivityHandle {
            rx: self.snapshot_tx.subscribe(),
        }
    }

    /// Starts the polling loop. Stops any previous loop first.
    pub async fn start(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }

        let cancel = CancellationToken::new();
        inner.cancel = Some(cancel.clone());
        let interval = inner.config.poll_interval;
        drop(inner);

        let monitor_inner = Arc::clone(&self.inner);
        let snapshot_tx = self.snapshot_tx.clone();

        tokio::spawn(async move {
            monitor_loop(monitor_inner, snapshot_tx, cancel).await;
        });

        tracing::info!(interval_secs = interval.as_secs(), "connectivity monitor started");
    }

    /// Stops the polling loop.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
            tracing::info!("connectivity monitor stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.cancel.is_some()
    }

    /// Runs a single probe round outside the loop, publishing the snapshot
    /// and emitting `Changed` events. Absence alerting is time-based and
    /// only happens inside the running loop.
    pub async fn poll_once(&self) -> ConnectivitySnapshot {
        poll_round(&self.inner, &self.snapshot_tx).await
    }
}

async fn monitor_loop(
    inner: Arc<Mutex<MonitorInner>>,
    snapshot_tx: watch::Sender<ConnectivitySnapshot>,
    cancel: CancellationToken,
) {
    let (interval, threshold, events_tx) = {
        let guard = inner.lock().await;
        (
            guard.config.poll_interval,
            guard.config.absence_threshold,
            guard.events_tx.clone(),
        )
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut debouncer = AbsenceDebouncer::new(threshold);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = poll_round(&inner, &snapshot_tx).await;

                let probed: Vec<ConnectivityClass> = {
                    inner.lock().await.probes.iter().map(|(c, _)| *c).collect()
                };
                let all_absent =
                    !probed.is_empty() && probed.iter().all(|c| !snapshot.is_present(*c));

                if let Some(absent_for) = debouncer.observe(all_absent, Instant::now()) {
                    tracing::warn!(
                        absent_secs = absent_for.as_secs(),
                        "no devices detected on any monitored platform"
                    );
                    let _ = events_tx
                        .send(ConnectivityEvent::AllDevicesAbsent { absent_for })
                        .await;
                }
            }
        }
    }
}

async fn poll_round(
    inner: &Arc<Mutex<MonitorInner>>,
    snapshot_tx: &watch::Sender<ConnectivitySnapshot>,
) -> ConnectivitySnapshot {
    // Clone probes out so the lock is not held across command invocations.
    let (probes, events_tx) = {
        let guard = inner.lock().await;
        (guard.probes.clone(), guard.events_tx.clone())
    };

    let mut snapshot = snapshot_tx.borrow().clone();
    for (class, probe) in &probes {
        let was_present = snapshot.is_present(*class);
        let present = probe.check().await;
        snapshot.set(*class, present);

        if present != was_present {
            tracing::info!(?class, present, "connectivity changed");
            let _ = events_tx
                .send(ConnectivityEvent::Changed {
                    class: *class,
                    present,
                })
                .await;
        }
    }

    snapshot_tx.send_replace(snapshot.clone());
    snapshot
}
