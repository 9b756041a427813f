//! Application orchestrator: wires the update check, connectivity monitor,
//! capture supervisor and the status aggregator together.

use std::path::{Path, PathBuf};
use std::time::Duration;

use logscribe_capture::{
    CaptureConfig, CaptureEvent, CaptureSupervisor, LogLayout, RotationPolicy, StopReason,
};
use logscribe_connectivity::{
    CommandProbe, ConnectivityEvent, ConnectivityHandle, ConnectivityMonitor, MonitorConfig,
    PresenceParser,
};
use logscribe_platform::{ConnectivityClass, PlatformRegistry};
use logscribe_update::{DownloadProgress, ManifestClient, UpdateApplier, UpdateError};

use crate::Cli;
use crate::bootstrap;
use crate::config::Config;

/// Runs the tool until shutdown is requested.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    // -- Update check: best-effort and bounded, before anything else --
    if !cli.skip_update_check && !config.manifest_url.is_empty() {
        if check_and_apply_update(&config.manifest_url).await? {
            // The updated installation has been relaunched with the
            // original arguments; this process is done.
            return Ok(());
        }
    }

    // -- iOS tool provisioning --
    let ios_tools =
        bootstrap::ensure_ios_tools(Path::new(&config.ios_tools_dir), &config.ios_tools_url)
            .await?;

    // -- Probes + preflight: missing device tools are fatal at startup --
    let probe_timeout = Duration::from_secs(config.probe_timeout_secs);
    let android_probe = CommandProbe::new(
        config.adb_path.clone(),
        vec!["devices".into()],
        PresenceParser::AdbDevices,
    )
    .with_timeout(probe_timeout);
    let ios_probe = CommandProbe::new(
        ios_tools.idevice_id.to_string_lossy().into_owned(),
        vec!["-l".into()],
        PresenceParser::NonEmptyLines,
    )
    .with_timeout(probe_timeout);

    if !android_probe.invocable().await {
        anyhow::bail!("required device tool not found: {}", config.adb_path);
    }
    if !ios_probe.invocable().await {
        anyhow::bail!(
            "required device tool not found: {}",
            ios_tools.idevice_id.display()
        );
    }

    // -- Connectivity monitor --
    let (monitor, conn_events) = ConnectivityMonitor::new(
        vec![
            (ConnectivityClass::AndroidLike, android_probe),
            (ConnectivityClass::IosLike, ios_probe),
        ],
        MonitorConfig {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            absence_threshold: Duration::from_secs(config.absence_threshold_secs),
        },
    );
    let connectivity = monitor.handle();
    monitor.start().await;

    // -- Capture supervisor --
    let registry = PlatformRegistry::standard_with_tools(
        &config.adb_path,
        &ios_tools.idevicesyslog.to_string_lossy(),
    );
    let tester = cli.tester.clone().unwrap_or_else(default_tester);
    let log_root = cli
        .log_root
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.log_root));
    let layout = LogLayout::new(log_root, &tester, &cli.feature);
    tracing::info!(tester = %tester, feature = %cli.feature, "session configured");

    let (supervisor, capture_events) = CaptureSupervisor::new(
        registry.clone(),
        layout,
        connectivity.clone(),
        CaptureConfig {
            rotation: RotationPolicy::new(config.rotate_threshold_bytes),
            synthetic_interval: Duration::from_millis(config.synthetic_interval_ms),
            ..CaptureConfig::default()
        },
    );

    // Honor start requests from the command line.
    for platform in &cli.platforms {
        if let Err(e) = supervisor.start(platform).await {
            tracing::warn!(platform = %platform, error = %e, "start request rejected");
        }
    }

    // -- Aggregate until shutdown --
    aggregate(
        &cli,
        &config,
        &registry,
        &supervisor,
        &connectivity,
        conn_events,
        capture_events,
    )
    .await;

    // -- Graceful shutdown --
    supervisor.stop_all().await;
    monitor.stop().await;
    Ok(())
}

/// Single consumer of connectivity and capture events; also drives the
/// periodic status refresh that stands in for the presentation layer.
async fn aggregate(
    cli: &Cli,
    config: &Config,
    registry: &PlatformRegistry,
    supervisor: &CaptureSupervisor,
    connectivity: &ConnectivityHandle,
    mut conn_events: tokio::sync::mpsc::Receiver<ConnectivityEvent>,
    mut capture_events: tokio::sync::mpsc::Receiver<CaptureEvent>,
) {
    let mut status_ticker =
        tokio::time::interval(Duration::from_secs(config.status_interval_secs.max(1)));
    status_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let deadline = async {
        if cli.run_for > 0 {
            tokio::time::sleep(Duration::from_secs(cli.run_for)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
            _ = &mut deadline => {
                tracing::info!(secs = cli.run_for, "run duration elapsed");
                break;
            }
            Some(event) = conn_events.recv() => {
                handle_connectivity_event(event, registry, supervisor).await;
            }
            Some(event) = capture_events.recv() => {
                handle_capture_event(event);
            }
            _ = status_ticker.tick() => {
                log_status(registry, supervisor, connectivity).await;
            }
        }
    }
}

async fn handle_connectivity_event(
    event: ConnectivityEvent,
    registry: &PlatformRegistry,
    supervisor: &CaptureSupervisor,
) {
    match event {
        ConnectivityEvent::Changed { class, present } => {
            if present {
                return;
            }
            // Disconnect only gates new starts; in-flight sessions keep
            // capturing until their stream ends. Make that visible.
            for platform in registry.iter().filter(|p| p.class == class) {
                if supervisor.is_running(&platform.name).await {
                    tracing::warn!(
                        platform = %platform.name,
                        "device disconnected; capture continues until the log stream ends"
                    );
                }
            }
        }
        ConnectivityEvent::AllDevicesAbsent { absent_for } => {
            tracing::warn!(
                absent_secs = absent_for.as_secs(),
                "no devices connected; check cables and authorization"
            );
        }
    }
}

fn handle_capture_event(event: CaptureEvent) {
    match event {
        CaptureEvent::Started { platform } => {
            tracing::info!(platform = %platform, "capture running");
        }
        CaptureEvent::Rotated { platform, index } => {
            tracing::info!(platform = %platform, index, "log file rotated");
        }
        CaptureEvent::Lines { platform, delta } => {
            tracing::debug!(platform = %platform, delta, "lines captured");
        }
        CaptureEvent::Stopped {
            platform,
            reason,
            total_lines,
        } => match reason {
            StopReason::Requested => {
                tracing::info!(platform = %platform, total_lines, "capture stopped");
            }
            StopReason::StreamEnded => {
                tracing::info!(platform = %platform, total_lines, "log stream ended");
            }
            StopReason::Failed(cause) => {
                tracing::error!(platform = %platform, total_lines, cause = %cause, "capture failed");
            }
        },
    }
}

async fn log_status(
    registry: &PlatformRegistry,
    supervisor: &CaptureSupervisor,
    connectivity: &ConnectivityHandle,
) {
    let counters = supervisor.counters().await;
    let snapshot = connectivity.snapshot();

    let mut parts = Vec::new();
    for platform in registry.iter() {
        let lines = counters.get(&platform.name).copied().unwrap_or(0);
        let state = if supervisor.is_running(&platform.name).await {
            "logging"
        } else if snapshot.is_present(platform.class) {
            "connected"
        } else {
            "not connected"
        };
        parts.push(format!("{}: {} lines ({state})", platform.name, lines));
    }
    tracing::info!(status = %parts.join(" | "), "dashboard");
}

/// Checks the release manifest and applies a differing release. Returns
/// `true` when the updated installation was relaunched and this process
/// should exit.
async fn check_and_apply_update(manifest_url: &str) -> anyhow::Result<bool> {
    let client = ManifestClient::new(manifest_url)?;
    let Some(manifest) = client.fetch().await else {
        return Ok(false);
    };

    let running = env!("CARGO_PKG_VERSION");
    if !manifest.differs_from(running) {
        tracing::debug!(version = running, "already up to date");
        return Ok(false);
    }
    tracing::info!(
        current = running,
        available = %manifest.version,
        notes = %manifest.notes,
        "update available"
    );

    let Some(install_dir) = install_dir() else {
        tracing::warn!("cannot resolve installation directory, skipping update");
        return Ok(false);
    };
    if !dir_writable(&install_dir) {
        tracing::warn!(
            dir = %install_dir.display(),
            "installation directory not writable, skipping update"
        );
        return Ok(false);
    }

    let applier = UpdateApplier::new(&install_dir)?.with_progress(Box::new(|progress| {
        match progress {
            DownloadProgress::Determinate { percent, .. } if percent % 10 == 0 => {
                tracing::info!(percent, "downloading update");
            }
            DownloadProgress::Determinate { .. } => {}
            DownloadProgress::Indeterminate { received } => {
                tracing::debug!(received, "downloading update");
            }
        }
    }));

    let args: Vec<String> = std::env::args().skip(1).collect();
    match applier.apply(&manifest, &args).await {
        Ok(plan) => match plan.execute() {
            Ok(_) => Ok(true),
            Err(e) => {
                // The new files are in place; only the restart failed.
                tracing::error!(error = %e, "update applied but relaunch failed; restart manually");
                Ok(false)
            }
        },
        Err(e @ UpdateError::ChecksumMismatch { .. }) => {
            tracing::error!(error = %e, "update aborted, previous installation untouched");
            Ok(false)
        }
        Err(e) => {
            tracing::error!(error = %e, "update failed");
            Ok(false)
        }
    }
}

fn install_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()?
        .parent()
        .map(Path::to_path_buf)
}

fn dir_writable(dir: &Path) -> bool {
    tempfile::Builder::new()
        .prefix(".logscribe-write-check")
        .tempfile_in(dir)
        .is_ok()
}

fn default_tester() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "tester".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tester_not_empty() {
        assert!(!default_tester().is_empty());
    }

    #[test]
    fn dir_writable_on_tempdir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(dir_writable(tmp.path()));
        assert!(!dir_writable(Path::new("/nonexistent/dir")));
    }

    #[test]
    fn install_dir_resolves() {
        // The test binary always has a parent directory.
        assert!(install_dir().is_some());
    }

    #[tokio::test]
    async fn unreachable_manifest_skips_update() {
        let relaunched = check_and_apply_update("http://127.0.0.1:1/manifest.json")
            .await
            .unwrap();
        assert!(!relaunched);
    }

    #[tokio::test]
    async fn equal_version_never_downloads() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Serve a manifest matching the running version; the archive URL is
        // unreachable, so any download attempt would fail loudly.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let body = format!(
            r#"{{"version":"{}","notes":"","url":"http://127.0.0.1:1/release.zip","sha256":"00"}}"#,
            env!("CARGO_PKG_VERSION")
        );

        let server = tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        let relaunched =
            check_and_apply_update(&format!("http://127.0.0.1:{port}/manifest.json"))
                .await
                .unwrap();
        assert!(!relaunched);

        server.abort();
    }
}
