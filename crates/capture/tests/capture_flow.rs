//! End-to-end capture flows against real files and subprocess sources.

use std::path::{Path, PathBuf};
use std::time::Duration;

use logscribe_capture::{
    CaptureConfig, CaptureEvent, CaptureSupervisor, LogLayout, RotationPolicy, StopReason,
};
use logscribe_connectivity::{ConnectivityHandle, ConnectivitySnapshot};
use logscribe_platform::{CaptureStrategy, ConnectivityClass, Platform, PlatformRegistry};

fn synthetic_registry(name: &str) -> PlatformRegistry {
    PlatformRegistry::new(vec![Platform {
        name: name.into(),
        strategy: CaptureStrategy::Synthetic,
        class: ConnectivityClass::AlwaysOn,
    }])
}

fn collect_log_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

#[tokio::test]
async fn synthetic_session_records_every_generated_line() {
    let tmp = tempfile::tempdir().unwrap();
    let (supervisor, _events) = CaptureSupervisor::new(
        synthetic_registry("Standalone"),
        LogLayout::new(tmp.path(), "alice", "smoke"),
        ConnectivityHandle::fixed(ConnectivitySnapshot::default()),
        CaptureConfig {
            synthetic_interval: Duration::from_millis(5),
            ..CaptureConfig::default()
        },
    );

    supervisor.start("Standalone").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(supervisor.stop("Standalone").await);

    let counted = supervisor.counters().await["Standalone"];
    assert!(counted > 0, "session should have captured lines");

    // Exactly the counted lines are on disk, in a closed, readable file.
    let files = collect_log_files(tmp.path());
    assert_eq!(files.len(), 1);
    assert!(
        files[0]
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("log_alice_smoke_")
    );
    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert_eq!(content.lines().count() as u64, counted);
    assert!(content.ends_with('\n'));
}

#[tokio::test]
async fn rotation_preserves_every_line() {
    let tmp = tempfile::tempdir().unwrap();
    let (supervisor, mut events) = CaptureSupervisor::new(
        synthetic_registry("WebGL"),
        LogLayout::new(tmp.path(), "bob", "burnin"),
        ConnectivityHandle::fixed(ConnectivitySnapshot::default()),
        CaptureConfig {
            // Tiny threshold so a short run rotates several times.
            rotation: RotationPolicy::new(256),
            synthetic_interval: Duration::from_millis(2),
            ..CaptureConfig::default()
        },
    );

    supervisor.start("WebGL").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let final_index = supervisor.rotation_index("WebGL").await.unwrap();
    assert!(supervisor.stop("WebGL").await);

    assert!(final_index > 1, "expected at least one rotation");

    // Rotation indexes are contiguous starting at 1.
    let files = collect_log_files(tmp.path());
    assert!(files.len() >= final_index as usize);
    for file in &files {
        let name = file.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("log_bob_burnin_"));
    }

    // No lines lost or duplicated across rotation boundaries.
    let counted = supervisor.counters().await["WebGL"];
    let on_disk: usize = files
        .iter()
        .map(|f| std::fs::read_to_string(f).unwrap().lines().count())
        .sum();
    assert_eq!(on_disk as u64, counted);

    // Rotation events match the final index.
    let mut highest_rotated = 1;
    while let Ok(event) = events.try_recv() {
        if let CaptureEvent::Rotated { index, .. } = event {
            assert!(index > highest_rotated, "rotation index must increase");
            highest_rotated = index;
        }
    }
    assert!(highest_rotated >= final_index);
}

#[cfg(unix)]
#[tokio::test]
async fn subprocess_stream_end_is_a_normal_stop() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = PlatformRegistry::new(vec![Platform {
        name: "Android".into(),
        strategy: CaptureStrategy::DeviceLog {
            command: "sh".into(),
            args: vec![
                "-c".into(),
                "printf 'E/radio: boom\\nI/app: ready\\n'".into(),
            ],
            clear: Some(("true".into(), vec![])),
        },
        class: ConnectivityClass::AlwaysOn,
    }]);

    let (supervisor, mut events) = CaptureSupervisor::new(
        registry,
        LogLayout::new(tmp.path(), "carol", "radio"),
        ConnectivityHandle::fixed(ConnectivitySnapshot::default()),
        CaptureConfig {
            shutdown_grace: Duration::from_millis(200),
            ..CaptureConfig::default()
        },
    );

    supervisor.start("Android").await.unwrap();

    let mut saw_started = false;
    loop {
        match events.recv().await.expect("event stream closed early") {
            CaptureEvent::Started { platform } => {
                assert_eq!(platform, "Android");
                saw_started = true;
            }
            CaptureEvent::Stopped {
                reason,
                total_lines,
                ..
            } => {
                assert!(saw_started);
                assert_eq!(reason, StopReason::StreamEnded);
                assert_eq!(total_lines, 2);
                break;
            }
            _ => {}
        }
    }

    let files = collect_log_files(tmp.path());
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert_eq!(content, "E/radio: boom\nI/app: ready\n");
}

#[tokio::test]
async fn concurrent_platforms_write_to_separate_files() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = PlatformRegistry::new(vec![
        Platform {
            name: "WebGL".into(),
            strategy: CaptureStrategy::Synthetic,
            class: ConnectivityClass::AlwaysOn,
        },
        Platform {
            name: "Standalone".into(),
            strategy: CaptureStrategy::Synthetic,
            class: ConnectivityClass::AlwaysOn,
        },
    ]);

    let (supervisor, _events) = CaptureSupervisor::new(
        registry,
        LogLayout::new(tmp.path(), "dave", "multi"),
        ConnectivityHandle::fixed(ConnectivitySnapshot::default()),
        CaptureConfig {
            synthetic_interval: Duration::from_millis(5),
            ..CaptureConfig::default()
        },
    );

    supervisor.start("WebGL").await.unwrap();
    supervisor.start("Standalone").await.unwrap();
    assert_eq!(supervisor.active_count().await, 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    supervisor.stop_all().await;
    assert_eq!(supervisor.active_count().await, 0);

    let files = collect_log_files(tmp.path());
    assert_eq!(files.len(), 2);
    let dirs: Vec<String> = files
        .iter()
        .map(|f| {
            f.parent()
                .and_then(|p| p.file_name())
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert!(dirs.contains(&"webgl".to_string()));
    assert!(dirs.contains(&"standalone".to_string()));

    // Each platform's lines landed in its own file only.
    let counters = supervisor.counters().await;
    let total_on_disk: usize = files
        .iter()
        .map(|f| std::fs::read_to_string(f).unwrap().lines().count())
        .sum();
    assert_eq!(
        total_on_disk as u64,
        counters.values().sum::<u64>(),
        "per-platform files must account for every counted line"
    );
}
