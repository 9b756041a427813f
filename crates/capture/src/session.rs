//! Per-platform capture worker.
//!
//! State machine: Idle → Starting → Streaming → (Rotating)* → Stopped.
//! Every exit path (stop request, stream end, write failure) closes the
//! active file and shuts the source down before the final event is emitted.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Local;
use logscribe_platform::{CaptureStrategy, Platform};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::layout::LogLayout;
use crate::rotation::{RotatingWriter, RotationPolicy};
use crate::source::{CommandSource, LineSource, SyntheticSource};

/// Line-count deltas are batched to keep event traffic bounded; the final
/// `Stopped` event carries the exact total regardless.
const LINES_EVENT_BATCH: u64 = 100;

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The user (or shutdown) requested the stop.
    Requested,
    /// The source ended on its own: subprocess exited or closed stdout.
    /// A normal terminal transition, not an error.
    StreamEnded,
    /// A write or read failed; the session cannot continue.
    Failed(String),
}

/// State-change events emitted by capture workers, consumed by a single
/// aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Started {
        platform: String,
    },
    Rotated {
        platform: String,
        index: u32,
    },
    Lines {
        platform: String,
        delta: u64,
    },
    Stopped {
        platform: String,
        reason: StopReason,
        total_lines: u64,
    },
}

/// Everything a session worker needs, handed over at spawn time.
pub(crate) struct SessionContext {
    pub platform: Platform,
    pub layout: LogLayout,
    pub policy: RotationPolicy,
    pub synthetic_interval: Duration,
    pub shutdown_grace: Duration,
    pub clear_timeout: Duration,
    pub cancel: CancellationToken,
    pub events_tx: mpsc::Sender<CaptureEvent>,
    pub lines: Arc<AtomicU64>,
    pub rotation_index: Arc<AtomicU32>,
}

/// Runs one capture session to completion.
pub(crate) async fn run(ctx: SessionContext) {
    let name = ctx.platform.name.clone();

    // -- Starting --
    let mut source = match open_source(&ctx).await {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(platform = %name, error = %e, "failed to start log source");
            emit(
                &ctx.events_tx,
                CaptureEvent::Stopped {
                    platform: name,
                    reason: StopReason::Failed(e.to_string()),
                    total_lines: 0,
                },
            )
            .await;
            return;
        }
    };

    let start = Local::now();
    let mut writer = match RotatingWriter::open(
        ctx.layout.clone(),
        start,
        &ctx.platform.log_dir_component(),
        ctx.policy,
    ) {
        Ok(writer) => writer,
        Err(e) => {
            tracing::error!(platform = %name, error = %e, "failed to open log file");
            source.shutdown().await;
            emit(
                &ctx.events_tx,
                CaptureEvent::Stopped {
                    platform: name,
                    reason: StopReason::Failed(e.to_string()),
                    total_lines: 0,
                },
            )
            .await;
            return;
        }
    };

    tracing::info!(platform = %name, file = %writer.current_path().display(), "capture started");
    emit(
        &ctx.events_tx,
        CaptureEvent::Started {
            platform: name.clone(),
        },
    )
    .await;

    // -- Streaming --
    let mut total: u64 = 0;
    let mut batched: u64 = 0;
    let reason = loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break StopReason::Requested,
            line = source.next_line() => match line {
                Ok(Some(line)) => match writer.write_line(&line) {
                    Ok(rotated) => {
                        total += 1;
                        batched += 1;
                        ctx.lines.fetch_add(1, Ordering::Relaxed);

                        if let Some(index) = rotated {
                            ctx.rotation_index.store(index, Ordering::Relaxed);
                            emit(
                                &ctx.events_tx,
                                CaptureEvent::Rotated {
                                    platform: name.clone(),
                                    index,
                                },
                            )
                            .await;
                        }
                        if batched >= LINES_EVENT_BATCH {
                            emit(
                                &ctx.events_tx,
                                CaptureEvent::Lines {
                                    platform: name.clone(),
                                    delta: batched,
                                },
                            )
                            .await;
                            batched = 0;
                        }
                    }
                    Err(e) => {
                        tracing::error!(platform = %name, error = %e, "log write failed");
                        break StopReason::Failed(e.to_string());
                    }
                },
                Ok(None) => break StopReason::StreamEnded,
                Err(e) => {
                    tracing::error!(platform = %name, error = %e, "log read failed");
                    break StopReason::Failed(e.to_string());
                }
            }
        }
    };

    // -- Stopped: guaranteed cleanup --
    if let Err(e) = writer.close() {
        tracing::warn!(platform = %name, error = %e, "failed to flush log file on close");
    }
    source.shutdown().await;

    if batched > 0 {
        emit(
            &ctx.events_tx,
            CaptureEvent::Lines {
                platform: name.clone(),
                delta: batched,
            },
        )
        .await;
    }

    tracing::info!(platform = %name, ?reason, total_lines = total, "capture stopped");
    emit(
        &ctx.events_tx,
        CaptureEvent::Stopped {
            platform: name,
            reason,
            total_lines: total,
        },
    )
    .await;
}

async fn open_source(ctx: &SessionContext) -> std::io::Result<LineSource> {
    match &ctx.platform.strategy {
        CaptureStrategy::DeviceLog {
            command,
            args,
            clear,
        } => {
            if let Some((clear_cmd, clear_args)) = clear {
                clear_device_buffer(clear_cmd, clear_args, ctx.clear_timeout).await;
            }
            let source = CommandSource::spawn(command, args)?.with_grace(ctx.shutdown_grace);
            Ok(LineSource::Command(source))
        }
        CaptureStrategy::Synthetic => Ok(LineSource::Synthetic(SyntheticSource::new(
            &ctx.platform.name,
            ctx.synthetic_interval,
        ))),
    }
}

/// Best-effort device-side buffer clear (e.g. `adb logcat -c`). Failure is
/// logged, never fatal.
async fn clear_device_buffer(command: &str, args: &[String], timeout: Duration) {
    let status = tokio::process::Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(timeout, status).await {
        Ok(Ok(status)) if status.success() => {
            tracing::debug!(command, "device log buffer cleared");
        }
        Ok(Ok(status)) => {
            tracing::warn!(command, ?status, "device buffer clear exited non-zero");
        }
        Ok(Err(e)) => {
            tracing::warn!(command, error = %e, "device buffer clear failed to run");
        }
        Err(_) => {
            tracing::warn!(command, "device buffer clear timed out");
        }
    }
}

async fn emit(tx: &mpsc::Sender<CaptureEvent>, event: CaptureEvent) {
    if tx.send(event).await.is_err() {
        tracing::debug!("capture event receiver dropped");
    }
}
