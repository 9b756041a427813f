//! Line sources for capture sessions.

use std::process::Stdio;
use std::time::Duration;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

/// Grace period for a log subprocess to exit on its own before it is killed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A live, line-oriented input stream for one capture session.
pub enum LineSource {
    Command(CommandSource),
    Synthetic(SyntheticSource),
}

impl LineSource {
    /// Reads the next line. `Ok(None)` means the stream ended (subprocess
    /// exited or closed its stdout); synthetic sources never end on their
    /// own.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        match self {
            LineSource::Command(source) => source.next_line().await,
            LineSource::Synthetic(source) => Ok(Some(source.next_line().await)),
        }
    }

    /// Releases the source. Must be called on every session exit path.
    pub async fn shutdown(&mut self) {
        if let LineSource::Command(source) = self {
            source.shutdown().await;
        }
    }
}

/// Streams stdout of an external log command, one line at a time.
pub struct CommandSource {
    command: String,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    grace: Duration,
}

impl CommandSource {
    /// Spawns the log command with piped stdout.
    pub fn spawn(command: &str, args: &[String]) -> std::io::Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::other("child stdout not captured")
        })?;

        Ok(Self {
            command: command.to_string(),
            child,
            lines: BufReader::new(stdout).lines(),
            grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }

    /// Waits up to the grace period for the child to exit, then kills it.
    async fn shutdown(&mut self) {
        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(command = %self.command, ?status, "log source exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(command = %self.command, error = %e, "failed to reap log source");
            }
            Err(_) => {
                tracing::debug!(command = %self.command, "log source still running, killing");
                if self.child.start_kill().is_ok() {
                    let _ = self.child.wait().await;
                }
            }
        }
    }
}

/// Generates one timestamped line per tick for platforms without a device
/// log stream.
pub struct SyntheticSource {
    platform: String,
    ticker: tokio::time::Interval,
    seq: u64,
}

impl SyntheticSource {
    pub fn new(platform: &str, interval: Duration) -> Self {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self {
            platform: platform.to_string(),
            ticker,
            seq: 0,
        }
    }

    async fn next_line(&mut self) -> String {
        self.ticker.tick().await;
        self.seq += 1;
        format!(
            "{} I/{}: simulated log event {}",
            Local::now().format("%m-%d %H:%M:%S%.3f"),
            self.platform,
            self.seq
        )
    }
}
