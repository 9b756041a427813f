//! Device-presence probes backed by external commands.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Default timeout for a single probe invocation.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(4);

/// How probe stdout is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceParser {
    /// `adb devices` format: present when at least one line's second
    /// column is exactly `device` (skips the header and `unauthorized`/
    /// `offline` entries).
    AdbDevices,
    /// `idevice_id -l` format: present when stdout contains at least one
    /// non-empty line.
    NonEmptyLines,
}

impl PresenceParser {
    fn parse(self, stdout: &str) -> bool {
        match self {
            PresenceParser::AdbDevices => stdout.lines().any(|line| {
                let mut fields = line.split_whitespace();
                fields.next().is_some() && fields.next() == Some("device")
            }),
            PresenceParser::NonEmptyLines => {
                stdout.lines().any(|line| !line.trim().is_empty())
            }
        }
    }
}

/// A device-presence probe that runs an external list-devices command.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: String,
    args: Vec<String>,
    parser: PresenceParser,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        parser: PresenceParser,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            parser,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// The standard Android probe: `adb devices`.
    pub fn adb() -> Self {
        Self::new("adb", vec!["devices".into()], PresenceParser::AdbDevices)
    }

    /// The standard iOS probe: `idevice_id -l`.
    pub fn idevice() -> Self {
        Self::new("idevice_id", vec!["-l".into()], PresenceParser::NonEmptyLines)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runs the probe once. Any failure yields `false`.
    pub async fn check(&self) -> bool {
        let output = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(out)) if out.status.success() => {
                self.parser.parse(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(Ok(out)) => {
                tracing::debug!(
                    command = %self.command,
                    status = ?out.status.code(),
                    "probe exited non-zero, treating as absent"
                );
                false
            }
            Ok(Err(e)) => {
                tracing::debug!(command = %self.command, error = %e, "probe failed to run");
                false
            }
            Err(_) => {
                tracing::warn!(command = %self.command, "probe timed out, treating as absent");
                false
            }
        }
    }

    /// Returns `true` if the probe binary can be invoked at all, regardless
    /// of whether a device is attached. Used for startup preflight.
    pub async fn invocable(&self) -> bool {
        let output = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) => false,
            // Slow but running, so the binary exists.
            Err(_) => true,
        }
    }
}
