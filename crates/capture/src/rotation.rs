//! Size-based file rotation.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::layout::LogLayout;

/// Default rotation threshold: 5 MiB.
pub const DEFAULT_ROTATE_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Decides when the active file is sealed.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    threshold_bytes: u64,
}

impl RotationPolicy {
    pub fn new(threshold_bytes: u64) -> Self {
        Self { threshold_bytes }
    }

    /// Checked after each write: rotate once the file size exceeds the
    /// threshold. The triggering write stays in the sealed file.
    pub fn should_rotate(&self, file_size: u64) -> bool {
        file_size > self.threshold_bytes
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ROTATE_THRESHOLD)
    }
}

/// Append-only line writer that seals and re-opens files per the policy.
///
/// The rotation index starts at 1 and never decreases. Files are opened in
/// append mode, so re-opening an existing path resumes at its current size.
pub struct RotatingWriter {
    layout: LogLayout,
    start: DateTime<Local>,
    platform_dir: String,
    policy: RotationPolicy,
    index: u32,
    file: File,
    file_size: u64,
}

impl RotatingWriter {
    /// Creates the session directory and opens rotation index 1.
    pub fn open(
        layout: LogLayout,
        start: DateTime<Local>,
        platform_dir: &str,
        policy: RotationPolicy,
    ) -> std::io::Result<Self> {
        let dir = layout.session_dir(start, platform_dir);
        std::fs::create_dir_all(&dir)?;

        let (file, file_size) = open_append(&layout.file_path(start, platform_dir, 1))?;
        Ok(Self {
            layout,
            start,
            platform_dir: platform_dir.to_string(),
            policy,
            index: 1,
            file,
            file_size,
        })
    }

    /// Appends `line` plus a newline, then rotates if the file now exceeds
    /// the threshold. Returns the new rotation index when a rotation
    /// happened.
    pub fn write_line(&mut self, line: &str) -> std::io::Result<Option<u32>> {
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file_size += line.len() as u64 + 1;

        if self.policy.should_rotate(self.file_size) {
            self.index += 1;
            let (file, file_size) = open_append(&self.current_path())?;
            // The old handle is sealed when replaced.
            self.file = file;
            self.file_size = file_size;
            tracing::debug!(
                platform = %self.platform_dir,
                index = self.index,
                "rotated log file"
            );
            return Ok(Some(self.index));
        }
        Ok(None)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Path of the currently active file.
    pub fn current_path(&self) -> PathBuf {
        self.layout
            .file_path(self.start, &self.platform_dir, self.index)
    }

    /// Flushes and releases the active handle.
    pub fn close(mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &std::path::Path) -> std::io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    Ok((file, size))
}
