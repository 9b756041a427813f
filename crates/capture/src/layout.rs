//! Log directory and file naming.
//!
//! Layout: `<root>/<YYYYMMDD>/<tester>/<HH>/<feature>/<platform>/` with file
//! names `log_<tester>_<feature>_<N>.txt`. The date and hour come from the
//! capture start time, so one session always writes into a single hour
//! bucket even when it runs across the hour boundary.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Computes log paths for one tester/feature pair.
#[derive(Debug, Clone)]
pub struct LogLayout {
    root: PathBuf,
    tester: String,
    feature: String,
}

impl LogLayout {
    pub fn new(root: impl Into<PathBuf>, tester: &str, feature: &str) -> Self {
        Self {
            root: root.into(),
            tester: sanitize(tester),
            feature: sanitize(feature),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a session started at `start` on the given platform.
    pub fn session_dir(&self, start: DateTime<Local>, platform_dir: &str) -> PathBuf {
        self.root
            .join(start.format("%Y%m%d").to_string())
            .join(&self.tester)
            .join(start.format("%H").to_string())
            .join(&self.feature)
            .join(platform_dir)
    }

    /// File name for the given rotation index.
    pub fn file_name(&self, rotation_index: u32) -> String {
        format!("log_{}_{}_{}.txt", self.tester, self.feature, rotation_index)
    }

    /// Full path of the rotation-indexed file for a session.
    pub fn file_path(
        &self,
        start: DateTime<Local>,
        platform_dir: &str,
        rotation_index: u32,
    ) -> PathBuf {
        self.session_dir(start, platform_dir)
            .join(self.file_name(rotation_index))
    }
}

/// Keeps tester/feature names usable as path components.
fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
