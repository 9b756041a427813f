//! Update application: download, verify, stage, overlay, relaunch.

use std::path::{Path, PathBuf};

use crate::download::{ProgressFn, download_to_file};
use crate::manifest::Manifest;
use crate::verify::{digests_match, sha256_file};
use crate::{DEFAULT_ENTRYPOINT, UpdateError, extract_zip};

/// The restart request produced by a successful apply.
///
/// The applier never terminates the running process itself; the caller
/// executes the plan and exits, so the pipeline stays testable end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaunchPlan {
    pub entrypoint: PathBuf,
    pub args: Vec<String>,
}

impl RelaunchPlan {
    /// Spawns the updated entrypoint with the original arguments and
    /// returns the new process id. The caller is expected to exit after
    /// this succeeds. On failure the applied update stays in place.
    pub fn execute(&self) -> Result<u32, UpdateError> {
        let child = std::process::Command::new(&self.entrypoint)
            .args(&self.args)
            .spawn()
            .map_err(UpdateError::Relaunch)?;
        tracing::info!(
            entrypoint = %self.entrypoint.display(),
            pid = child.id(),
            "relaunched updated installation"
        );
        Ok(child.id())
    }
}

/// Applies a release described by a [`Manifest`] onto an installation
/// directory.
pub struct UpdateApplier {
    http: reqwest::Client,
    install_dir: PathBuf,
    on_progress: Option<ProgressFn>,
}

impl UpdateApplier {
    pub fn new(install_dir: impl Into<PathBuf>) -> Result<Self, UpdateError> {
        // No whole-request timeout: archives can be large. Connecting is
        // still bounded.
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            install_dir: install_dir.into(),
            on_progress: None,
        })
    }

    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Runs one update transaction.
    ///
    /// The installation directory is only touched after the downloaded
    /// archive's digest matches the manifest. Temp resources (download
    /// file, staging directory) live in one [`tempfile::TempDir`] and are
    /// removed on every exit path. Not cancellable between verification
    /// and file replacement.
    pub async fn apply(
        &self,
        manifest: &Manifest,
        relaunch_args: &[String],
    ) -> Result<RelaunchPlan, UpdateError> {
        let workdir = tempfile::tempdir()?;
        let archive_path = workdir.path().join("update.zip");

        tracing::info!(version = %manifest.version, url = %manifest.url, "downloading update");
        download_to_file(
            &self.http,
            &manifest.url,
            &archive_path,
            self.on_progress.as_ref(),
        )
        .await?;

        let actual = sha256_file(&archive_path)?;
        if !digests_match(&manifest.sha256, &actual) {
            tracing::error!(
                expected = %manifest.sha256,
                actual = %actual,
                "update checksum mismatch, aborting"
            );
            return Err(UpdateError::ChecksumMismatch {
                expected: manifest.sha256.clone(),
                actual,
            });
        }

        let staging = workdir.path().join("staging");
        std::fs::create_dir_all(&staging)?;
        extract_zip(&archive_path, &staging)?;

        overlay_tree(&staging, &self.install_dir)?;
        tracing::info!(
            version = %manifest.version,
            install_dir = %self.install_dir.display(),
            "update applied"
        );

        let entrypoint = self
            .install_dir
            .join(manifest.entrypoint.as_deref().unwrap_or(DEFAULT_ENTRYPOINT));
        Ok(RelaunchPlan {
            entrypoint,
            args: relaunch_args.to_vec(),
        })
    }
}

/// Downloads a zip bundle and extracts it into `dest`, via a temp file that
/// is removed on every exit path. Used for provisioning tool bundles that
/// ship without a manifest (no digest to verify).
pub async fn fetch_and_extract(url: &str, dest: &Path) -> Result<(), UpdateError> {
    let http = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;

    let workdir = tempfile::tempdir()?;
    let archive_path = workdir.path().join("bundle.zip");
    download_to_file(&http, url, &archive_path, None).await?;

    std::fs::create_dir_all(dest)?;
    extract_zip(&archive_path, dest)
}

/// Copies the staged tree onto the installation directory.
///
/// Top-level staged directories replace existing destination directories
/// wholesale; files are overwritten in place. Destination entries the
/// archive does not mention are left alone.
pub fn overlay_tree(staged: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;

    for entry in std::fs::read_dir(staged)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            if target.is_dir() {
                std::fs::remove_dir_all(&target)?;
            }
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
