//! Over-the-air self-update.
//!
//! A small manifest advertises the latest release; the applier downloads the
//! archive, verifies its SHA-256 against the manifest, extracts it into a
//! staging directory and overlays the staged tree onto the installation
//! directory. File replacement only ever happens after full verification
//! succeeds. The caller finishes the update by executing the returned
//! [`RelaunchPlan`] and exiting.

mod apply;
mod archive;
mod download;
mod manifest;
mod verify;

pub use apply::{RelaunchPlan, UpdateApplier, fetch_and_extract, overlay_tree};
pub use archive::extract_zip;
pub use download::{DownloadProgress, ProgressFn, download_to_file};
pub use manifest::{DEFAULT_FETCH_TIMEOUT, Manifest, ManifestClient};
pub use verify::{digests_match, sha256_file};

/// Entrypoint used when the manifest does not name one.
pub const DEFAULT_ENTRYPOINT: &str = "logscribe";

/// Errors from the update pipeline.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("unsafe archive entry path: {0}")]
    UnsafeEntryPath(String),

    #[error("relaunch failed: {0}")]
    Relaunch(#[source] std::io::Error),
}
