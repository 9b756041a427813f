//! iOS tool provisioning.
//!
//! The libimobiledevice tools are not assumed to be on PATH. When a bundle
//! URL is configured and the tools are missing, the bundle is downloaded and
//! extracted once into the tools directory; afterwards the extracted
//! binaries are used directly.

use std::path::{Path, PathBuf};

/// Resolved iOS tool paths.
#[derive(Debug, Clone)]
pub struct IosTools {
    pub idevice_id: PathBuf,
    pub idevicesyslog: PathBuf,
}

/// Ensures the iOS tools exist, downloading the bundle if configured.
///
/// Resolution order: tools already on PATH (empty `bundle_url` means they
/// must be), then the tools directory, then a one-time bundle download.
/// Returns `Err` when the tools cannot be provisioned; the caller treats
/// that as a fatal startup failure.
pub async fn ensure_ios_tools(dir: &Path, bundle_url: &str) -> anyhow::Result<IosTools> {
    if bundle_url.is_empty() {
        // No bundle configured: rely on PATH and let the preflight probe
        // decide whether that is fatal.
        return Ok(IosTools {
            idevice_id: PathBuf::from(exe_name("idevice_id")),
            idevicesyslog: PathBuf::from(exe_name("idevicesyslog")),
        });
    }

    if let Some(tools) = locate(dir) {
        tracing::debug!(dir = %dir.display(), "iOS tools already provisioned");
        return Ok(tools);
    }

    tracing::info!(url = bundle_url, dir = %dir.display(), "downloading iOS tools bundle");
    logscribe_update::fetch_and_extract(bundle_url, dir).await?;

    locate(dir).ok_or_else(|| {
        anyhow::anyhow!(
            "iOS tools bundle did not contain {} (looked under {})",
            exe_name("idevice_id"),
            dir.display()
        )
    })
}

fn locate(dir: &Path) -> Option<IosTools> {
    let idevice_id = find_tool(dir, &exe_name("idevice_id"))?;
    let idevicesyslog = find_tool(dir, &exe_name("idevicesyslog"))?;
    Some(IosTools {
        idevice_id,
        idevicesyslog,
    })
}

/// Recursively searches `dir` for a file named `name`. Bundles nest their
/// binaries in versioned subdirectories.
fn find_tool(dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path.file_name().is_some_and(|n| n == name) {
            return Some(path);
        }
    }
    subdirs.into_iter().find_map(|d| find_tool(&d, name))
}

fn exe_name(base: &str) -> String {
    if cfg!(windows) {
        format!("{base}.exe")
    } else {
        base.to_string()
    }
}
