//! Release archive extraction.

use std::path::Path;

use zip::ZipArchive;

use crate::UpdateError;

/// Extracts a zip archive into `dest`.
///
/// Entry names are resolved with [`ZipArchive`]'s enclosed-name check;
/// absolute paths and parent-directory traversal abort the extraction.
/// Unix permissions recorded in the archive are preserved, so delivered
/// executables stay executable.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), UpdateError> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(UpdateError::UnsafeEntryPath(entry.name().to_string()));
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))?;
        }
    }

    tracing::debug!(
        archive = %archive_path.display(),
        dest = %dest.display(),
        "archive extracted"
    );
    Ok(())
}
