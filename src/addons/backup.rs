//! Timestamped backup archives.
//!
//! Backups are write-once zips in the backup directory and are never pruned
//! here.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::archive::ArchiveCodec;
use super::error::AddonError;

/// Builds a backup file name: `<name>-<kind>-<YYYYmmddHHMMSS>.zip`.
#[must_use]
pub fn backup_file_name(name: &str, kind: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    format!("{}-{}-{}.zip", name, kind, stamp)
}

/// Returns a path in `backup_dir` that does not exist yet.
fn unique_path(backup_dir: &Path, name: &str, kind: &str) -> PathBuf {
    let base = backup_file_name(name, kind);
    let mut path = backup_dir.join(&base);
    let mut n = 1;
    while path.exists() {
        let stem = base.trim_end_matches(".zip");
        path = backup_dir.join(format!("{}-{}.zip", stem, n));
        n += 1;
    }
    path
}

/// Zips a whole add-on directory.
pub fn backup_addon_dir(
    codec: &dyn ArchiveCodec,
    backup_dir: &Path,
    name: &str,
    addon_dir: &Path,
) -> Result<PathBuf, AddonError> {
    fs::create_dir_all(backup_dir)?;
    let bytes = codec.create(addon_dir)?;
    let path = unique_path(backup_dir, name, "backup");
    fs::write(&path, bytes)?;
    info!("[ADDON-BACKUP] Backed up {} to {}", name, path.display());
    Ok(path)
}

/// Zips the shared-tree files an enable or disable is about to touch.
///
/// Returns `None` when there is nothing to back up.
pub fn backup_conflicts(
    codec: &dyn ArchiveCodec,
    backup_dir: &Path,
    name: &str,
    kind: &str,
    root: &Path,
    paths: &[String],
) -> Result<Option<PathBuf>, AddonError> {
    if paths.is_empty() {
        return Ok(None);
    }

    fs::create_dir_all(backup_dir)?;
    let bytes = codec.create_from_files(root, paths)?;
    let path = unique_path(backup_dir, name, kind);
    fs::write(&path, bytes)?;
    info!(
        "[ADDON-BACKUP] Backed up {} shared file(s) of {} to {}",
        paths.len(),
        name,
        path.display()
    );
    Ok(Some(path))
}
