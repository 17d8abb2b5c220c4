//! Conflict scanner.
//!
//! Walks an add-on's overlay directories and compares every file with the
//! shared-tree file it would replace. Two files are the same when their
//! sizes match and their SHA-256 digests match.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use super::error::AddonError;
use super::store::PackageStore;

/// An overlay file and where it lands in the shared tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayFile {
    /// Absolute path inside the add-on directory.
    pub source: PathBuf,
    /// Shared-tree relative path, `/`-separated.
    pub destination: String,
}

/// Read-only comparison of add-on overlays against the shared tree.
pub struct ConflictScanner<'a> {
    store: &'a PackageStore,
}

impl<'a> ConflictScanner<'a> {
    /// Creates a scanner over a package store.
    #[must_use]
    pub fn new(store: &'a PackageStore) -> Self {
        Self { store }
    }

    /// Lists every regular file under the add-on's overlay directories.
    ///
    /// Symlinks and directories are skipped. Order is deterministic: overlay
    /// directories in configured order, files sorted by name within each.
    pub fn overlay_files(&self, name: &str) -> Result<Vec<OverlayFile>, AddonError> {
        let mut files = Vec::new();
        let mut seen = HashSet::new();

        for source in self.store.overlay_sources(name) {
            if !source.path.is_dir() {
                continue;
            }

            for entry in WalkDir::new(&source.path)
                .follow_links(false)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| AddonError::Io(io::Error::other(e)))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&source.path) else {
                    continue;
                };

                let destination = self.store.destination_for(name, &source, relative);
                if seen.insert(destination.clone()) {
                    files.push(OverlayFile {
                        source: entry.path().to_path_buf(),
                        destination,
                    });
                }
            }
        }

        Ok(files)
    }

    /// Returns shared-tree paths the add-on contributes.
    ///
    /// With `only_conflicts`, keeps only paths whose shared-tree file exists
    /// and differs from the add-on's copy.
    pub fn scan(&self, name: &str, only_conflicts: bool) -> Result<Vec<String>, AddonError> {
        let files = self.overlay_files(name)?;
        if !only_conflicts {
            return Ok(files.into_iter().map(|f| f.destination).collect());
        }

        let mut conflicts = Vec::new();
        for file in files {
            let target = self.store.shared_path(&file.destination);
            if is_conflict(&file.source, &target)? {
                debug!("[ADDON-SCAN] {} conflicts at {}", name, file.destination);
                conflicts.push(file.destination);
            }
        }
        Ok(conflicts)
    }

    /// Fails with [`AddonError::Conflict`] if any overlay file differs from
    /// an existing shared-tree file.
    pub fn check_no_conflicts(&self, name: &str) -> Result<(), AddonError> {
        let paths = self.scan(name, true)?;
        if paths.is_empty() {
            Ok(())
        } else {
            Err(AddonError::Conflict { paths })
        }
    }
}

/// True if `target` exists and is not identical to `source`.
fn is_conflict(source: &Path, target: &Path) -> Result<bool, AddonError> {
    if !target.exists() {
        return Ok(false);
    }
    if !target.is_file() {
        return Ok(true);
    }
    Ok(files_differ(source, target)?)
}

/// Compares two files by size, then by SHA-256 digest.
pub fn files_differ(a: &Path, b: &Path) -> io::Result<bool> {
    if a.metadata()?.len() != b.metadata()?.len() {
        return Ok(true);
    }
    Ok(file_digest(a)? != file_digest(b)?)
}

/// Hex SHA-256 digest of a file, streamed.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
