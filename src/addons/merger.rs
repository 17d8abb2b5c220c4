//! Overlay merger.
//!
//! Copies add-on overlay files into the shared tree and removes them again
//! from a manifest, pruning directories that end up empty.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use super::error::AddonError;
use super::manifest::AddonManifest;
use super::scanner::ConflictScanner;
use super::store::{PackageStore, normalize_relative};

/// Outcome of removing an add-on's files from the shared tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmergeReport {
    /// Paths that were deleted.
    pub removed: Vec<String>,
    /// Paths that were already gone.
    pub missing: Vec<String>,
    /// Number of empty directories removed.
    pub pruned_dirs: usize,
}

/// Moves overlay files between add-on directories and the shared tree.
pub struct OverlayMerger<'a> {
    store: &'a PackageStore,
}

impl<'a> OverlayMerger<'a> {
    /// Creates a merger over a package store.
    #[must_use]
    pub fn new(store: &'a PackageStore) -> Self {
        Self { store }
    }

    /// Copies every overlay file into the shared tree, overwriting.
    ///
    /// Returns a manifest of the copied paths in copy order.
    pub fn merge(&self, name: &str) -> Result<AddonManifest, AddonError> {
        let files = ConflictScanner::new(self.store).overlay_files(name)?;
        let mut copied = Vec::with_capacity(files.len());

        for file in files {
            let target = self.store.shared_path(&file.destination);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&file.source, &target)?;
            debug!("[ADDON-MERGE] {} -> {}", name, file.destination);
            copied.push(file.destination);
        }

        Ok(AddonManifest::with_files(copied))
    }

    /// Deletes every manifest path from the shared tree.
    ///
    /// Missing files are tolerated. Parent directories left empty are pruned
    /// up to, but never including, the shared-tree root.
    pub fn unmerge(&self, manifest: &AddonManifest) -> Result<UnmergeReport, AddonError> {
        let root = self.store.root();
        let mut report = UnmergeReport::default();

        for path in &manifest.files {
            let Some(relative) = normalize_relative(path) else {
                warn!("[ADDON-MERGE] Skipping unsafe manifest path: {}", path);
                continue;
            };
            let target = self.store.shared_path(&relative);

            match fs::symlink_metadata(&target) {
                Ok(meta) if meta.is_dir() => {
                    warn!("[ADDON-MERGE] Not removing directory {}", relative);
                    continue;
                }
                Ok(_) => match fs::remove_file(&target) {
                    Ok(()) => report.removed.push(relative),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => report.missing.push(relative),
                    Err(e) => return Err(e.into()),
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    report.missing.push(relative);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            if let Some(parent) = target.parent() {
                report.pruned_dirs += prune_empty_dirs(root, parent);
            }
        }

        Ok(report)
    }

    /// Copies shared-tree files listed in the manifest back into the add-on.
    ///
    /// Returns the number of files restored.
    pub fn restore_to_addon(&self, name: &str, manifest: &AddonManifest) -> Result<usize, AddonError> {
        let mut restored = 0;
        for path in &manifest.files {
            let Some(destination) = self.store.source_for(name, path) else {
                continue;
            };
            let shared = self.store.shared_path(path);
            if !shared.is_file() {
                continue;
            }
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&shared, &destination)?;
            restored += 1;
        }
        debug!("[ADDON-MERGE] Restored {} file(s) into {}", restored, name);
        Ok(restored)
    }

    /// Removes the overlay directories inside the add-on directory.
    pub fn remove_overlay_dirs(&self, name: &str) -> Result<(), AddonError> {
        for source in self.store.overlay_sources(name) {
            if source.path.is_dir() {
                fs::remove_dir_all(&source.path)?;
            }
        }
        Ok(())
    }

    /// Returns true if any overlay directory of the add-on holds files.
    pub fn has_overlay_copies(&self, name: &str) -> Result<bool, AddonError> {
        Ok(!ConflictScanner::new(self.store).overlay_files(name)?.is_empty())
    }
}

/// Removes `start` and its ancestors while they are empty, stopping at `root`.
///
/// Returns the number of directories removed. Removal errors end the walk.
pub fn prune_empty_dirs(root: &Path, start: &Path) -> usize {
    let mut removed = 0;
    let mut current = Some(start);

    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        let is_empty = fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
        if !is_empty || fs::remove_dir(dir).is_err() {
            break;
        }
        removed += 1;
        current = dir.parent();
    }

    removed
}
