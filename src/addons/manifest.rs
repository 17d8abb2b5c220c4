//! Add-on file manifest.
//!
//! The manifest records every shared-tree path an add-on copied in on its
//! last enable. It is the only authority consulted when the add-on is
//! disabled again.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::AddonError;
use super::store::MANIFEST_FILE;

/// Files contributed by one add-on to the shared tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonManifest {
    /// Shared-tree relative paths, `/`-separated, in copy order.
    #[serde(default)]
    pub files: Vec<String>,
    /// Free-form data kept alongside the file list.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AddonManifest {
    /// Creates a manifest from a file list.
    #[must_use]
    pub fn with_files(files: Vec<String>) -> Self {
        Self {
            files,
            metadata: BTreeMap::new(),
        }
    }

    /// Returns true if no files are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns true if the manifest claims a shared-tree path.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f == path)
    }

    /// Drops the given paths from the file list. Returns how many were removed.
    pub fn release(&mut self, paths: &[String]) -> usize {
        let before = self.files.len();
        self.files.retain(|f| !paths.contains(f));
        before - self.files.len()
    }
}

/// Returns true if the add-on directory carries a manifest.
#[must_use]
pub fn has_manifest(addon_dir: &Path) -> bool {
    addon_dir.join(MANIFEST_FILE).is_file()
}

/// Loads the manifest of an add-on directory.
///
/// A missing or empty file yields an empty manifest.
pub fn load(addon_dir: &Path) -> Result<AddonManifest, AddonError> {
    let path = addon_dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(AddonManifest::default());
    }

    let content = fs::read_to_string(&path)?;
    if content.trim().is_empty() {
        return Ok(AddonManifest::default());
    }

    serde_json::from_str(&content).map_err(|e| {
        AddonError::validation(
            &dir_name(addon_dir),
            format!("unreadable manifest {}: {}", path.display(), e),
        )
    })
}

/// Writes the manifest of an add-on directory.
pub fn save(addon_dir: &Path, manifest: &AddonManifest) -> Result<(), AddonError> {
    let content = serde_json::to_string_pretty(manifest).map_err(|e| {
        AddonError::validation(&dir_name(addon_dir), format!("cannot encode manifest: {}", e))
    })?;
    fs::write(addon_dir.join(MANIFEST_FILE), content)?;
    Ok(())
}

/// Deletes the manifest of an add-on directory if present.
pub fn delete(addon_dir: &Path) -> Result<(), AddonError> {
    let path = addon_dir.join(MANIFEST_FILE);
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

fn dir_name(addon_dir: &Path) -> String {
    addon_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
