//! Package store.
//!
//! Single source of truth for where things live on disk: the add-on root,
//! each add-on directory, the backup directory, and the overlay directory
//! convention that maps add-on files into the shared application tree.

use std::fs;
use std::path::{Component, Path, PathBuf};

use super::error::AddonError;
use super::info;
use crate::config::Config;

/// Manifest file name inside an add-on directory.
pub const MANIFEST_FILE: &str = ".addonrc";

/// Declarative settings file name inside an add-on directory.
pub const SETTINGS_FILE: &str = "config.toml";

/// Shared-tree directory holding hook snippet files.
pub const HOOK_SNIPPET_DIR: &str = "app/common/hook";

/// How an overlay directory maps into the shared tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    /// `<dir>/<file>` lands at `<dir>/<file>` in the shared tree.
    Mirror,
    /// `<assets>/<file>` lands at `<assets_dest>/<addon>/<file>`.
    Assets,
}

/// An overlay directory of one add-on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySource {
    /// Directory name inside the add-on.
    pub dir_name: String,
    /// Absolute path of the directory inside the add-on.
    pub path: PathBuf,
    /// Mapping rule.
    pub kind: OverlayKind,
}

/// Filesystem layout of add-ons and the shared tree.
#[derive(Debug, Clone)]
pub struct PackageStore {
    root: PathBuf,
    addons_path: PathBuf,
    backup_path: PathBuf,
    overlay_dirs: Vec<String>,
    assets_dir: String,
    assets_dest: String,
}

impl PackageStore {
    /// Creates a store from the host configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.root_path.clone(),
            addons_path: config.addons_path.clone(),
            backup_path: config.backup_path.clone(),
            overlay_dirs: config.overlay_dirs.clone(),
            assets_dir: config.assets_dir.clone(),
            assets_dest: config.assets_dest.trim_matches('/').to_string(),
        }
    }

    /// Root of the shared application tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all add-on directories.
    #[must_use]
    pub fn addons_root(&self) -> &Path {
        &self.addons_path
    }

    /// Directory of one add-on. Does not require it to exist.
    #[must_use]
    pub fn addon_dir(&self, name: &str) -> PathBuf {
        self.addons_path.join(name)
    }

    /// Returns true if the add-on directory exists.
    #[must_use]
    pub fn addon_exists(&self, name: &str) -> bool {
        self.addon_dir(name).is_dir()
    }

    /// Backup directory (may not exist yet).
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_path
    }

    /// Creates the backup directory if absent.
    pub fn ensure_backup_dir(&self) -> Result<PathBuf, AddonError> {
        fs::create_dir_all(&self.backup_path)?;
        Ok(self.backup_path.clone())
    }

    /// Creates the add-on root if absent.
    pub fn ensure_addons_root(&self) -> Result<PathBuf, AddonError> {
        fs::create_dir_all(&self.addons_path)?;
        Ok(self.addons_path.clone())
    }

    /// Overlay directory names mirrored 1:1 into the shared tree.
    #[must_use]
    pub fn overlay_directories(&self) -> &[String] {
        &self.overlay_dirs
    }

    /// Name of the static assets directory inside an add-on.
    #[must_use]
    pub fn assets_dir(&self) -> &str {
        &self.assets_dir
    }

    /// Shared-tree prefix an add-on's assets are mapped under.
    #[must_use]
    pub fn assets_prefix(&self, name: &str) -> String {
        format!("{}/{}", self.assets_dest, name)
    }

    /// All overlay directories of an add-on, mirror directories first.
    ///
    /// Directories are listed whether or not they exist.
    #[must_use]
    pub fn overlay_sources(&self, name: &str) -> Vec<OverlaySource> {
        let addon_dir = self.addon_dir(name);
        let mut sources: Vec<OverlaySource> = self
            .overlay_dirs
            .iter()
            .map(|dir| OverlaySource {
                dir_name: dir.clone(),
                path: addon_dir.join(dir),
                kind: OverlayKind::Mirror,
            })
            .collect();

        if !self.assets_dir.is_empty() && !self.overlay_dirs.contains(&self.assets_dir) {
            sources.push(OverlaySource {
                dir_name: self.assets_dir.clone(),
                path: addon_dir.join(&self.assets_dir),
                kind: OverlayKind::Assets,
            });
        }

        sources
    }

    /// Shared-tree relative path for a file inside an overlay directory.
    ///
    /// `relative` is the file path relative to the overlay directory itself.
    #[must_use]
    pub fn destination_for(&self, name: &str, source: &OverlaySource, relative: &Path) -> String {
        let rest = to_slash(relative);
        match source.kind {
            OverlayKind::Mirror => format!("{}/{}", source.dir_name, rest),
            OverlayKind::Assets => format!("{}/{}", self.assets_prefix(name), rest),
        }
    }

    /// Inverse of [`destination_for`](Self::destination_for): where a shared
    /// file lives inside the add-on directory.
    #[must_use]
    pub fn source_for(&self, name: &str, shared: &str) -> Option<PathBuf> {
        let shared = normalize_relative(shared)?;
        let addon_dir = self.addon_dir(name);

        let assets_prefix = format!("{}/", self.assets_prefix(name));
        if let Some(rest) = shared.strip_prefix(&assets_prefix) {
            return Some(join_slash(&addon_dir.join(&self.assets_dir), rest));
        }

        let first = shared.split('/').next()?;
        if self.overlay_dirs.iter().any(|d| d == first) {
            return Some(join_slash(&addon_dir, &shared));
        }

        None
    }

    /// Absolute path of a shared-tree relative path.
    #[must_use]
    pub fn shared_path(&self, relative: &str) -> PathBuf {
        join_slash(&self.root, relative)
    }

    /// Manifest file of an add-on.
    #[must_use]
    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.addon_dir(name).join(MANIFEST_FILE)
    }

    /// Settings file of an add-on.
    #[must_use]
    pub fn settings_path(&self, name: &str) -> PathBuf {
        self.addon_dir(name).join(SETTINGS_FILE)
    }

    /// Shared hook file named `file`, or `None` if the name leaves the tree.
    #[must_use]
    pub fn hook_file_path(&self, file: &str) -> Option<PathBuf> {
        let relative = normalize_relative(&format!("{}/{}.php", HOOK_SNIPPET_DIR, file))?;
        relative
            .starts_with(HOOK_SNIPPET_DIR)
            .then(|| self.shared_path(&relative))
    }

    /// SQL script shipped with an add-on.
    #[must_use]
    pub fn sql_path(&self, name: &str, file: &str) -> PathBuf {
        self.addon_dir(name).join(file)
    }

    /// Names of all add-on directories that carry a metadata file, sorted.
    pub fn list_addon_names(&self) -> Result<Vec<String>, AddonError> {
        if !self.addons_path.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.addons_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_name(&name).is_ok() && info::has_info(&entry.path()) {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Rejects add-on names that could escape the add-on root.
pub fn validate_name(name: &str) -> Result<(), AddonError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(AddonError::validation(
            name,
            "names may only contain letters, digits, '_' and '-'",
        ))
    }
}

/// Renders a relative path with `/` separators.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalizes a stored relative path, rejecting anything that climbs out.
#[must_use]
pub fn normalize_relative(path: &str) -> Option<String> {
    let parts: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();

    if parts.is_empty() || parts.contains(&"..") {
        return None;
    }
    Some(parts.join("/"))
}

/// Joins a `/`-separated relative path onto a base directory.
fn join_slash(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|p| !p.is_empty())
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}
