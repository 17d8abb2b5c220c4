//! Add-on type definitions.
//!
//! Core data structures shared by the lifecycle controller, the store and
//! the hook registrar.

use serde::Serialize;

/// Metadata keys every add-on package must provide.
pub const REQUIRED_INFO_KEYS: [&str; 6] = ["name", "title", "intro", "author", "version", "status"];

/// Lifecycle state of an add-on, derived from what is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonState {
    /// No add-on directory.
    Uninstalled,
    /// Installed but never enabled (no manifest yet).
    InstalledDisabled,
    /// Files merged into the shared tree and hooks bound.
    Enabled,
    /// Enabled before, now switched off.
    Disabled,
}

impl AddonState {
    /// Derives the state from the persisted status flag and manifest presence.
    #[must_use]
    pub fn derive(installed: bool, enabled: bool, has_manifest: bool) -> Self {
        match (installed, enabled, has_manifest) {
            (false, _, _) => Self::Uninstalled,
            (true, true, _) => Self::Enabled,
            (true, false, true) => Self::Disabled,
            (true, false, false) => Self::InstalledDisabled,
        }
    }

    /// Returns true if the add-on directory exists.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        !matches!(self, Self::Uninstalled)
    }

    /// Returns a display string for this state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninstalled => "uninstalled",
            Self::InstalledDisabled => "installed",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for AddonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Add-on metadata as stored in `info.ini`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddonInfo {
    /// Unique identifier (matches the directory name).
    pub name: String,
    /// Human-readable title.
    pub title: String,
    /// Short description.
    pub intro: String,
    /// Author name.
    pub author: String,
    /// Version string.
    pub version: String,
    /// Whether the add-on is enabled.
    pub enabled: bool,
    /// Whether the add-on owns menu entries.
    pub has_menu: bool,
    /// Key the menu flag was read from, written back unchanged.
    #[serde(skip)]
    pub menu_key: Option<String>,
    /// Add-ons that must be enabled before this one can be installed.
    pub pre_requisites: Vec<String>,
    /// Whether the package ships `testdata.sql`. Reported by install, never stored.
    pub has_testdata: bool,
    /// Any other top-level keys, kept in file order.
    pub extra: Vec<(String, String)>,
    /// `[section]` tables, kept in file order.
    pub sections: Vec<(String, Vec<(String, String)>)>,
}

impl AddonInfo {
    /// Creates minimal metadata for an add-on.
    #[must_use]
    pub fn new(name: &str, title: &str, version: &str) -> Self {
        assert!(!name.is_empty(), "Add-on name must not be empty");

        Self {
            name: name.to_string(),
            title: title.to_string(),
            version: version.to_string(),
            ..Self::default()
        }
    }

    /// Looks up an extra top-level key.
    #[must_use]
    pub fn extra_value(&self, key: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an extra top-level key, replacing an existing value.
    pub fn set_extra(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.extra.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            self.extra.push((key.to_string(), value.to_string()));
        }
    }
}

/// Parses a boolean flag the way metadata and config files write them.
#[must_use]
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Splits a comma-separated list, trimming and dropping empty items.
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
