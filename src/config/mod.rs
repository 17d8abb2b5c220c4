//! Configuration module for addonhost.
//!
//! Handles loading and parsing the `addons.rc` configuration file and
//! exposes it as a small key/value store for the lifecycle engine.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::addons::types::{parse_flag, split_list};
use crate::logging::LogConfig;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "addons.rc";

/// Default .addons.rc file content with all settings documented.
const DEFAULT_RC: &str = r#"# Addon Host Configuration File
# =============================
# This file is read every time the addon host starts.
# Lines starting with '#' are comments.
#
# Paths
# -----
# Root of the shared application tree that addon files are merged into.
# Relative paths below are resolved against it.
# root_path = .
# addons_path = addons
# backup_path = runtime/addons

# Overlay Directories
# -------------------
# Addon subdirectories mirrored 1:1 into the shared tree.
# overlay_dirs = app,public,view
# Static assets directory and the shared-tree prefix it lands under
# (assets/<file> -> <assets_dest>/<addon>/<file>).
# assets_dir = assets
# assets_dest = public/assets/addons

# Database
# --------
# Replaces __PREFIX__ in install.sql / update.sql.
# table_prefix =

# Policies
# --------
# pure_mode = false            # Keep addon directories self-contained
# backup_global_files = false  # Zip conflicting shared files before overwrite
# debug = false                # Rebuild the hook table on every dispatch
# autoload = true              # Bind hooks declared by addons automatically

# Package Server
# --------------
# package_url = https://example.com/addons/download

# Explicit Hooks
# --------------
# Format: hook.<event> = <addon>,<addon>
# hook.order_paid = invoice,mailer

# Logging
# -------
# One file per run in <root_path>/runtime/logs/, removed after the
# retention window. RUST_LOG overrides log_level.
#
# log_enabled = true
# log_level = info         # trace, debug, info, warn, error, off
# log_retention = 24       # hours
"#;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to config file.
    pub config_path: PathBuf,
    /// Root of the shared application tree.
    pub root_path: PathBuf,
    /// Directory holding one subdirectory per add-on.
    pub addons_path: PathBuf,
    /// Directory for backups and temporary packages.
    pub backup_path: PathBuf,
    /// Overlay directory names mirrored into the shared tree.
    pub overlay_dirs: Vec<String>,
    /// Static assets directory name inside an add-on.
    pub assets_dir: String,
    /// Shared-tree prefix the assets directory is mapped under.
    pub assets_dest: String,
    /// Table prefix substituted into SQL scripts.
    pub table_prefix: String,
    /// Keep add-on directories self-contained between enable/disable cycles.
    pub pure_mode: bool,
    /// Back up conflicting shared-tree files before enable/disable.
    pub backup_global_files: bool,
    /// Disables hook table caching.
    pub debug: bool,
    /// Binds hooks declared by add-ons without explicit configuration.
    pub autoload: bool,
    /// Package server endpoint.
    pub package_url: Option<String>,
    /// Explicit hook bindings in file order.
    pub hooks: Vec<(String, Vec<String>)>,
    /// Logging configuration.
    pub log_config: LogConfig,
    /// Raw settings in file order, for key lookups.
    values: Vec<(String, String)>,
    /// Path settings as written, resolved after parsing.
    raw_addons_path: Option<String>,
    raw_backup_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_root(Path::new("."))
    }
}

impl Config {
    /// Creates a default configuration for a shared tree root.
    #[must_use]
    pub fn for_root(root: &Path) -> Self {
        let mut config = Self {
            config_path: root.join(CONFIG_FILE_NAME),
            root_path: root.to_path_buf(),
            addons_path: PathBuf::new(),
            backup_path: PathBuf::new(),
            overlay_dirs: vec!["app".to_string(), "public".to_string(), "view".to_string()],
            assets_dir: "assets".to_string(),
            assets_dest: "public/assets/addons".to_string(),
            table_prefix: String::new(),
            pure_mode: false,
            backup_global_files: false,
            debug: false,
            autoload: true,
            package_url: None,
            hooks: Vec::new(),
            log_config: LogConfig::default(),
            values: Vec::new(),
            raw_addons_path: None,
            raw_backup_path: None,
        };
        config.resolve_paths();
        config
    }

    /// Returns the default config file path.
    ///
    /// Prefers `addons.rc` in the working directory, then `~/.addonsrc`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return local;
        }
        dirs::home_dir()
            .map(|h| h.join(".addonsrc"))
            .unwrap_or(local)
    }

    /// Loads configuration from the default path, creating it if it doesn't exist.
    ///
    /// # Errors
    /// Returns error if config cannot be read.
    pub fn load() -> io::Result<Self> {
        let path = Self::default_config_path();
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    ///
    /// # Errors
    /// Returns error if config cannot be read.
    pub fn load_from(path: &Path) -> io::Result<Self> {
        // Create default config if it doesn't exist
        if !path.exists() {
            Self::create_default_config(path)?;
        }

        let content = fs::read_to_string(path)?;
        Ok(Self::from_content(path, &content))
    }

    /// Parses configuration content as if it were read from `path`.
    #[must_use]
    pub fn from_content(path: &Path, content: &str) -> Self {
        let mut config = Self {
            config_path: path.to_path_buf(),
            ..Self::default()
        };
        config.parse(content);
        config.resolve_paths();
        config
    }

    /// Creates the default config file.
    fn create_default_config(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_RC.as_bytes())?;
        Ok(())
    }

    /// Parses the config file content.
    fn parse(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Parse key = value
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                // Remove inline comments
                let value = value.split(" #").next().unwrap_or(value).trim();

                self.apply_setting(key, value);
            }
        }
    }

    /// Applies a single setting.
    fn apply_setting(&mut self, key: &str, value: &str) {
        self.values.retain(|(k, _)| k != key);
        self.values.push((key.to_string(), value.to_string()));

        match key {
            "root_path" => {
                if !value.is_empty() {
                    self.root_path = PathBuf::from(value);
                }
            }
            "addons_path" => self.raw_addons_path = Some(value.to_string()),
            "backup_path" => self.raw_backup_path = Some(value.to_string()),
            "overlay_dirs" => self.overlay_dirs = split_list(value),
            "assets_dir" => {
                if !value.is_empty() {
                    self.assets_dir = value.to_string();
                }
            }
            "assets_dest" => {
                let dest = value.trim_matches('/');
                if !dest.is_empty() {
                    self.assets_dest = dest.to_string();
                }
            }
            "table_prefix" => self.table_prefix = value.to_string(),
            "pure_mode" => self.pure_mode = parse_flag(value),
            "backup_global_files" => self.backup_global_files = parse_flag(value),
            "debug" => self.debug = parse_flag(value),
            "autoload" => self.autoload = parse_flag(value),
            "package_url" => {
                self.package_url = (!value.is_empty()).then(|| value.to_string());
            }
            "log_level" => {
                self.log_config.level = LogConfig::parse_level(value);
            }
            "log_retention" | "log_retention_hours" => {
                self.log_config.retention_hours = LogConfig::parse_retention(value);
            }
            "log_enabled" | "logging" => {
                self.log_config.enabled = parse_flag(value);
            }
            _ => {
                // hook.<event> = <addon>,<addon>
                if let Some(event) = key.strip_prefix("hook.") {
                    let event = event.trim();
                    if event.is_empty() {
                        return;
                    }
                    let addons = split_list(value);
                    if let Some(entry) = self.hooks.iter_mut().find(|(e, _)| e == event) {
                        entry.1 = addons;
                    } else {
                        self.hooks.push((event.to_string(), addons));
                    }
                }
            }
        }
    }

    /// Resolves path settings against the root path.
    fn resolve_paths(&mut self) {
        let resolve = |root: &Path, raw: Option<&str>, default: &str| {
            let value = raw.filter(|v| !v.is_empty()).unwrap_or(default);
            let path = PathBuf::from(value);
            if path.is_absolute() {
                path
            } else {
                root.join(path)
            }
        };

        self.addons_path = resolve(&self.root_path, self.raw_addons_path.as_deref(), "addons");
        self.backup_path = resolve(
            &self.root_path,
            self.raw_backup_path.as_deref(),
            "runtime/addons",
        );
        self.log_config.directory = self.root_path.join("runtime").join("logs");
    }

    /// Returns a raw setting value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a raw setting value or a default.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Changes a setting in memory and in the config file.
    ///
    /// # Errors
    /// Returns error if the config file cannot be written.
    pub fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        assert!(!key.is_empty(), "Setting key cannot be empty");

        save_setting(&self.config_path, key, value)?;
        self.apply_setting(key, value);
        self.resolve_paths();
        Ok(())
    }

    /// Reloads the configuration from disk.
    ///
    /// # Errors
    /// Returns error if config cannot be read.
    pub fn reload(&mut self) -> io::Result<()> {
        let path = self.config_path.clone();
        *self = Self::load_from(&path)?;
        Ok(())
    }
}

/// Saves a single setting to a config file, replacing an existing line.
///
/// # Errors
/// Returns error if file cannot be written.
pub fn save_setting(path: &Path, key: &str, value: &str) -> io::Result<()> {
    let content = if path.exists() {
        fs::read_to_string(path)?
    } else {
        String::new()
    };

    let mut new_content = update_or_append_setting(&content, key, value);
    new_content.push('\n');
    fs::write(path, new_content)
}

/// Updates an existing setting or appends a new one.
fn update_or_append_setting(content: &str, key: &str, value: &str) -> String {
    let mut lines: Vec<String> = content.lines().map(String::from).collect();
    let setting_line = format!("{} = {}", key, value);

    let existing = lines.iter().position(|line| {
        let trimmed = line.trim();
        !trimmed.starts_with('#')
            && trimmed
                .split_once('=')
                .is_some_and(|(existing_key, _)| existing_key.trim() == key)
    });

    match existing {
        Some(idx) => lines[idx] = setting_line,
        None => lines.push(setting_line),
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::for_root(Path::new("/srv/app"));
        assert_eq!(config.addons_path, PathBuf::from("/srv/app/addons"));
        assert_eq!(config.backup_path, PathBuf::from("/srv/app/runtime/addons"));
        assert_eq!(config.overlay_dirs, vec!["app", "public", "view"]);
        assert_eq!(config.assets_dest, "public/assets/addons");
        assert!(config.autoload);
        assert!(!config.pure_mode);
    }

    #[test]
    fn test_parse_settings() {
        let content = "\
root_path = /srv/app
addons_path = /opt/addons
overlay_dirs = app, view
table_prefix = app_   # prefix
pure_mode = yes
debug = on
hook.order_paid = invoice, mailer
hook.AddonsInit = bootstrap
log_level = DEBUG
";
        let config = Config::from_content(Path::new("/tmp/addons.rc"), content);
        assert_eq!(config.root_path, PathBuf::from("/srv/app"));
        assert_eq!(config.addons_path, PathBuf::from("/opt/addons"));
        assert_eq!(config.backup_path, PathBuf::from("/srv/app/runtime/addons"));
        assert_eq!(config.overlay_dirs, vec!["app", "view"]);
        assert_eq!(config.table_prefix, "app_");
        assert!(config.pure_mode);
        assert!(config.debug);
        assert_eq!(config.hooks.len(), 2);
        assert_eq!(config.hooks[0].0, "order_paid");
        assert_eq!(config.hooks[0].1, vec!["invoice", "mailer"]);
        assert_eq!(
            config.log_config.level,
            tracing::level_filters::LevelFilter::DEBUG
        );
        assert_eq!(config.get("table_prefix"), Some("app_"));
        assert_eq!(config.get_or("missing", "x"), "x");
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("addons.rc");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.overlay_dirs, vec!["app", "public", "view"]);
    }

    #[test]
    fn test_set_rewrites_existing_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("addons.rc");
        fs::write(&path, "# comment\npure_mode = false\n").unwrap();

        let mut config = Config::load_from(&path).unwrap();
        config.set("pure_mode", "true").unwrap();
        config.set("table_prefix", "cms_").unwrap();
        assert!(config.pure_mode);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "# comment\npure_mode = true\ntable_prefix = cms_\n");

        config.reload().unwrap();
        assert!(config.pure_mode);
        assert_eq!(config.table_prefix, "cms_");
    }

    #[test]
    fn test_update_or_append_skips_comments() {
        let content = "# pure_mode = false\nmode = x";
        let updated = update_or_append_setting(content, "pure_mode", "true");
        assert_eq!(updated, "# pure_mode = false\nmode = x\npure_mode = true");
    }
}
