//! File logging for addonhost.
//!
//! Every run writes one timestamped file under `<root_path>/runtime/logs/`.
//! Files from earlier runs are deleted once they are older than the
//! retention window. `RUST_LOG` overrides the configured level.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Hours a log file is kept.
pub const DEFAULT_RETENTION_HOURS: u32 = 24;

/// Prefix of every log file this crate writes.
const LOG_FILE_PREFIX: &str = "addonhost-";

/// Logging settings taken from the host config.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Age in hours after which old log files are removed.
    pub retention_hours: u32,
    /// Maximum level written.
    pub level: LevelFilter,
    /// File logging switch.
    pub enabled: bool,
    /// Where log files go.
    pub directory: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            retention_hours: DEFAULT_RETENTION_HOURS,
            level: LevelFilter::INFO,
            enabled: true,
            directory: PathBuf::from("runtime").join("logs"),
        }
    }
}

impl LogConfig {
    /// Parses a level name. Unknown names fall back to `info`.
    #[must_use]
    pub fn parse_level(value: &str) -> LevelFilter {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            "off" | "none" | "disabled" => LevelFilter::OFF,
            _ => LevelFilter::INFO,
        }
    }

    /// Parses a retention period in hours.
    #[must_use]
    pub fn parse_retention(value: &str) -> u32 {
        value.trim().parse().unwrap_or(DEFAULT_RETENTION_HOURS)
    }

    /// Returns true if nothing would be written.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        !self.enabled || self.level == LevelFilter::OFF
    }
}

/// Name of the log file for a run started at `started`.
#[must_use]
pub fn log_file_name(started: chrono::DateTime<chrono::Local>) -> String {
    format!("{}{}.log", LOG_FILE_PREFIX, started.format("%Y%m%d-%H%M%S"))
}

/// Deletes this crate's log files older than `retention_hours`.
///
/// Other files in the directory are left alone. Returns the removed paths.
pub fn cleanup_old_logs(dir: &Path, retention_hours: u32) -> io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !dir.is_dir() {
        return Ok(removed);
    }

    let max_age = Duration::from_secs(u64::from(retention_hours) * 3600);
    let now = SystemTime::now();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX) && n.ends_with(".log"));
        if !is_ours {
            continue;
        }

        let expired = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > max_age);
        if expired && fs::remove_file(&path).is_ok() {
            removed.push(path);
        }
    }

    Ok(removed)
}

/// Installs the global subscriber writing to a fresh log file.
///
/// Returns the log file path, or `None` when logging is switched off.
pub fn init(config: &LogConfig) -> io::Result<Option<PathBuf>> {
    if config.is_disabled() {
        return Ok(None);
    }

    fs::create_dir_all(&config.directory)?;
    let removed = cleanup_old_logs(&config.directory, config.retention_hours)?;

    let log_path = config.directory.join(log_file_name(chrono::Local::now()));
    let log_file = File::create(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(config.level.into()));

    let file_layer = fmt::layer()
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    tracing::info!(
        "[ADDON] addonhost v{} logging to {} (level {})",
        env!("CARGO_PKG_VERSION"),
        log_path.display(),
        config.level
    );
    if !removed.is_empty() {
        tracing::debug!("[ADDON] Removed {} expired log file(s)", removed.len());
    }

    Ok(Some(log_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_parse_level() {
        assert_eq!(LogConfig::parse_level("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(LogConfig::parse_level(" warning "), LevelFilter::WARN);
        assert_eq!(LogConfig::parse_level("none"), LevelFilter::OFF);
        assert_eq!(LogConfig::parse_level("chatty"), LevelFilter::INFO);
    }

    #[test]
    fn test_parse_retention() {
        assert_eq!(LogConfig::parse_retention("48"), 48);
        assert_eq!(LogConfig::parse_retention("-1"), DEFAULT_RETENTION_HOURS);
    }

    #[test]
    fn test_disabled() {
        let mut config = LogConfig::default();
        assert!(!config.is_disabled());
        config.level = LevelFilter::OFF;
        assert!(config.is_disabled());
        assert_eq!(init(&config).unwrap(), None);
    }

    #[test]
    fn test_log_file_name() {
        let started = chrono::Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(log_file_name(started), "addonhost-20240309-070501.log");
    }

    #[test]
    fn test_cleanup_only_touches_expired_own_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("addonhost-20240101-000000.log"), "x").unwrap();
        fs::write(dir.path().join("host.log"), "x").unwrap();

        // Fresh files survive any positive window
        assert!(cleanup_old_logs(dir.path(), 1).unwrap().is_empty());

        // A zero window expires everything older than now
        std::thread::sleep(Duration::from_millis(20));
        let removed = cleanup_old_logs(dir.path(), 0).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(dir.path().join("host.log").exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(cleanup_old_logs(&dir.path().join("nope"), 1).unwrap().is_empty());
    }
}
