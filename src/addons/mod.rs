//! Add-on lifecycle and file-overlay engine.
//!
//! Add-ons are packages unpacked under the add-on root. Enabling one copies
//! the files in its overlay directories (`app`, `public`, `view`, plus
//! `assets` mapped under `public/assets/addons/<name>/`) into the shared
//! application tree and records them in a manifest, so disabling it removes
//! exactly those files again.
//!
//! # Architecture
//!
//! - **store**: Where add-ons, backups and overlay files live
//! - **scanner**: Overlay file enumeration and conflict detection
//! - **merger**: Copying into and removing from the shared tree
//! - **lifecycle**: `AddonManager`, the install/enable/disable/uninstall/upgrade state machine
//! - **hooks**: Event to add-on binding table
//! - **sql**: Bootstrap SQL import
//! - **info** / **manifest** / **settings**: Per-add-on files
//! - **archive** / **backup** / **fetcher**: Packages on disk and over the wire
//! - **plugin** / **menu** / **middleware**: Host-side add-on code, menu and middleware storage
//! - **snippet**: Marker blocks in shared hook files
//!
//! # Usage
//!
//! ```no_run
//! use addonhost::addons::AddonManager;
//! use addonhost::config::Config;
//! use std::path::Path;
//!
//! let config = Config::for_root(Path::new("/srv/app"));
//! let mut manager = AddonManager::new(config);
//! manager.install("demo", false, Path::new("demo.zip"))?;
//! manager.disable("demo", false)?;
//! # Ok::<(), addonhost::addons::AddonError>(())
//! ```

pub mod archive;
pub mod backup;
mod error;
pub mod fetcher;
pub mod hooks;
pub mod info;
pub mod lifecycle;
pub mod manifest;
pub mod menu;
pub mod merger;
pub mod middleware;
pub mod plugin;
pub mod scanner;
pub mod settings;
pub mod snippet;
pub mod sql;
pub mod store;
pub mod types;

pub use archive::{ArchiveCodec, ZipCodec};
pub use error::{AddonError, CallbackPhase};
pub use fetcher::{Credentials, HttpFetcher, LocalFetcher, PackageFetcher};
pub use hooks::{HookBinding, HookRegistry, normalize_hook_name};
pub use lifecycle::AddonManager;
pub use manifest::AddonManifest;
pub use menu::{MenuEntry, MenuTable, NoopMenu};
pub use merger::{OverlayMerger, UnmergeReport};
pub use middleware::{MiddlewareTable, NoopMiddleware};
pub use plugin::{Addon, AddonContext, AddonRegistry, CallbackResult, Migration};
pub use scanner::ConflictScanner;
pub use settings::{Setting, SettingValues};
pub use snippet::HookSnippet;
pub use sql::{ImportReport, RecordingExecutor, SqlError, SqlExecutor};
pub use store::PackageStore;
pub use types::{AddonInfo, AddonState};
