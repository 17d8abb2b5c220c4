//! Addonhost
//!
//! Lifecycle manager for add-on packages layered onto a host application:
//! install, enable, disable, upgrade and uninstall them while merging their
//! files into a shared application tree and tracking every file each add-on
//! contributed.
//!
//! # Architecture
//!
//! - **Addons Module**: Package store, conflict scanner, overlay merger,
//!   lifecycle state machine, hook registrar and SQL importer
//! - **Config Module**: `addons.rc` host configuration
//! - **Logging Module**: File logging with retention cleanup
//!
//! # Usage
//!
//! ```no_run
//! use addonhost::{AddonManager, Config};
//!
//! let config = Config::load().expect("Failed to load config");
//! let mut manager = AddonManager::new(config);
//! for addon in manager.list_addons().expect("Failed to list add-ons") {
//!     println!("{} {}", addon.name, addon.version);
//! }
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]
#![allow(clippy::struct_excessive_bools)]

pub mod addons;
pub mod config;
pub mod logging;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export main types
pub use addons::{AddonError, AddonInfo, AddonManager, AddonState};
pub use config::Config;
