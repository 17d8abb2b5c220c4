//! Add-on error types.

use std::io;

use thiserror::Error;

use super::types::AddonState;

/// Errors that can occur while managing add-ons.
#[derive(Debug, Error)]
pub enum AddonError {
    /// Add-on directory already exists and `force` was not given.
    #[error("Add-on '{0}' already exists")]
    AlreadyExists(String),

    /// Add-on or package missing.
    #[error("Add-on '{0}' not found")]
    NotFound(String),

    /// Metadata incomplete or inconsistent.
    #[error("Invalid add-on '{name}': {reason}")]
    Validation {
        /// Add-on name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Overlay files collide with modified files in the shared tree.
    #[error("Conflicting files found: {}", paths.join(", "))]
    Conflict {
        /// Shared-tree relative paths that differ.
        paths: Vec<String>,
    },

    /// Download or extraction failure.
    #[error("Package error: {0}")]
    Package(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Transition attempted from the wrong state.
    #[error("Add-on '{name}' is {state}: {hint}")]
    InvalidState {
        /// Add-on name.
        name: String,
        /// State the add-on was found in.
        state: AddonState,
        /// What the caller should do instead.
        hint: &'static str,
    },

    /// Add-on supplied lifecycle code failed.
    #[error("{phase} callback of '{name}' failed: {message}")]
    Callback {
        /// Add-on name.
        name: String,
        /// Lifecycle phase that failed.
        phase: CallbackPhase,
        /// Error reported by the add-on.
        message: String,
    },
}

impl AddonError {
    /// Creates a validation error.
    pub fn validation(name: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the conflicting paths if this is a conflict error.
    #[must_use]
    pub fn conflict_paths(&self) -> Option<&[String]> {
        match self {
            Self::Conflict { paths } => Some(paths),
            _ => None,
        }
    }
}

/// Lifecycle phase an add-on callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPhase {
    Install,
    Uninstall,
    Enable,
    Disable,
    Upgrade,
    Hook,
}

impl std::fmt::Display for CallbackPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Upgrade => "upgrade",
            Self::Hook => "hook",
        };
        write!(f, "{}", s)
    }
}
