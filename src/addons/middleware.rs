//! Middleware side-table.
//!
//! An add-on can ship request middleware as `app/api/middleware/<Name>.php`
//! or `app/index/middleware/<Name>.php`, where `<Name>` is the add-on name
//! with its first letter upper-cased. The host keeps the list of active
//! middleware; the lifecycle registers an add-on's entries on enable and
//! drops them again on disable and uninstall.

use std::path::Path;

use super::error::AddonError;

/// Directories searched for add-on middleware, relative to a tree root.
pub const MIDDLEWARE_DIRS: &[&str] = &["app/api/middleware", "app/index/middleware"];

/// Middleware file stem of an add-on: `shop` becomes `Shop`.
#[must_use]
pub fn middleware_class(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Middleware files of an add-on that exist under `base`.
///
/// Entries are `/`-separated paths relative to `base`.
#[must_use]
pub fn middleware_entries(base: &Path, name: &str) -> Vec<String> {
    let class = middleware_class(name);
    MIDDLEWARE_DIRS
        .iter()
        .map(|dir| format!("{}/{}.php", dir, class))
        .filter(|relative| {
            relative
                .split('/')
                .fold(base.to_path_buf(), |acc, part| acc.join(part))
                .is_file()
        })
        .collect()
}

/// Host storage for active add-on middleware.
pub trait MiddlewareTable {
    /// Activates the middleware an add-on ships.
    fn register(&mut self, name: &str, entries: &[String]) -> Result<(), AddonError>;

    /// Deactivates every middleware of an add-on. `entries` lists the files
    /// still found on disk and may be empty.
    fn unregister(&mut self, name: &str, entries: &[String]) -> Result<(), AddonError>;
}

/// Middleware table for hosts without middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMiddleware;

impl MiddlewareTable for NoopMiddleware {
    fn register(&mut self, _name: &str, _entries: &[String]) -> Result<(), AddonError> {
        Ok(())
    }

    fn unregister(&mut self, _name: &str, _entries: &[String]) -> Result<(), AddonError> {
        Ok(())
    }
}
