//! Add-on implementations.
//!
//! Add-on code is linked into the host and registered by name in an
//! [`AddonRegistry`]. The lifecycle calls into it at each transition and the
//! hook registrar routes events to it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::menu::MenuEntry;
use super::snippet::HookSnippet;
use super::types::AddonInfo;

/// Error type add-on callbacks report.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result of an add-on callback.
pub type CallbackResult<T = ()> = Result<T, CallbackError>;

/// What a callback gets to see about its add-on.
#[derive(Debug, Clone, Copy)]
pub struct AddonContext<'a> {
    /// Add-on name.
    pub name: &'a str,
    /// Add-on directory.
    pub addon_dir: &'a Path,
    /// Shared-tree root.
    pub root: &'a Path,
    /// Current metadata.
    pub info: &'a AddonInfo,
}

/// Lifecycle callbacks and hook handlers of one add-on.
pub trait Addon {
    /// Runs once after the package is extracted.
    fn install(&mut self, ctx: &AddonContext<'_>) -> CallbackResult;

    /// Runs before the add-on directory is deleted.
    fn uninstall(&mut self, ctx: &AddonContext<'_>) -> CallbackResult;

    /// Runs after the add-on files were merged.
    fn enable(&mut self, _ctx: &AddonContext<'_>) -> CallbackResult {
        Ok(())
    }

    /// Runs after the add-on files were removed.
    fn disable(&mut self, _ctx: &AddonContext<'_>) -> CallbackResult {
        Ok(())
    }

    /// Hook names this add-on handles, in camelCase or snake_case.
    fn hooks(&self) -> Vec<String> {
        Vec::new()
    }

    /// Handles one hook invocation.
    fn handle(&mut self, _hook: &str, _params: &serde_json::Value) -> CallbackResult<String> {
        Ok(String::new())
    }

    /// Menu entries for add-ons with `has_menu`.
    fn menu(&self) -> Vec<MenuEntry> {
        Vec::new()
    }

    /// Code written into a shared hook file while the add-on is enabled.
    fn hook_snippet(&self) -> Option<HookSnippet> {
        None
    }
}

/// Upgrade step run after a new package version was extracted.
pub trait Migration {
    /// Migrates from `from_version` to the version in `ctx.info`.
    fn upgrade(&mut self, ctx: &AddonContext<'_>, from_version: &str) -> CallbackResult;
}

/// Builds an add-on implementation.
pub type AddonFactory = Box<dyn Fn() -> Box<dyn Addon>>;

/// Name-keyed add-on implementations.
///
/// Instances are built on first use and kept until [`forget`](Self::forget).
#[derive(Default)]
pub struct AddonRegistry {
    factories: BTreeMap<String, AddonFactory>,
    instances: HashMap<String, Box<dyn Addon>>,
    migrations: HashMap<String, Box<dyn Migration>>,
}

impl std::fmt::Debug for AddonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddonRegistry")
            .field("addons", &self.factories.keys().collect::<Vec<_>>())
            .field("migrations", &self.migrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AddonRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the implementation of an add-on.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Addon> + 'static,
    {
        assert!(!name.is_empty(), "Add-on name must not be empty");
        self.instances.remove(name);
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Registers the upgrade step of an add-on.
    pub fn register_migration<M>(&mut self, name: &str, migration: M)
    where
        M: Migration + 'static,
    {
        self.migrations.insert(name.to_string(), Box::new(migration));
    }

    /// Returns true if an implementation is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered add-on names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Returns the instance of an add-on, building it on first use.
    pub fn instance(&mut self, name: &str) -> Option<&mut Box<dyn Addon>> {
        if !self.instances.contains_key(name) {
            let factory = self.factories.get(name)?;
            self.instances.insert(name.to_string(), factory());
        }
        self.instances.get_mut(name)
    }

    /// Returns the upgrade step of an add-on.
    pub fn migration(&mut self, name: &str) -> Option<&mut Box<dyn Migration>> {
        self.migrations.get_mut(name)
    }

    /// Drops the cached instance so the next use builds a fresh one.
    pub fn forget(&mut self, name: &str) {
        self.instances.remove(name);
    }
}
