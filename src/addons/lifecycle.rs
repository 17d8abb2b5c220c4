//! Add-on lifecycle controller.
//!
//! [`AddonManager`] is the entry point for every mutating operation. It owns
//! the package store, the hook table and the host collaborators (archive
//! codec, SQL executor, menu table, add-on implementations), and moves an
//! add-on between these states:
//!
//! ```text
//! Uninstalled --install--> Enabled <--enable-- InstalledDisabled
//!                            |  ^
//!                    disable |  | enable
//!                            v  |
//!                          Disabled --uninstall--> Uninstalled
//! ```
//!
//! State is read back from disk on every call: the directory, the `status`
//! flag in `info.ini` and the presence of a manifest.
//!
//! Files are committed eagerly. When an add-on callback fails, filesystem
//! changes made before it stay in place; only a failed install removes the
//! add-on directory again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::archive::{self, ArchiveCodec, ZipCodec};
use super::backup;
use super::error::{AddonError, CallbackPhase};
use super::fetcher::{Credentials, PackageFetcher};
use super::hooks::HookRegistry;
use super::info;
use super::manifest::{self, AddonManifest};
use super::menu::{MenuTable, NoopMenu};
use super::merger::{OverlayMerger, prune_empty_dirs};
use super::middleware::{MiddlewareTable, NoopMiddleware, middleware_entries};
use super::plugin::{Addon, AddonContext, AddonRegistry, CallbackResult};
use super::scanner::{ConflictScanner, file_digest};
use super::settings::{self, Setting, SettingValues};
use super::snippet::{self, HookSnippet};
use super::sql::{self, INSTALL_SQL, RecordingExecutor, SqlExecutor, TESTDATA_SQL, UPDATE_SQL};
use super::store::{PackageStore, normalize_relative, validate_name};
use super::types::{AddonInfo, AddonState};
use crate::config::Config;

/// Downloaded package file, removed when dropped.
struct TempPackage {
    path: PathBuf,
}

impl Drop for TempPackage {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(
                    "[ADDON-FETCH] Failed to remove temporary package {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Add-on lifecycle state machine.
pub struct AddonManager {
    config: Config,
    store: PackageStore,
    codec: Box<dyn ArchiveCodec>,
    executor: Box<dyn SqlExecutor>,
    menu: Box<dyn MenuTable>,
    middleware: Box<dyn MiddlewareTable>,
    addons: AddonRegistry,
    hooks: HookRegistry,
}

impl std::fmt::Debug for AddonManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddonManager")
            .field("root", &self.store.root())
            .field("addons", &self.addons)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl AddonManager {
    /// Creates a manager with the zip codec, a recording SQL executor, no menu
    /// and no middleware table.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let store = PackageStore::from_config(&config);
        let hooks = HookRegistry::new(&config.hooks, config.autoload, config.debug);
        Self {
            config,
            store,
            codec: Box::new(ZipCodec),
            executor: Box::new(RecordingExecutor::new()),
            menu: Box::new(NoopMenu),
            middleware: Box::new(NoopMiddleware),
            addons: AddonRegistry::new(),
            hooks,
        }
    }

    /// Replaces the archive codec.
    #[must_use]
    pub fn with_codec(mut self, codec: impl ArchiveCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Replaces the SQL executor.
    #[must_use]
    pub fn with_executor(mut self, executor: impl SqlExecutor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    /// Replaces the menu table.
    #[must_use]
    pub fn with_menu(mut self, menu: impl MenuTable + 'static) -> Self {
        self.menu = Box::new(menu);
        self
    }

    /// Replaces the middleware table.
    #[must_use]
    pub fn with_middleware(mut self, middleware: impl MiddlewareTable + 'static) -> Self {
        self.middleware = Box::new(middleware);
        self
    }

    /// Replaces the add-on implementations.
    #[must_use]
    pub fn with_registry(mut self, addons: AddonRegistry) -> Self {
        self.addons = addons;
        self.hooks.invalidate();
        self
    }

    /// Host configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Package store.
    #[must_use]
    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    /// Add-on implementations, for registering more.
    pub fn registry_mut(&mut self) -> &mut AddonRegistry {
        self.hooks.invalidate();
        &mut self.addons
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current state of an add-on, read from disk.
    pub fn state(&self, name: &str) -> Result<AddonState, AddonError> {
        validate_name(name)?;
        let addon_dir = self.store.addon_dir(name);
        if !addon_dir.is_dir() {
            return Ok(AddonState::Uninstalled);
        }
        let enabled = info::try_read_info(&addon_dir)?.is_some_and(|i| i.enabled);
        Ok(AddonState::derive(
            true,
            enabled,
            manifest::has_manifest(&addon_dir),
        ))
    }

    /// Metadata of an installed add-on.
    pub fn info(&self, name: &str) -> Result<AddonInfo, AddonError> {
        validate_name(name)?;
        let addon_dir = self.store.addon_dir(name);
        if !addon_dir.is_dir() {
            return Err(AddonError::NotFound(name.to_string()));
        }
        info::try_read_info(&addon_dir)?.ok_or_else(|| AddonError::NotFound(name.to_string()))
    }

    /// Metadata of every installed add-on, sorted by name.
    ///
    /// Add-ons with unreadable metadata are skipped.
    pub fn list_addons(&self) -> Result<Vec<AddonInfo>, AddonError> {
        let mut addons = Vec::new();
        for name in self.store.list_addon_names()? {
            match info::read_info(&self.store.addon_dir(&name)) {
                Ok(info) => addons.push(info),
                Err(e) => warn!("[ADDON] Skipping {}: {}", name, e),
            }
        }
        Ok(addons)
    }

    /// Names of enabled add-ons, sorted.
    pub fn enabled_addons(&self) -> Result<Vec<String>, AddonError> {
        Ok(self
            .list_addons()?
            .into_iter()
            .filter(|info| info.enabled)
            .map(|info| info.name)
            .collect())
    }

    /// Manifest of an add-on.
    pub fn manifest(&self, name: &str) -> Result<AddonManifest, AddonError> {
        manifest::load(&self.store.addon_dir(name))
    }

    /// Tables created by an add-on's install script.
    pub fn created_tables(&self, name: &str) -> Result<Vec<String>, AddonError> {
        self.info(name)?;
        let path = self.store.sql_path(name, INSTALL_SQL);
        Ok(sql::created_tables(&path, &self.config.table_prefix)?)
    }

    /// Declared settings of an add-on.
    pub fn settings(&self, name: &str) -> Result<Vec<Setting>, AddonError> {
        self.info(name)?;
        settings::load(&self.store.addon_dir(name))
    }

    /// Writes new setting values into an add-on's schema.
    ///
    /// Returns how many settings changed.
    pub fn configure(&mut self, name: &str, values: &SettingValues) -> Result<usize, AddonError> {
        self.info(name)?;
        let addon_dir = self.store.addon_dir(name);
        let mut schema = settings::load(&addon_dir)?;
        let changed = settings::apply(&mut schema, values);
        if changed > 0 {
            settings::save(&addon_dir, &schema)?;
            info!("[ADDON-CONFIG] Updated {} setting(s) of {}", changed, name);
        }
        Ok(changed)
    }

    // ========================================================================
    // Hooks
    // ========================================================================

    /// Returns the hook table, building it if needed.
    pub fn hooks(&mut self) -> Result<&HookRegistry, AddonError> {
        self.ensure_hooks()?;
        Ok(&self.hooks)
    }

    /// Invokes every handler bound to `event`.
    ///
    /// Results are concatenated in binding order; with `once`, the first
    /// non-empty result wins.
    pub fn dispatch(
        &mut self,
        event: &str,
        params: &serde_json::Value,
        once: bool,
    ) -> Result<String, AddonError> {
        self.ensure_hooks()?;
        self.hooks.dispatch(event, params, once, &mut self.addons)
    }

    fn ensure_hooks(&mut self) -> Result<(), AddonError> {
        if self.hooks.is_stale() {
            let enabled = self.enabled_addons()?;
            self.hooks.build(&enabled, &mut self.addons);
        }
        Ok(())
    }

    // ========================================================================
    // Install
    // ========================================================================

    /// Installs an add-on from a package file and enables it.
    ///
    /// The returned metadata reports whether the package ships sample data.
    ///
    /// Without `force`, an existing add-on directory is an error and overlay
    /// files must not conflict with the shared tree. Any failure before the
    /// install callback has succeeded removes the add-on directory.
    pub fn install(&mut self, name: &str, force: bool, package: &Path) -> Result<AddonInfo, AddonError> {
        validate_name(name)?;
        if self.store.addon_exists(name) && !force {
            return Err(AddonError::AlreadyExists(name.to_string()));
        }
        info!("[ADDON-INSTALL] Installing {} from {} (force={})", name, package.display(), force);

        self.store.ensure_addons_root()?;
        let info = match self.prepare_install(name, force, package) {
            Ok(info) => info,
            Err(e) => {
                let addon_dir = self.store.addon_dir(name);
                if let Err(cleanup) = fs::remove_dir_all(&addon_dir) {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        warn!("[ADDON-INSTALL] Failed to remove {}: {}", addon_dir.display(), cleanup);
                    }
                }
                self.addons.forget(name);
                warn!("[ADDON-INSTALL] Install of {} failed: {}", name, e);
                return Err(e);
            }
        };

        let script = self.store.sql_path(name, INSTALL_SQL);
        sql::import(&script, &self.config.table_prefix, self.executor.as_mut())?;

        let mut enabled = self.enable(name, true)?;
        enabled.has_testdata = self.store.sql_path(name, TESTDATA_SQL).is_file();
        info!("[ADDON-INSTALL] Installed {} {}", name, info.version);
        Ok(enabled)
    }

    /// Downloads a package with `fetcher` and installs it.
    ///
    /// The downloaded file is removed on every exit path.
    pub fn install_remote(
        &mut self,
        name: &str,
        force: bool,
        fetcher: &dyn PackageFetcher,
        credentials: &Credentials,
    ) -> Result<AddonInfo, AddonError> {
        validate_name(name)?;
        if self.store.addon_exists(name) && !force {
            return Err(AddonError::AlreadyExists(name.to_string()));
        }

        let package = self.download(name, fetcher, credentials)?;
        self.install(name, force, &package.path)
    }

    fn download(
        &self,
        name: &str,
        fetcher: &dyn PackageFetcher,
        credentials: &Credentials,
    ) -> Result<TempPackage, AddonError> {
        let bytes = fetcher.fetch(name, credentials)?;
        let backup_dir = self.store.ensure_backup_dir()?;
        let package = TempPackage {
            path: backup_dir.join(format!("{}-{}.zip", name, uuid::Uuid::new_v4())),
        };
        fs::write(&package.path, bytes)?;
        debug!("[ADDON-FETCH] Saved package to {}", package.path.display());
        Ok(package)
    }

    /// Extract, validate, check and run the install callback.
    fn prepare_install(&mut self, name: &str, force: bool, package: &Path) -> Result<AddonInfo, AddonError> {
        let addon_dir = self.store.addon_dir(name);
        let count = archive::extract_file(self.codec.as_ref(), package, &addon_dir)?;
        debug!("[ADDON-INSTALL] Extracted {} file(s) into {}", count, addon_dir.display());

        let info = self.validate_package(name)?;
        self.check_prerequisites(&info)?;
        if !force {
            ConflictScanner::new(&self.store).check_no_conflicts(name)?;
        }

        // A fresh implementation sees the freshly extracted files
        self.addons.forget(name);
        self.call_addon(&info, CallbackPhase::Install, |addon, ctx| addon.install(ctx))?;

        if info.has_menu {
            let entries = self
                .addons
                .instance(name)
                .map(|addon| addon.menu())
                .unwrap_or_default();
            self.menu.add_menu(&entries, &info)?;
        }

        Ok(info)
    }

    /// Checks the extracted metadata.
    fn validate_package(&self, name: &str) -> Result<AddonInfo, AddonError> {
        let addon_dir = self.store.addon_dir(name);
        if !info::has_info(&addon_dir) {
            return Err(AddonError::validation(name, format!("package has no {}", info::INFO_FILE)));
        }

        let raw = info::read_raw(&addon_dir)?;
        let missing = raw.missing_keys();
        if !missing.is_empty() {
            return Err(AddonError::validation(
                name,
                format!("missing metadata keys: {}", missing.join(", ")),
            ));
        }

        let info = AddonInfo::from_raw(&raw)
            .ok_or_else(|| AddonError::validation(name, "metadata has no name"))?;
        if info.name != name {
            return Err(AddonError::validation(
                name,
                format!("package is named '{}'", info.name),
            ));
        }
        Ok(info)
    }

    /// Fails unless every pre-requisite add-on is enabled.
    fn check_prerequisites(&self, info: &AddonInfo) -> Result<(), AddonError> {
        let mut missing = Vec::new();
        for required in &info.pre_requisites {
            let enabled = validate_name(required).is_ok()
                && self.state(required)? == AddonState::Enabled;
            if !enabled {
                missing.push(required.as_str());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AddonError::validation(
                &info.name,
                format!("requires enabled add-ons: {}", missing.join(", ")),
            ))
        }
    }

    // ========================================================================
    // Enable / Disable
    // ========================================================================

    /// Merges an add-on's overlay files into the shared tree and marks it enabled.
    ///
    /// Without `force`, fails on files that differ from the shared tree or
    /// that another enabled add-on already owns. With `force`, such files are
    /// overwritten and their ownership moves to this add-on.
    ///
    /// A failing enable callback is reported after the status was persisted
    /// and the hook table invalidated.
    pub fn enable(&mut self, name: &str, force: bool) -> Result<AddonInfo, AddonError> {
        validate_name(name)?;
        if !self.store.addon_exists(name) {
            return Err(AddonError::NotFound(name.to_string()));
        }
        let addon_dir = self.store.addon_dir(name);
        let mut info = info::read_info(&addon_dir)?;
        info!("[ADDON-ENABLE] Enabling {} (force={})", name, force);

        let scanner = ConflictScanner::new(&self.store);
        let files = scanner.scan(name, false)?;
        let conflicts = scanner.scan(name, true)?;
        let owned = self.claimed_by_others(name, &files)?;

        if !force {
            let mut paths = conflicts.clone();
            for (_, claimed) in &owned {
                for path in claimed {
                    if !paths.contains(path) {
                        paths.push(path.clone());
                    }
                }
            }
            if !paths.is_empty() {
                return Err(AddonError::Conflict { paths });
            }
        }

        for (other, claimed) in &owned {
            let other_dir = self.store.addon_dir(other);
            let mut other_manifest = manifest::load(&other_dir)?;
            let released = other_manifest.release(claimed);
            manifest::save(&other_dir, &other_manifest)?;
            info!("[ADDON-ENABLE] {} took over {} file(s) from {}", name, released, other);
        }

        self.backup_conflicts(name, "conflict-enable", &conflicts);

        let merger = OverlayMerger::new(&self.store);
        let mut merged = merger.merge(name)?;
        let previous = manifest::load(&addon_dir)?;
        merged.metadata = previous.metadata.clone();
        let current = if merged.is_empty() { previous } else { merged };
        manifest::save(&addon_dir, &current)?;
        debug!("[ADDON-ENABLE] Manifest of {} lists {} file(s)", name, current.files.len());

        if self.config.pure_mode {
            merger.remove_overlay_dirs(name)?;
        }

        let callback = self.call_addon(&info, CallbackPhase::Enable, |addon, ctx| addon.enable(ctx));

        info.enabled = true;
        info::write_info(&addon_dir, &info)?;
        self.hooks.invalidate();
        self.sync_hook_snippet(name, true);

        let middleware = middleware_entries(self.store.root(), name);
        if !middleware.is_empty() {
            self.middleware.register(name, &middleware)?;
            debug!("[ADDON-ENABLE] Registered {} middleware of {}", middleware.len(), name);
        }

        if info.has_menu {
            self.menu.enable_menu(name)?;
        }

        callback?;
        info!("[ADDON-ENABLE] Enabled {}", name);
        Ok(info)
    }

    /// Removes an add-on's files from the shared tree and marks it disabled.
    ///
    /// The manifest is kept, so the add-on can be enabled again. A failing
    /// disable callback is logged and does not stop the transition.
    pub fn disable(&mut self, name: &str, force: bool) -> Result<AddonInfo, AddonError> {
        validate_name(name)?;
        let state = self.state(name)?;
        match state {
            AddonState::Uninstalled => return Err(AddonError::NotFound(name.to_string())),
            AddonState::Enabled => {}
            _ => {
                return Err(AddonError::InvalidState {
                    name: name.to_string(),
                    state,
                    hint: "only enabled add-ons can be disabled",
                });
            }
        }
        let addon_dir = self.store.addon_dir(name);
        let mut info = info::read_info(&addon_dir)?;
        info!("[ADDON-DISABLE] Disabling {} (force={})", name, force);

        let scanner = ConflictScanner::new(&self.store);
        let conflicts = scanner.scan(name, true)?;
        if !force && !conflicts.is_empty() {
            return Err(AddonError::Conflict { paths: conflicts });
        }
        self.backup_conflicts(name, "conflict-disable", &conflicts);

        let current = manifest::load(&addon_dir)?;
        let removal = if current.is_empty() {
            AddonManifest::with_files(scanner.scan(name, false)?)
        } else {
            current
        };

        let middleware = middleware_entries(self.store.root(), name);
        let merger = OverlayMerger::new(&self.store);
        if self.config.pure_mode || !merger.has_overlay_copies(name)? {
            let restored = merger.restore_to_addon(name, &removal)?;
            debug!("[ADDON-DISABLE] Copied {} file(s) back into {}", restored, name);
        }

        let report = merger.unmerge(&removal)?;
        debug!(
            "[ADDON-DISABLE] Removed {} file(s), {} already gone, pruned {} dir(s)",
            report.removed.len(),
            report.missing.len(),
            report.pruned_dirs
        );

        info.enabled = false;
        info::write_info(&addon_dir, &info)?;

        if let Err(e) = self.call_addon(&info, CallbackPhase::Disable, |addon, ctx| addon.disable(ctx)) {
            warn!("[ADDON-DISABLE] {}", e);
        }
        self.sync_hook_snippet(name, false);
        self.middleware.unregister(name, &middleware)?;

        if info.has_menu {
            self.menu.disable_menu(name)?;
        }
        self.hooks.invalidate();

        info!("[ADDON-DISABLE] Disabled {}", name);
        Ok(info)
    }

    // ========================================================================
    // Uninstall / Upgrade
    // ========================================================================

    /// Deletes a disabled add-on.
    ///
    /// With `force`, every shared-tree file the add-on's overlays would
    /// contribute is deleted too, and conflicts are ignored.
    pub fn uninstall(&mut self, name: &str, force: bool) -> Result<AddonInfo, AddonError> {
        validate_name(name)?;
        let state = self.state(name)?;
        match state {
            AddonState::Uninstalled => return Err(AddonError::NotFound(name.to_string())),
            AddonState::Enabled => {
                return Err(AddonError::InvalidState {
                    name: name.to_string(),
                    state,
                    hint: "disable it before uninstalling",
                });
            }
            AddonState::InstalledDisabled | AddonState::Disabled => {}
        }
        let addon_dir = self.store.addon_dir(name);
        let info = info::try_read_info(&addon_dir)?
            .unwrap_or_else(|| AddonInfo::new(name, name, "0"));
        info!("[ADDON-UNINSTALL] Uninstalling {} (force={})", name, force);

        let scanner = ConflictScanner::new(&self.store);
        if force {
            self.remove_shared_copies(&scanner.scan(name, false)?);
        } else {
            scanner.check_no_conflicts(name)?;
        }

        self.call_addon(&info, CallbackPhase::Uninstall, |addon, ctx| addon.uninstall(ctx))?;
        self.sync_hook_snippet(name, false);
        self.middleware
            .unregister(name, &middleware_entries(&addon_dir, name))?;

        if info.has_menu {
            self.menu.remove_menu(name)?;
        }

        fs::remove_dir_all(&addon_dir)?;
        self.addons.forget(name);
        self.hooks.invalidate();

        info!("[ADDON-UNINSTALL] Uninstalled {}", name);
        Ok(info)
    }

    /// Replaces an add-on's files with a new package and re-enables it.
    ///
    /// The add-on directory is backed up first; a failed backup is logged and
    /// the upgrade goes on. Setting values carry over into the new settings
    /// schema. Shared files the old version contributed and the new one no
    /// longer ships are removed unless they changed since. `new_version`
    /// overrides the version the package declares.
    pub fn upgrade(
        &mut self,
        name: &str,
        package: &Path,
        new_version: Option<&str>,
    ) -> Result<AddonInfo, AddonError> {
        validate_name(name)?;
        if !self.store.addon_exists(name) {
            return Err(AddonError::NotFound(name.to_string()));
        }
        let addon_dir = self.store.addon_dir(name);
        let old = info::read_info(&addon_dir)?;
        info!("[ADDON-UPGRADE] Upgrading {} from {}", name, old.version);

        let preserved = settings::preserve(&addon_dir)?;
        let written = self.contributed_digests(name, &manifest::load(&addon_dir)?);
        if let Err(e) = backup::backup_addon_dir(
            self.codec.as_ref(),
            self.store.backup_dir(),
            name,
            &addon_dir,
        ) {
            warn!("[ADDON-UPGRADE] Backup of {} failed, continuing: {}", name, e);
        }

        OverlayMerger::new(&self.store).remove_overlay_dirs(name)?;
        archive::extract_file(self.codec.as_ref(), package, &addon_dir)?;
        settings::restore(&addon_dir, &preserved)?;

        let script = self.store.sql_path(name, UPDATE_SQL);
        sql::import(&script, &self.config.table_prefix, self.executor.as_mut())?;

        let upgraded = info::read_info(&addon_dir)?;
        self.addons.forget(name);
        if let Some(migration) = self.addons.migration(name) {
            let ctx = AddonContext {
                name,
                addon_dir: &addon_dir,
                root: self.store.root(),
                info: &upgraded,
            };
            migration
                .upgrade(&ctx, &old.version)
                .map_err(|e| AddonError::Callback {
                    name: name.to_string(),
                    phase: CallbackPhase::Upgrade,
                    message: e.to_string(),
                })?;
        }

        let mut info = self.enable(name, true)?;
        self.remove_dropped_files(name, &written)?;
        if let Some(version) = new_version.filter(|v| !v.is_empty()) {
            if info.version != version {
                info.version = version.to_string();
                info::write_info(&addon_dir, &info)?;
            }
        }

        info!("[ADDON-UPGRADE] Upgraded {} to {}", name, info.version);
        Ok(info)
    }

    /// Downloads a package with `fetcher` and upgrades to it.
    pub fn upgrade_remote(
        &mut self,
        name: &str,
        fetcher: &dyn PackageFetcher,
        credentials: &Credentials,
        new_version: Option<&str>,
    ) -> Result<AddonInfo, AddonError> {
        validate_name(name)?;
        if !self.store.addon_exists(name) {
            return Err(AddonError::NotFound(name.to_string()));
        }

        let package = self.download(name, fetcher, credentials)?;
        self.upgrade(name, &package.path, new_version)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Runs an add-on callback if an implementation is registered.
    fn call_addon<F>(&mut self, info: &AddonInfo, phase: CallbackPhase, f: F) -> Result<(), AddonError>
    where
        F: FnOnce(&mut dyn Addon, &AddonContext<'_>) -> CallbackResult,
    {
        let addon_dir = self.store.addon_dir(&info.name);
        let Some(addon) = self.addons.instance(&info.name) else {
            return Ok(());
        };
        let ctx = AddonContext {
            name: &info.name,
            addon_dir: &addon_dir,
            root: self.store.root(),
            info,
        };

        f(&mut **addon, &ctx).map_err(|e| AddonError::Callback {
            name: info.name.clone(),
            phase,
            message: e.to_string(),
        })
    }

    /// Writes or strips an add-on's hook snippet. Failures are logged.
    ///
    /// Add-ons without a snippet get any stale block in the default hook
    /// file removed.
    fn sync_hook_snippet(&mut self, name: &str, active: bool) {
        let snippet = self
            .addons
            .instance(name)
            .and_then(|addon| addon.hook_snippet())
            .unwrap_or_else(|| HookSnippet::new(""));
        let Some(path) = self.store.hook_file_path(&snippet.file) else {
            warn!("[ADDON-SNIPPET] {} names an invalid hook file: {}", name, snippet.file);
            return;
        };

        let text = if active { snippet.text.as_str() } else { "" };
        if let Err(e) = snippet::write_snippet(&path, name, text) {
            warn!("[ADDON-SNIPPET] Failed to update {}: {}", path.display(), e);
        }
    }

    /// Digest of what an add-on wrote for each manifest path.
    ///
    /// Read from the add-on's own copy when it still has one, else from the
    /// shared file.
    fn contributed_digests(&self, name: &str, manifest: &AddonManifest) -> Vec<(String, String)> {
        manifest
            .files
            .iter()
            .filter_map(|path| {
                let source = self
                    .store
                    .source_for(name, path)
                    .filter(|p| p.is_file())
                    .unwrap_or_else(|| self.store.shared_path(path));
                file_digest(&source).ok().map(|digest| (path.clone(), digest))
            })
            .collect()
    }

    /// Removes shared files an earlier version wrote that the current
    /// manifest no longer lists. Files edited since are kept.
    fn remove_dropped_files(&self, name: &str, written: &[(String, String)]) -> Result<(), AddonError> {
        let current = manifest::load(&self.store.addon_dir(name))?;
        let mut dropped = Vec::new();
        for (path, digest) in written {
            if current.contains(path) {
                continue;
            }
            match file_digest(&self.store.shared_path(path)) {
                Ok(now) if now == *digest => dropped.push(path.clone()),
                Ok(_) => warn!("[ADDON-UPGRADE] Keeping {} of {}: changed since it was written", path, name),
                Err(_) => {}
            }
        }
        if dropped.is_empty() {
            return Ok(());
        }

        let report = OverlayMerger::new(&self.store).unmerge(&AddonManifest::with_files(dropped))?;
        info!(
            "[ADDON-UPGRADE] Removed {} file(s) {} no longer ships",
            report.removed.len(),
            name
        );
        Ok(())
    }

    /// Paths from `files` that other enabled add-ons list in their manifests.
    fn claimed_by_others(
        &self,
        name: &str,
        files: &[String],
    ) -> Result<Vec<(String, Vec<String>)>, AddonError> {
        let mut claims = Vec::new();
        if files.is_empty() {
            return Ok(claims);
        }

        for other in self.enabled_addons()? {
            if other == name {
                continue;
            }
            let other_manifest = manifest::load(&self.store.addon_dir(&other))?;
            let overlap: Vec<String> = files
                .iter()
                .filter(|f| other_manifest.contains(f))
                .cloned()
                .collect();
            if !overlap.is_empty() {
                claims.push((other, overlap));
            }
        }
        Ok(claims)
    }

    /// Zips conflicting shared files when the backup policy is on.
    ///
    /// Failures are logged and ignored.
    fn backup_conflicts(&self, name: &str, kind: &str, conflicts: &[String]) {
        if !self.config.backup_global_files {
            return;
        }
        if let Err(e) = backup::backup_conflicts(
            self.codec.as_ref(),
            self.store.backup_dir(),
            name,
            kind,
            self.store.root(),
            conflicts,
        ) {
            warn!("[ADDON-BACKUP] Backup of {} conflicts failed: {}", name, e);
        }
    }

    /// Best-effort delete of shared-tree files, pruning empty parents.
    fn remove_shared_copies(&self, paths: &[String]) {
        for path in paths {
            let Some(relative) = normalize_relative(path) else {
                continue;
            };
            let target = self.store.shared_path(&relative);
            if !target.is_file() {
                continue;
            }
            match fs::remove_file(&target) {
                Ok(()) => {
                    if let Some(parent) = target.parent() {
                        prune_empty_dirs(self.store.root(), parent);
                    }
                }
                Err(e) => warn!("[ADDON-UNINSTALL] Failed to remove {}: {}", relative, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn manager() -> (TempDir, AddonManager) {
        let dir = TempDir::new().unwrap();
        let manager = AddonManager::new(Config::for_root(dir.path()));
        (dir, manager)
    }

    fn place_addon(manager: &AddonManager, name: &str, status: &str) {
        let addon_dir = manager.store().addon_dir(name);
        write(
            &addon_dir.join("info.ini"),
            &format!(
                "name = {}\ntitle = T\nintro = I\nauthor = A\nversion = 1.0.0\nstatus = {}\n",
                name, status
            ),
        );
        write(&addon_dir.join("app/controller/Demo.php"), "demo");
    }

    #[test]
    fn test_state_of_missing_addon() {
        let (_dir, manager) = manager();
        assert_eq!(manager.state("demo").unwrap(), AddonState::Uninstalled);
        assert!(matches!(manager.info("demo"), Err(AddonError::NotFound(_))));
    }

    #[test]
    fn test_enable_then_disable_in_place() {
        let (dir, mut manager) = manager();
        place_addon(&manager, "demo", "0");
        assert_eq!(manager.state("demo").unwrap(), AddonState::InstalledDisabled);

        let info = manager.enable("demo", false).unwrap();
        assert!(info.enabled);
        assert_eq!(manager.state("demo").unwrap(), AddonState::Enabled);
        assert!(dir.path().join("app/controller/Demo.php").is_file());

        manager.disable("demo", false).unwrap();
        assert_eq!(manager.state("demo").unwrap(), AddonState::Disabled);
        assert!(!dir.path().join("app").exists());
    }

    #[test]
    fn test_disable_requires_enabled() {
        let (_dir, mut manager) = manager();
        place_addon(&manager, "demo", "0");
        let err = manager.disable("demo", false).unwrap_err();
        assert!(matches!(err, AddonError::InvalidState { .. }));
    }

    #[test]
    fn test_uninstall_requires_disabled() {
        let (_dir, mut manager) = manager();
        place_addon(&manager, "demo", "0");
        manager.enable("demo", false).unwrap();

        let err = manager.uninstall("demo", false).unwrap_err();
        assert!(matches!(
            err,
            AddonError::InvalidState {
                state: AddonState::Enabled,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let (_dir, mut manager) = manager();
        assert!(matches!(
            manager.enable("../etc", false),
            Err(AddonError::Validation { .. })
        ));
    }

    #[test]
    fn test_temp_package_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkg.zip");
        fs::write(&path, b"PK").unwrap();
        drop(TempPackage { path: path.clone() });
        assert!(!path.exists());
    }
}
