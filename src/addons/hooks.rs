//! Hook registrar.
//!
//! Binds event names to the enabled add-ons that handle them. Bindings come
//! from two places: explicit `hook.<event>` entries in the host config, and
//! the hook names each registered add-on declares. Event names are always
//! snake_case (`onOrderPaid` binds as `on_order_paid`).
//!
//! The table is built on first use and kept until [`HookRegistry::invalidate`]
//! is called. In debug mode it is rebuilt on every read.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::error::{AddonError, CallbackPhase};
use super::plugin::AddonRegistry;

/// Event run once per bound add-on every time the table is built.
pub const ADDONS_INIT: &str = "addons_init";

/// Names reserved by the add-on contract, never bound as hooks.
pub const BASE_CONTRACT: [&str; 10] = [
    "install",
    "uninstall",
    "enable",
    "disable",
    "upgrade",
    "config",
    "hooks",
    "handle",
    "menu",
    "info",
];

/// One add-on bound to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookBinding {
    /// Add-on name.
    pub addon: String,
    /// Hook name passed to the add-on's handler.
    pub hook: String,
}

/// Converts a hook name to snake_case: every uppercase letter starts a new
/// word, the result is lowercased and outer underscores are trimmed.
#[must_use]
pub fn normalize_hook_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.trim().chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out.trim_matches('_').to_string()
}

/// Returns true if a hook name collides with the add-on contract.
#[must_use]
pub fn is_base_method(name: &str) -> bool {
    let normalized = normalize_hook_name(name);
    BASE_CONTRACT.contains(&normalized.as_str())
}

/// Cached event -> add-on binding table.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    explicit: Vec<(String, Vec<String>)>,
    autoload: bool,
    debug: bool,
    table: Option<BTreeMap<String, Vec<HookBinding>>>,
}

impl HookRegistry {
    /// Creates a registry from explicit bindings and policy flags.
    #[must_use]
    pub fn new(explicit: &[(String, Vec<String>)], autoload: bool, debug: bool) -> Self {
        let explicit = explicit
            .iter()
            .map(|(event, addons)| (normalize_hook_name(event), addons.clone()))
            .filter(|(event, _)| !event.is_empty())
            .collect();

        Self {
            explicit,
            autoload,
            debug,
            table: None,
        }
    }

    /// Drops the cached table.
    pub fn invalidate(&mut self) {
        if self.table.take().is_some() {
            debug!("[ADDON-HOOKS] Hook table invalidated");
        }
    }

    /// Returns true if the next read has to rebuild the table.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.debug || self.table.is_none()
    }

    /// Builds the table for the given enabled add-ons.
    ///
    /// Explicit bindings come first, discovered ones are appended; an add-on
    /// appears at most once per event. Add-ons that are not enabled or have
    /// no registered implementation are never bound. `addons_init` handlers
    /// run once each, in binding order; their failures are logged.
    pub fn build(&mut self, enabled: &[String], addons: &mut AddonRegistry) {
        let mut table: BTreeMap<String, Vec<HookBinding>> = BTreeMap::new();
        let is_bindable = |name: &str, addons: &AddonRegistry| {
            enabled.iter().any(|e| e == name) && addons.contains(name)
        };

        // Declared hooks of every bindable add-on, keyed by event
        let mut declared: Vec<(String, Vec<(String, String)>)> = Vec::new();
        for name in enabled {
            if !addons.contains(name) {
                continue;
            }
            let hooks = addons
                .instance(name)
                .map(|addon| addon.hooks())
                .unwrap_or_default();
            let pairs = hooks
                .into_iter()
                .filter(|hook| !is_base_method(hook))
                .map(|hook| (normalize_hook_name(&hook), hook))
                .filter(|(event, _)| !event.is_empty())
                .collect();
            declared.push((name.clone(), pairs));
        }

        let declared_hook = |addon: &str, event: &str| -> Option<String> {
            declared
                .iter()
                .find(|(name, _)| name == addon)
                .and_then(|(_, pairs)| pairs.iter().find(|(e, _)| e == event))
                .map(|(_, hook)| hook.clone())
        };

        for (event, names) in &self.explicit {
            for name in names {
                if !is_bindable(name, &*addons) {
                    debug!("[ADDON-HOOKS] Skipping {} for {}: not enabled", name, event);
                    continue;
                }
                let hook = declared_hook(name, event).unwrap_or_else(|| event.clone());
                push_unique(&mut table, event, name, hook);
            }
        }

        if self.autoload {
            for (name, pairs) in &declared {
                for (event, hook) in pairs {
                    push_unique(&mut table, event, name, hook.clone());
                }
            }
        }

        info!(
            "[ADDON-HOOKS] Built hook table: {} event(s) for {} enabled add-on(s)",
            table.len(),
            enabled.len()
        );

        if let Some(bindings) = table.get(ADDONS_INIT) {
            for binding in bindings {
                let Some(addon) = addons.instance(&binding.addon) else {
                    continue;
                };
                if let Err(e) = addon.handle(&binding.hook, &serde_json::Value::Null) {
                    warn!("[ADDON-HOOKS] {} init hook failed: {}", binding.addon, e);
                }
            }
        }

        self.table = Some(table);
    }

    /// Bindings of an event in call order. Empty if the table is not built.
    #[must_use]
    pub fn bindings(&self, event: &str) -> &[HookBinding] {
        let event = normalize_hook_name(event);
        self.table
            .as_ref()
            .and_then(|t| t.get(&event))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Events currently bound, sorted.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.table
            .as_ref()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Invokes every handler bound to `event`.
    ///
    /// Results are concatenated in binding order. With `once`, the first
    /// non-empty result is returned and later handlers are not called.
    pub fn dispatch(
        &self,
        event: &str,
        params: &serde_json::Value,
        once: bool,
        addons: &mut AddonRegistry,
    ) -> Result<String, AddonError> {
        let mut output = String::new();

        for binding in self.bindings(event) {
            let Some(addon) = addons.instance(&binding.addon) else {
                continue;
            };
            let result = addon.handle(&binding.hook, params).map_err(|e| AddonError::Callback {
                name: binding.addon.clone(),
                phase: CallbackPhase::Hook,
                message: e.to_string(),
            })?;

            if once && !result.is_empty() {
                return Ok(result);
            }
            output.push_str(&result);
        }

        Ok(output)
    }
}

fn push_unique(table: &mut BTreeMap<String, Vec<HookBinding>>, event: &str, addon: &str, hook: String) {
    let bindings = table.entry(event.to_string()).or_default();
    if !bindings.iter().any(|b| b.addon == addon) {
        bindings.push(HookBinding {
            addon: addon.to_string(),
            hook,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::plugin::{Addon, AddonContext, CallbackResult};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Echo {
        hooks: Vec<&'static str>,
        reply: &'static str,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl Addon for Echo {
        fn install(&mut self, _ctx: &AddonContext<'_>) -> CallbackResult {
            Ok(())
        }

        fn uninstall(&mut self, _ctx: &AddonContext<'_>) -> CallbackResult {
            Ok(())
        }

        fn hooks(&self) -> Vec<String> {
            self.hooks.iter().map(|h| h.to_string()).collect()
        }

        fn handle(&mut self, hook: &str, _params: &serde_json::Value) -> CallbackResult<String> {
            self.calls.borrow_mut().push(hook.to_string());
            Ok(self.reply.to_string())
        }
    }

    fn registry_with(
        entries: &[(&str, Vec<&'static str>, &'static str)],
    ) -> (AddonRegistry, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = AddonRegistry::new();
        for (name, hooks, reply) in entries {
            let hooks = hooks.clone();
            let reply = *reply;
            let calls = Rc::clone(&calls);
            registry.register(name, move || {
                Box::new(Echo {
                    hooks: hooks.clone(),
                    reply,
                    calls: Rc::clone(&calls),
                })
            });
        }
        (registry, calls)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_hook_name() {
        assert_eq!(normalize_hook_name("onOrderPaid"), "on_order_paid");
        assert_eq!(normalize_hook_name("AddonsInit"), "addons_init");
        assert_eq!(normalize_hook_name("already_snake"), "already_snake");
        assert_eq!(normalize_hook_name(""), "");
    }

    #[test]
    fn test_base_methods_are_ignored() {
        assert!(is_base_method("install"));
        assert!(is_base_method("Enable"));
        assert!(!is_base_method("onOrderPaid"));
    }

    #[test]
    fn test_discovery_binds_declared_hooks() {
        let (mut addons, _) = registry_with(&[("shop", vec!["onOrderPaid", "install"], "")]);
        let mut hooks = HookRegistry::new(&[], true, false);
        hooks.build(&names(&["shop"]), &mut addons);

        assert_eq!(hooks.events(), vec!["on_order_paid"]);
        assert_eq!(
            hooks.bindings("onOrderPaid"),
            &[HookBinding {
                addon: "shop".to_string(),
                hook: "onOrderPaid".to_string()
            }]
        );
    }

    #[test]
    fn test_explicit_first_then_discovered() {
        let (mut addons, _) = registry_with(&[
            ("alpha", vec!["orderPaid"], "a"),
            ("beta", vec!["orderPaid"], "b"),
            ("gamma", vec![], "g"),
        ]);
        let explicit = vec![(
            "orderPaid".to_string(),
            names(&["gamma", "beta", "ghost"]),
        )];
        let mut hooks = HookRegistry::new(&explicit, true, false);
        hooks.build(&names(&["alpha", "beta", "gamma"]), &mut addons);

        let order: Vec<&str> = hooks
            .bindings("order_paid")
            .iter()
            .map(|b| b.addon.as_str())
            .collect();
        assert_eq!(order, vec!["gamma", "beta", "alpha"]);
        assert_eq!(
            hooks.dispatch("order_paid", &serde_json::Value::Null, false, &mut addons).unwrap(),
            "gba"
        );
        assert_eq!(
            hooks.dispatch("order_paid", &serde_json::Value::Null, true, &mut addons).unwrap(),
            "g"
        );
    }

    #[test]
    fn test_disabled_addons_are_not_bound() {
        let (mut addons, _) = registry_with(&[("shop", vec!["orderPaid"], "x")]);
        let explicit = vec![("order_paid".to_string(), names(&["shop"]))];
        let mut hooks = HookRegistry::new(&explicit, true, false);
        hooks.build(&[], &mut addons);
        assert!(hooks.bindings("order_paid").is_empty());
    }

    #[test]
    fn test_autoload_off_keeps_explicit_only() {
        let (mut addons, _) = registry_with(&[
            ("alpha", vec!["orderPaid", "userLogin"], ""),
        ]);
        let explicit = vec![("order_paid".to_string(), names(&["alpha"]))];
        let mut hooks = HookRegistry::new(&explicit, false, false);
        hooks.build(&names(&["alpha"]), &mut addons);
        assert_eq!(hooks.events(), vec!["order_paid"]);
        assert_eq!(hooks.bindings("order_paid")[0].hook, "orderPaid");
    }

    #[test]
    fn test_addons_init_runs_at_build() {
        let (mut addons, calls) = registry_with(&[("boot", vec!["AddonsInit"], "")]);
        let mut hooks = HookRegistry::new(&[], true, false);
        hooks.build(&names(&["boot"]), &mut addons);
        assert_eq!(*calls.borrow(), vec!["AddonsInit"]);
    }

    #[test]
    fn test_cache_and_invalidate() {
        let mut hooks = HookRegistry::new(&[], true, false);
        assert!(hooks.is_stale());
        hooks.build(&[], &mut AddonRegistry::new());
        assert!(!hooks.is_stale());
        hooks.invalidate();
        assert!(hooks.is_stale());

        let mut debug_hooks = HookRegistry::new(&[], true, true);
        debug_hooks.build(&[], &mut AddonRegistry::new());
        assert!(debug_hooks.is_stale());
    }
}
