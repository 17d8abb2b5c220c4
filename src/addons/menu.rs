//! Menu side-table.
//!
//! Add-ons with `has_menu` set contribute admin menu entries. Where those
//! entries are stored belongs to the host; the lifecycle only tells it when
//! to add, enable, disable or drop them.

use serde::{Deserialize, Serialize};

use super::error::AddonError;
use super::types::AddonInfo;

/// One menu entry contributed by an add-on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    /// Route or rule name.
    pub name: String,
    /// Display title.
    pub title: String,
    /// Icon class.
    #[serde(default)]
    pub icon: String,
    /// Nested entries.
    #[serde(default)]
    pub children: Vec<MenuEntry>,
}

impl MenuEntry {
    /// Creates a leaf entry.
    #[must_use]
    pub fn new(name: &str, title: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            ..Self::default()
        }
    }
}

/// Host storage for add-on menu entries.
pub trait MenuTable {
    /// Stores the entries of an add-on.
    fn add_menu(&mut self, entries: &[MenuEntry], info: &AddonInfo) -> Result<(), AddonError>;

    /// Drops every entry of an add-on.
    fn remove_menu(&mut self, name: &str) -> Result<(), AddonError>;

    /// Shows the entries of an add-on.
    fn enable_menu(&mut self, name: &str) -> Result<(), AddonError>;

    /// Hides the entries of an add-on.
    fn disable_menu(&mut self, name: &str) -> Result<(), AddonError>;
}

/// Menu table for hosts without a menu.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMenu;

impl MenuTable for NoopMenu {
    fn add_menu(&mut self, _entries: &[MenuEntry], _info: &AddonInfo) -> Result<(), AddonError> {
        Ok(())
    }

    fn remove_menu(&mut self, _name: &str) -> Result<(), AddonError> {
        Ok(())
    }

    fn enable_menu(&mut self, _name: &str) -> Result<(), AddonError> {
        Ok(())
    }

    fn disable_menu(&mut self, _name: &str) -> Result<(), AddonError> {
        Ok(())
    }
}
