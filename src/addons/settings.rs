//! Declarative add-on settings.
//!
//! Each add-on may ship a `config.toml` describing its settings:
//!
//! ```toml
//! [[setting]]
//! name = "api_key"
//! title = "API key"
//! type = "string"
//! value = ""
//!
//! [[setting]]
//! name = "mail"
//! type = "group"
//!
//! [[setting.children]]
//! name = "mail_from"
//! value = "noreply@example.com"
//! ```
//!
//! Values survive upgrades: they are read before new files are extracted
//! and written back into the new schema afterwards.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::AddonError;
use super::store::SETTINGS_FILE;

/// One declared setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    /// Setting key.
    pub name: String,
    /// Human-readable label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Input type hint (string, number, bool, group, ...).
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Current value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<toml::Value>,
    /// Nested settings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Setting>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default, rename = "setting")]
    settings: Vec<Setting>,
}

/// Flat name -> value view of a settings schema.
pub type SettingValues = BTreeMap<String, toml::Value>;

/// Loads the settings schema of an add-on directory.
///
/// A missing file yields an empty schema.
pub fn load(addon_dir: &Path) -> Result<Vec<Setting>, AddonError> {
    let path = addon_dir.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path)?;
    let file: SettingsFile = toml::from_str(&content).map_err(|e| {
        AddonError::validation(
            &addon_name(addon_dir),
            format!("invalid {}: {}", SETTINGS_FILE, e),
        )
    })?;
    Ok(file.settings)
}

/// Writes the settings schema of an add-on directory.
pub fn save(addon_dir: &Path, settings: &[Setting]) -> Result<(), AddonError> {
    let file = SettingsFile {
        settings: settings.to_vec(),
    };
    let content = toml::to_string_pretty(&file).map_err(|e| {
        AddonError::validation(
            &addon_name(addon_dir),
            format!("cannot encode {}: {}", SETTINGS_FILE, e),
        )
    })?;
    fs::write(addon_dir.join(SETTINGS_FILE), content)?;
    Ok(())
}

/// Collects every value in the schema, children included.
#[must_use]
pub fn values(settings: &[Setting]) -> SettingValues {
    let mut out = SettingValues::new();
    collect_values(settings, &mut out);
    out
}

fn collect_values(settings: &[Setting], out: &mut SettingValues) {
    for setting in settings {
        if let Some(value) = &setting.value {
            out.insert(setting.name.clone(), value.clone());
        }
        collect_values(&setting.children, out);
    }
}

/// Finds the value of a setting by name, searching children depth-first.
#[must_use]
pub fn value_of<'a>(settings: &'a [Setting], name: &str) -> Option<&'a toml::Value> {
    settings.iter().find_map(|setting| {
        if setting.name == name {
            setting.value.as_ref()
        } else {
            value_of(&setting.children, name)
        }
    })
}

/// Writes known values into a schema. Returns how many settings changed.
///
/// Names the schema does not declare are ignored.
pub fn apply(settings: &mut [Setting], values: &SettingValues) -> usize {
    let mut changed = 0;
    for setting in settings.iter_mut() {
        if let Some(value) = values.get(&setting.name) {
            if setting.value.as_ref() != Some(value) {
                setting.value = Some(value.clone());
                changed += 1;
            }
        }
        changed += apply(&mut setting.children, values);
    }
    changed
}

/// Reads the current values of an add-on, for carrying across an upgrade.
pub fn preserve(addon_dir: &Path) -> Result<SettingValues, AddonError> {
    Ok(values(&load(addon_dir)?))
}

/// Applies preserved values to the add-on's (possibly new) schema.
pub fn restore(addon_dir: &Path, preserved: &SettingValues) -> Result<(), AddonError> {
    if preserved.is_empty() || !addon_dir.join(SETTINGS_FILE).exists() {
        return Ok(());
    }

    let mut settings = load(addon_dir)?;
    if apply(&mut settings, preserved) > 0 {
        save(addon_dir, &settings)?;
    }
    Ok(())
}

fn addon_name(addon_dir: &Path) -> String {
    addon_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"
[[setting]]
name = "api_key"
title = "API key"
type = "string"
value = "secret"

[[setting]]
name = "mail"
type = "group"

[[setting.children]]
name = "mail_from"
value = "noreply@example.com"

[[setting.children]]
name = "retries"
value = 3
"#;

    fn write_schema(dir: &Path, content: &str) {
        fs::write(dir.join(SETTINGS_FILE), content).unwrap();
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_load_nested_schema() {
        let dir = TempDir::new().unwrap();
        write_schema(dir.path(), SCHEMA);

        let settings = load(dir.path()).unwrap();
        assert_eq!(settings.len(), 2);
        assert_eq!(settings[0].kind, "string");
        assert_eq!(settings[1].children.len(), 2);
        assert_eq!(
            value_of(&settings, "retries"),
            Some(&toml::Value::Integer(3))
        );
        assert!(value_of(&settings, "mail").is_none());
    }

    #[test]
    fn test_values_flatten_children() {
        let dir = TempDir::new().unwrap();
        write_schema(dir.path(), SCHEMA);
        let flat = values(&load(dir.path()).unwrap());
        let keys: Vec<&str> = flat.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["api_key", "mail_from", "retries"]);
    }

    #[test]
    fn test_preserve_and_restore() {
        let dir = TempDir::new().unwrap();
        write_schema(dir.path(), SCHEMA);
        let preserved = preserve(dir.path()).unwrap();

        // New schema ships defaults and one new setting
        write_schema(
            dir.path(),
            r#"
[[setting]]
name = "api_key"
value = ""

[[setting]]
name = "timeout"
value = 30
"#,
        );
        restore(dir.path(), &preserved).unwrap();

        let settings = load(dir.path()).unwrap();
        assert_eq!(
            value_of(&settings, "api_key"),
            Some(&toml::Value::String("secret".to_string()))
        );
        assert_eq!(value_of(&settings, "timeout"), Some(&toml::Value::Integer(30)));
        assert!(value_of(&settings, "mail_from").is_none());
    }

    #[test]
    fn test_invalid_schema() {
        let dir = TempDir::new().unwrap();
        write_schema(dir.path(), "[[setting]]\ntitle = \"no name\"\n");
        assert!(matches!(
            load(dir.path()),
            Err(AddonError::Validation { .. })
        ));
    }
}
