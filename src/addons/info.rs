//! Add-on metadata persistence.
//!
//! Reads and writes the `info.ini` file that sits at the root of every
//! add-on directory. The format is a flat list of `key = value` lines with
//! optional `[section]` tables; unknown keys survive a rewrite.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use super::error::AddonError;
use super::types::{AddonInfo, REQUIRED_INFO_KEYS, parse_flag, split_list};

/// Metadata file name inside an add-on directory.
pub const INFO_FILE: &str = "info.ini";

/// Maximum number of lines read from a metadata file.
const MAX_LINES: usize = 1000;

/// Parsed but uninterpreted metadata file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawInfo {
    /// Top-level entries in file order.
    pub entries: Vec<(String, String)>,
    /// Section tables in file order.
    pub sections: Vec<(String, Vec<(String, String)>)>,
}

impl RawInfo {
    /// Returns the value of a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the required keys that are absent.
    #[must_use]
    pub fn missing_keys(&self) -> Vec<&'static str> {
        REQUIRED_INFO_KEYS
            .iter()
            .copied()
            .filter(|key| self.get(key).is_none())
            .collect()
    }
}

/// Parses metadata content.
#[must_use]
pub fn parse(content: &str) -> RawInfo {
    let mut raw = RawInfo::default();
    let mut current_section: Option<usize> = None;

    for line in content.lines().take(MAX_LINES) {
        let line = line.trim();

        // Skip comments and empty lines
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim().to_string();
            raw.sections.push((name, Vec::new()));
            current_section = Some(raw.sections.len() - 1);
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let entry = (key.to_string(), unquote(value.trim()).to_string());

            match current_section {
                Some(idx) => raw.sections[idx].1.push(entry),
                None => {
                    // Later duplicates win, like any INI reader
                    raw.entries.retain(|(k, _)| k != key);
                    raw.entries.push(entry);
                }
            }
        }
    }

    raw
}

/// Renders metadata back to file content.
#[must_use]
pub fn render(raw: &RawInfo) -> String {
    let mut out = String::new();
    for (key, value) in &raw.entries {
        out.push_str(&format!("{} = {}\n", key, value));
    }
    for (name, entries) in &raw.sections {
        out.push_str(&format!("[{}]\n", name));
        for (key, value) in entries {
            out.push_str(&format!("{} = {}\n", key, value));
        }
    }
    out
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

impl AddonInfo {
    /// Builds typed metadata from a parsed file.
    ///
    /// Returns `None` when the file carries no `name`.
    #[must_use]
    pub fn from_raw(raw: &RawInfo) -> Option<Self> {
        let name = raw.get("name").filter(|n| !n.is_empty())?;
        let mut info = Self {
            name: name.to_string(),
            sections: raw.sections.clone(),
            ..Self::default()
        };

        for (key, value) in &raw.entries {
            match key.as_str() {
                "name" => {}
                "title" => info.title = value.clone(),
                "intro" => info.intro = value.clone(),
                "author" => info.author = value.clone(),
                "version" => info.version = value.clone(),
                "status" => info.enabled = parse_flag(value),
                "has_menu" | "has_menulist" => {
                    info.has_menu = parse_flag(value);
                    info.menu_key = Some(key.clone());
                }
                "pre_requisites" => info.pre_requisites = split_list(value),
                _ => info.extra.push((key.clone(), value.clone())),
            }
        }

        Some(info)
    }

    /// Converts typed metadata back into file entries.
    #[must_use]
    pub fn to_raw(&self) -> RawInfo {
        let mut entries = vec![
            ("name".to_string(), self.name.clone()),
            ("title".to_string(), self.title.clone()),
            ("intro".to_string(), self.intro.clone()),
            ("author".to_string(), self.author.clone()),
            ("version".to_string(), self.version.clone()),
            (
                "status".to_string(),
                if self.enabled { "1" } else { "0" }.to_string(),
            ),
        ];
        if self.has_menu || self.menu_key.is_some() {
            let key = self.menu_key.as_deref().unwrap_or("has_menu");
            entries.push((
                key.to_string(),
                if self.has_menu { "1" } else { "0" }.to_string(),
            ));
        }
        if !self.pre_requisites.is_empty() {
            entries.push(("pre_requisites".to_string(), self.pre_requisites.join(",")));
        }
        entries.extend(self.extra.iter().cloned());

        RawInfo {
            entries,
            sections: self.sections.clone(),
        }
    }
}

/// Reads the raw metadata file of an add-on directory.
pub fn read_raw(addon_dir: &Path) -> Result<RawInfo, AddonError> {
    let content = fs::read_to_string(addon_dir.join(INFO_FILE))?;
    Ok(parse(&content))
}

/// Reads the typed metadata of an add-on directory.
pub fn read_info(addon_dir: &Path) -> Result<AddonInfo, AddonError> {
    let raw = read_raw(addon_dir)?;
    AddonInfo::from_raw(&raw).ok_or_else(|| {
        let name = addon_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        AddonError::validation(&name, "metadata has no name")
    })
}

/// Writes the typed metadata of an add-on directory.
///
/// Refuses to write metadata without name, title and version.
pub fn write_info(addon_dir: &Path, info: &AddonInfo) -> Result<(), AddonError> {
    if info.name.is_empty() || info.title.is_empty() || info.version.is_empty() {
        return Err(AddonError::validation(
            &info.name,
            "name, title and version are required to write metadata",
        ));
    }

    let path = addon_dir.join(INFO_FILE);
    let mut file = fs::File::create(&path)?;
    file.write_all(render(&info.to_raw()).as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Returns true if the directory carries a metadata file.
#[must_use]
pub fn has_info(addon_dir: &Path) -> bool {
    addon_dir.join(INFO_FILE).is_file()
}

/// Reads the metadata if present, mapping a missing file to `None`.
pub fn try_read_info(addon_dir: &Path) -> Result<Option<AddonInfo>, AddonError> {
    match read_info(addon_dir) {
        Ok(info) => Ok(Some(info)),
        Err(AddonError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
; demo add-on
name = demo
title = \"Demo Addon\"
intro = Shows things
author = someone
version = 1.0.0
status = 0
has_menulist = 1
pre_requisites = base, payments
url = https://example.com/#docs
[extra]
color = red
";

    #[test]
    fn test_parse_sample() {
        let raw = parse(SAMPLE);
        assert_eq!(raw.get("title"), Some("Demo Addon"));
        assert_eq!(raw.get("url"), Some("https://example.com/#docs"));
        assert!(raw.missing_keys().is_empty());
        assert_eq!(raw.sections.len(), 1);
        assert_eq!(raw.sections[0].1, vec![("color".to_string(), "red".to_string())]);
    }

    #[test]
    fn test_missing_keys() {
        let raw = parse("name = demo\nversion = 1.0\n");
        assert_eq!(raw.missing_keys(), vec!["title", "intro", "author", "status"]);
    }

    #[test]
    fn test_typed_info() {
        let info = AddonInfo::from_raw(&parse(SAMPLE)).unwrap();
        assert_eq!(info.name, "demo");
        assert!(!info.enabled);
        assert!(info.has_menu);
        assert_eq!(info.pre_requisites, vec!["base", "payments"]);
        assert_eq!(info.extra_value("url"), Some("https://example.com/#docs"));
    }

    #[test]
    fn test_from_raw_requires_name() {
        assert!(AddonInfo::from_raw(&parse("title = x\n")).is_none());
        assert!(AddonInfo::from_raw(&parse("name =\n")).is_none());
    }

    #[test]
    fn test_write_preserves_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let mut info = AddonInfo::from_raw(&parse(SAMPLE)).unwrap();
        info.enabled = true;
        write_info(dir.path(), &info).unwrap();

        let reread = read_info(dir.path()).unwrap();
        assert!(reread.enabled);
        assert_eq!(reread.extra_value("url"), Some("https://example.com/#docs"));
        assert_eq!(reread.sections, info.sections);

        let content = fs::read_to_string(dir.path().join(INFO_FILE)).unwrap();
        assert!(content.contains("status = 1"));
        assert!(content.contains("[extra]"));
    }

    #[test]
    fn test_write_keeps_menu_key_spelling() {
        let dir = TempDir::new().unwrap();
        let info = AddonInfo::from_raw(&parse(SAMPLE)).unwrap();
        write_info(dir.path(), &info).unwrap();

        let content = fs::read_to_string(dir.path().join(INFO_FILE)).unwrap();
        assert!(content.contains("has_menulist = 1"));
        assert!(!content.contains("has_menu ="));

        // A cleared flag keeps its key too
        let mut cleared = read_info(dir.path()).unwrap();
        cleared.has_menu = false;
        write_info(dir.path(), &cleared).unwrap();
        let content = fs::read_to_string(dir.path().join(INFO_FILE)).unwrap();
        assert!(content.contains("has_menulist = 0"));

        let fresh = AddonInfo {
            has_menu: true,
            ..AddonInfo::new("demo", "Demo", "1.0")
        };
        assert_eq!(fresh.to_raw().get("has_menu"), Some("1"));
    }

    #[test]
    fn test_write_rejects_incomplete() {
        let dir = TempDir::new().unwrap();
        let info = AddonInfo::new("demo", "", "1.0");
        let err = write_info(dir.path(), &info).unwrap_err();
        assert!(matches!(err, AddonError::Validation { .. }));
    }

    #[test]
    fn test_try_read_missing() {
        let dir = TempDir::new().unwrap();
        assert!(try_read_info(dir.path()).unwrap().is_none());
        assert!(!has_info(dir.path()));
    }
}
