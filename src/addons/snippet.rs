//! Hook snippet blocks in shared hook files.
//!
//! An add-on can contribute a piece of code to a host hook file under
//! `app/common/hook/`. The block is fenced by `#<name>#` marker lines, so
//! enabling again replaces it in place and disabling strips it.
//!
//! ```text
//! #demo#
//! register_demo_hooks();
//! #demo#
//! ```

use std::fs;
use std::io;
use std::path::Path;

use regex::{NoExpand, Regex};
use tracing::debug;

use super::error::AddonError;

/// Hook file used when a snippet names none.
pub const DEFAULT_HOOK_FILE: &str = "index";

/// Code an add-on contributes to a shared hook file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSnippet {
    /// Block body, without markers.
    pub text: String,
    /// Hook file stem under `app/common/hook/`.
    pub file: String,
}

impl HookSnippet {
    /// Snippet for the default hook file.
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            file: DEFAULT_HOOK_FILE.to_string(),
        }
    }

    /// Targets another hook file.
    #[must_use]
    pub fn in_file(mut self, file: &str) -> Self {
        self.file = file.to_string();
        self
    }
}

fn block_pattern(name: &str) -> Result<Regex, AddonError> {
    let marker = regex::escape(&format!("#{}#", name));
    Regex::new(&format!(r"{0}[\s\S]*?{0}\n?", marker))
        .map_err(|e| AddonError::validation(name, format!("bad snippet marker: {}", e)))
}

fn render_block(name: &str, text: &str) -> String {
    format!("#{0}#\n{1}\n#{0}#\n", name, text.trim())
}

/// Inserts or replaces the block of `name` in `content`.
///
/// Blank `text` removes the block.
pub fn insert_block(content: &str, name: &str, text: &str) -> Result<String, AddonError> {
    if text.trim().is_empty() {
        return remove_block(content, name);
    }

    let pattern = block_pattern(name)?;
    let block = render_block(name, text);
    if pattern.is_match(content) {
        return Ok(pattern.replace(content, NoExpand(&block)).into_owned());
    }

    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&block);
    Ok(out)
}

/// Strips every block of `name` from `content`.
pub fn remove_block(content: &str, name: &str) -> Result<String, AddonError> {
    Ok(block_pattern(name)?.replace_all(content, "").into_owned())
}

fn read_or_empty(path: &Path) -> Result<String, AddonError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

/// Writes the block of `name` into the hook file at `path`.
///
/// Returns true if the file changed.
pub fn write_snippet(path: &Path, name: &str, text: &str) -> Result<bool, AddonError> {
    let current = read_or_empty(path)?;
    let updated = insert_block(&current, name, text)?;
    if updated == current {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, updated)?;
    debug!("[ADDON-SNIPPET] Wrote block of {} into {}", name, path.display());
    Ok(true)
}

/// Strips the block of `name` from the hook file at `path`.
///
/// A missing file is left missing. Returns true if the file changed.
pub fn remove_snippet(path: &Path, name: &str) -> Result<bool, AddonError> {
    if !path.is_file() {
        return Ok(false);
    }
    let current = fs::read_to_string(path)?;
    let updated = remove_block(&current, name)?;
    if updated == current {
        return Ok(false);
    }

    fs::write(path, updated)?;
    debug!("[ADDON-SNIPPET] Removed block of {} from {}", name, path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const HEADER: &str = "<?php\n// host hooks\n";

    #[test]
    fn test_insert_appends_block() {
        let out = insert_block(HEADER, "demo", "  demo_boot();  ").unwrap();
        assert_eq!(out, "<?php\n// host hooks\n#demo#\ndemo_boot();\n#demo#\n");

        // Content without a trailing newline gets one before the block
        let out = insert_block("<?php", "demo", "x();").unwrap();
        assert_eq!(out, "<?php\n#demo#\nx();\n#demo#\n");
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let first = insert_block(HEADER, "demo", "old();").unwrap();
        let with_other = insert_block(&first, "shop", "shop();").unwrap();

        let out = insert_block(&with_other, "demo", "new($x);").unwrap();
        assert_eq!(
            out,
            "<?php\n// host hooks\n#demo#\nnew($x);\n#demo#\n#shop#\nshop();\n#shop#\n"
        );
    }

    #[test]
    fn test_remove_leaves_other_blocks() {
        let content = insert_block(HEADER, "demo", "a();").unwrap();
        let content = insert_block(&content, "shop", "b();").unwrap();

        let out = remove_block(&content, "demo").unwrap();
        assert_eq!(out, "<?php\n// host hooks\n#shop#\nb();\n#shop#\n");
        assert_eq!(remove_block(&out, "demo").unwrap(), out);
    }

    #[test]
    fn test_blank_text_removes() {
        let content = insert_block(HEADER, "demo", "a();").unwrap();
        assert_eq!(insert_block(&content, "demo", "  \n").unwrap(), HEADER);
    }

    #[test]
    fn test_marker_names_are_literal() {
        let content = "#a.b#\nkeep();\n#a.b#\n";
        assert_eq!(remove_block(content, "axb").unwrap(), content);
        assert_eq!(remove_block(content, "a.b").unwrap(), "");
    }

    #[test]
    fn test_write_and_remove_snippet_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app/common/hook/index.php");

        assert!(write_snippet(&path, "demo", "demo_boot();").unwrap());
        assert!(!write_snippet(&path, "demo", "demo_boot();").unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "#demo#\ndemo_boot();\n#demo#\n"
        );

        assert!(remove_snippet(&path, "demo").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert!(!remove_snippet(&dir.path().join("missing.php"), "demo").unwrap());
    }
}
