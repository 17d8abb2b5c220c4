//! Bootstrap SQL importer.
//!
//! Add-ons ship `install.sql` and `update.sql` scripts. Scripts are split
//! line by line: comment lines (`--`, `/*`) and blank lines are skipped, and a
//! statement ends on a line whose trimmed text ends with `;`. Semicolons
//! inside string literals are not understood.
//!
//! Every statement gets `__PREFIX__` replaced with the table prefix and
//! `INSERT INTO` turned into `INSERT IGNORE INTO`, both case-insensitively,
//! then runs on its own. A failing statement is logged and counted; the rest
//! of the batch still runs.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::Path;
use std::rc::Rc;

use regex::RegexBuilder;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::error::AddonError;

/// Script run on install.
pub const INSTALL_SQL: &str = "install.sql";

/// Script run on upgrade.
pub const UPDATE_SQL: &str = "update.sql";

/// Optional sample data. Reported on install, never imported automatically.
pub const TESTDATA_SQL: &str = "testdata.sql";

/// Table prefix placeholder.
const PREFIX_PLACEHOLDER: &str = "__PREFIX__";

/// Errors from SQL execution.
#[derive(Debug, Error)]
pub enum SqlError {
    /// The database rejected a statement.
    #[error("Statement failed: {0}")]
    Statement(String),

    /// Table pattern failed to compile.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<SqlError> for AddonError {
    fn from(err: SqlError) -> Self {
        match err {
            SqlError::Io(e) => Self::Io(e),
            other => Self::Io(io::Error::other(other)),
        }
    }
}

/// Runs raw SQL statements against the host database.
pub trait SqlExecutor {
    /// Executes one statement.
    fn execute(&mut self, statement: &str) -> Result<(), SqlError>;
}

impl<E: SqlExecutor> SqlExecutor for Rc<RefCell<E>> {
    fn execute(&mut self, statement: &str) -> Result<(), SqlError> {
        self.borrow_mut().execute(statement)
    }
}

/// Executor that records statements instead of running them.
///
/// Statements containing any of the configured fragments fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    /// Statements in execution order, failures included.
    pub statements: Vec<String>,
    fail_on: Vec<String>,
}

impl RecordingExecutor {
    /// Creates an executor that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes statements containing `fragment` fail.
    #[must_use]
    pub fn failing_on(mut self, fragment: &str) -> Self {
        self.fail_on.push(fragment.to_string());
        self
    }
}

impl SqlExecutor for RecordingExecutor {
    fn execute(&mut self, statement: &str) -> Result<(), SqlError> {
        self.statements.push(statement.to_string());
        match self.fail_on.iter().find(|f| statement.contains(f.as_str())) {
            Some(fragment) => Err(SqlError::Statement(format!("rejected '{}'", fragment))),
            None => Ok(()),
        }
    }
}

/// Outcome of importing one script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Statements that ran successfully.
    pub executed: usize,
    /// Statements the executor rejected.
    pub failed: usize,
    /// Error messages of failed statements, in order.
    pub errors: Vec<String>,
}

/// Splits a script into statements.
///
/// A trailing statement without a terminating `;` is dropped.
#[must_use]
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in script.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") || trimmed.starts_with("/*") {
            continue;
        }

        current.push(line);
        if trimmed.ends_with(';') {
            statements.push(current.join("\n").trim().to_string());
            current.clear();
        }
    }

    if !current.is_empty() {
        debug!("[ADDON-SQL] Dropping unterminated trailing statement");
    }

    statements
}

/// Applies prefix substitution and insert rewriting to a statement.
#[must_use]
pub fn rewrite(statement: &str, prefix: &str) -> String {
    let replaced = replace_ignore_case(statement, PREFIX_PLACEHOLDER, prefix);
    replace_ignore_case(&replaced, "INSERT INTO ", "INSERT IGNORE INTO ")
}

/// ASCII case-insensitive replace of every occurrence of `needle`.
fn replace_ignore_case(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }

    let lower_haystack = haystack.to_ascii_lowercase();
    let lower_needle = needle.to_ascii_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;

    for (idx, _) in lower_haystack.match_indices(&lower_needle) {
        out.push_str(&haystack[last..idx]);
        out.push_str(replacement);
        last = idx + needle.len();
    }
    out.push_str(&haystack[last..]);
    out
}

/// Imports a script file. A missing file is a no-op.
pub fn import(path: &Path, prefix: &str, executor: &mut dyn SqlExecutor) -> Result<ImportReport, SqlError> {
    if !path.is_file() {
        debug!("[ADDON-SQL] No script at {}", path.display());
        return Ok(ImportReport::default());
    }

    let script = fs::read_to_string(path)?;
    let mut report = ImportReport::default();

    for statement in split_statements(&script) {
        let statement = rewrite(&statement, prefix);
        match executor.execute(&statement) {
            Ok(()) => report.executed += 1,
            Err(e) => {
                warn!("[ADDON-SQL] Statement failed in {}: {}", path.display(), e);
                report.failed += 1;
                report.errors.push(e.to_string());
            }
        }
    }

    info!(
        "[ADDON-SQL] Imported {}: {} executed, {} failed",
        path.display(),
        report.executed,
        report.failed
    );
    Ok(report)
}

/// Table names created by a script, with the prefix substituted.
///
/// A missing file yields no tables.
pub fn created_tables(path: &Path, prefix: &str) -> Result<Vec<String>, SqlError> {
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let script = fs::read_to_string(path)?;
    let pattern = RegexBuilder::new(r"^\s*CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?`?([a-zA-Z_]+)`?")
        .case_insensitive(true)
        .multi_line(true)
        .build()?;

    Ok(pattern
        .captures_iter(&script)
        .filter_map(|caps| caps.get(2))
        .map(|m| m.as_str().replace(PREFIX_PLACEHOLDER, prefix))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SCRIPT: &str = "\
-- demo schema
/* generated */
CREATE TABLE IF NOT EXISTS `__PREFIX__demo` (
  `id` int NOT NULL
) ENGINE=InnoDB;

insert into `__prefix__demo` VALUES (1);
INSERT INTO `__PREFIX__demo` VALUES (2);
";

    #[test]
    fn test_split_statements() {
        let statements = split_statements(SCRIPT);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE TABLE"));
        assert!(statements[0].ends_with("ENGINE=InnoDB;"));
        assert!(statements[0].contains('\n'));
    }

    #[test]
    fn test_split_drops_unterminated_tail() {
        assert_eq!(split_statements("SELECT 1;\nSELECT 2"), vec!["SELECT 1;"]);
        assert!(split_statements("").is_empty());
        assert!(split_statements("-- only a comment\n\n").is_empty());
    }

    #[test]
    fn test_split_skips_indented_comments() {
        let statements = split_statements("  -- note\nSELECT 1;\n   /* x */\n");
        assert_eq!(statements, vec!["SELECT 1;"]);
    }

    #[test]
    fn test_rewrite_is_case_insensitive() {
        assert_eq!(
            rewrite("insert into __prefix__demo VALUES (1);", "app_"),
            "INSERT IGNORE INTO app_demo VALUES (1);"
        );
        assert_eq!(
            rewrite("CREATE TABLE __PREFIX__demo (id int);", "app_"),
            "CREATE TABLE app_demo (id int);"
        );
        assert_eq!(rewrite("SELECT 'ü' FROM x;", ""), "SELECT 'ü' FROM x;");
    }

    #[test]
    fn test_import_swallows_failures() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INSTALL_SQL);
        fs::write(&path, SCRIPT).unwrap();

        let mut executor = RecordingExecutor::new().failing_on("VALUES (1)");
        let report = import(&path, "app_", &mut executor).unwrap();

        assert_eq!(report.executed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(executor.statements.len(), 3);
        assert!(executor.statements[0].contains("`app_demo`"));
        assert_eq!(
            executor.statements[2],
            "INSERT IGNORE INTO `app_demo` VALUES (2);"
        );
    }

    #[test]
    fn test_import_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut executor = RecordingExecutor::new();
        let report = import(&dir.path().join(INSTALL_SQL), "", &mut executor).unwrap();
        assert_eq!(report, ImportReport::default());
        assert!(executor.statements.is_empty());
    }

    #[test]
    fn test_created_tables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INSTALL_SQL);
        fs::write(
            &path,
            "CREATE TABLE `__PREFIX__orders` (id int);\ncreate table if not exists __PREFIX__items (id int);\n",
        )
        .unwrap();

        assert_eq!(
            created_tables(&path, "app_").unwrap(),
            vec!["app_orders", "app_items"]
        );
        assert!(created_tables(&dir.path().join("none.sql"), "").unwrap().is_empty());
    }
}
