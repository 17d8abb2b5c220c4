//! Integration tests for the bootstrap SQL importer.
//!
//! These tests verify script splitting, statement rewriting and batch import
//! against a recording executor.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;

use addonhost::addons::sql::{self, INSTALL_SQL, UPDATE_SQL, created_tables, rewrite, split_statements};
use addonhost::addons::{AddonError, RecordingExecutor, SqlError, SqlExecutor};
use proptest::prelude::*;
use tempfile::TempDir;

const SHOP_SCHEMA: &str = "\
-- Shop add-on schema
/* Tables */
CREATE TABLE IF NOT EXISTS `__PREFIX__shop_order` (
  `id` int unsigned NOT NULL AUTO_INCREMENT,
  `total` decimal(10,2) NOT NULL,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB;

CREATE TABLE `__PREFIX__shop_item` (
  `id` int unsigned NOT NULL
);

INSERT INTO `__PREFIX__shop_order` (`total`) VALUES (10.00);
Insert Into `__prefix__shop_item` VALUES (1);
";

fn script(dir: &TempDir, file: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(file);
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Splitter Tests
// ============================================================================

mod splitter_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_multiline_statements() {
        let statements = split_statements(SHOP_SCHEMA);

        assert_eq!(statements.len(), 4);
        assert_eq!(statements[0].lines().count(), 5);
        assert!(statements[1].starts_with("CREATE TABLE `__PREFIX__shop_item`"));
        assert_eq!(
            statements[3],
            "Insert Into `__prefix__shop_item` VALUES (1);"
        );
    }

    #[test]
    fn test_windows_line_endings() {
        let statements = split_statements("SELECT 1;\r\n-- note\r\nSELECT\r\n  2;\r\n");
        assert_eq!(statements, vec!["SELECT 1;", "SELECT\n  2;"]);
    }

    #[test]
    fn test_comment_only_script() {
        assert!(split_statements("-- a\n/* b */\n\n   \n").is_empty());
    }
}

// ============================================================================
// Import Tests
// ============================================================================

mod import_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_import_rewrites_every_statement() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, INSTALL_SQL, SHOP_SCHEMA);
        let mut executor = RecordingExecutor::new();

        let report = sql::import(&path, "app_", &mut executor).unwrap();

        assert_eq!(report.executed, 4);
        assert_eq!(report.failed, 0);
        assert!(executor.statements[0].contains("`app_shop_order`"));
        assert_eq!(
            executor.statements[2],
            "INSERT IGNORE INTO `app_shop_order` (`total`) VALUES (10.00);"
        );
        assert_eq!(
            executor.statements[3],
            "INSERT IGNORE INTO `app_shop_item` VALUES (1);"
        );
        assert!(executor.statements.iter().all(|s| !s.to_ascii_uppercase().contains("__PREFIX__")));
    }

    #[test]
    fn test_failures_do_not_abort_batch() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, UPDATE_SQL, "ALTER TABLE a ADD x int;\nBROKEN;\nALTER TABLE b ADD y int;\n");
        let mut executor = RecordingExecutor::new().failing_on("BROKEN");

        let report = sql::import(&path, "", &mut executor).unwrap();

        assert_eq!(report.executed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(executor.statements.len(), 3);
    }

    #[test]
    fn test_custom_executor() {
        struct Counting(usize);

        impl SqlExecutor for Counting {
            fn execute(&mut self, statement: &str) -> Result<(), SqlError> {
                if statement.starts_with("DROP") {
                    return Err(SqlError::Statement("drops are not allowed".to_string()));
                }
                self.0 += 1;
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        let path = script(&dir, INSTALL_SQL, "DROP TABLE x;\nSELECT 1;\n");
        let mut executor = Counting(0);

        let report = sql::import(&path, "", &mut executor).unwrap();
        assert_eq!(executor.0, 1);
        assert_eq!(report.errors, vec!["Statement failed: drops are not allowed"]);
    }

    #[test]
    fn test_sql_error_converts_to_addon_error() {
        let err: AddonError = SqlError::Statement("boom".to_string()).into();
        assert!(matches!(err, AddonError::Io(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_created_tables() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, INSTALL_SQL, SHOP_SCHEMA);

        assert_eq!(
            created_tables(&path, "app_").unwrap(),
            vec!["app_shop_order", "app_shop_item"]
        );
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_split_joins_back(statements in prop::collection::vec("[A-Z]{1,6} [a-z0-9 ]{0,12}", 0..6)) {
        let script: String = statements.iter().map(|s| format!("{};\n-- sep\n\n", s)).collect();
        let split = split_statements(&script);

        prop_assert_eq!(split.len(), statements.len());
        for (got, want) in split.iter().zip(&statements) {
            prop_assert_eq!(got, &format!("{};", want));
        }
    }

    #[test]
    fn prop_rewrite_removes_placeholder(prefix in "[a-z]{0,6}_?", table in "[a-z]{1,8}") {
        let statement = format!("INSERT INTO __PREFIX__{} VALUES (1);", table);
        let rewritten = rewrite(&statement, &prefix);

        prop_assert_eq!(
            rewritten,
            format!("INSERT IGNORE INTO {}{} VALUES (1);", prefix, table)
        );
    }
}
