//! Shared fixtures for the integration tests.
//!
//! Builds throwaway host trees and add-on packages in temporary directories.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use addonhost::config::Config;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// A host tree plus a separate directory for package files.
pub struct Host {
    pub root: TempDir,
    pub packages: TempDir,
    pub config: Config,
}

impl Host {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let packages = TempDir::new().unwrap();
        let config = Config::for_root(root.path());
        Self {
            root,
            packages,
            config,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    pub fn addon_dir(&self, name: &str) -> PathBuf {
        self.config.addons_path.join(name)
    }

    /// Writes a zip package into the package directory.
    pub fn package(&self, file_name: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = self.packages.path().join(file_name);
        fs::write(&path, build_zip(files)).unwrap();
        path
    }

    /// Writes an add-on straight into the add-on root, bypassing install.
    pub fn place_addon(&self, name: &str, files: &[(&str, &str)]) {
        let dir = self.addon_dir(name);
        write(&dir.join("info.ini"), &info_ini(name, "1.0.0", ""));
        for (path, content) in files {
            write(&dir.join(path), content);
        }
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }

    /// Zip files in the backup directory, sorted.
    pub fn backups(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.config.backup_path) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(".zip"))
            .collect();
        names.sort();
        names
    }
}

/// Metadata file content with every required key.
pub fn info_ini(name: &str, version: &str, extra: &str) -> String {
    format!(
        "name = {}\ntitle = {} add-on\nintro = Test add-on\nauthor = tests\nversion = {}\nstatus = 0\n{}",
        name, name, version, extra
    )
}

pub fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (path, content) in files {
        writer.start_file(*path, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
