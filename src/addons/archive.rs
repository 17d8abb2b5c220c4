//! Package archive codec.
//!
//! Packages are zip files. Gzip-compressed tarballs are accepted on
//! extraction as well; the format is picked from the leading magic bytes.
//! Backups are always written as zip.

use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use super::error::AddonError;
use super::info::INFO_FILE;
use super::store::{normalize_relative, to_slash};

const ZIP_MAGIC: &[u8] = b"PK";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// Extracts and creates package archives.
pub trait ArchiveCodec {
    /// Extracts `bytes` into `dest`, creating it. Returns the number of files written.
    fn extract(&self, bytes: &[u8], dest: &Path) -> Result<usize, AddonError>;

    /// Packs every file under `source_dir`.
    fn create(&self, source_dir: &Path) -> Result<Vec<u8>, AddonError>;

    /// Packs the listed `/`-separated paths relative to `root`. Missing files are skipped.
    fn create_from_files(&self, root: &Path, paths: &[String]) -> Result<Vec<u8>, AddonError>;
}

/// Zip codec with tar.gz extraction fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCodec;

impl ArchiveCodec for ZipCodec {
    fn extract(&self, bytes: &[u8], dest: &Path) -> Result<usize, AddonError> {
        if bytes.starts_with(GZIP_MAGIC) {
            extract_tar_gz(bytes, dest)
        } else if bytes.starts_with(ZIP_MAGIC) {
            extract_zip(bytes, dest)
        } else {
            Err(AddonError::Package(
                "Unrecognized package format (expected zip or tar.gz)".to_string(),
            ))
        }
    }

    fn create(&self, source_dir: &Path) -> Result<Vec<u8>, AddonError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(source_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| AddonError::Io(io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(source_dir) {
                files.push(to_slash(relative));
            }
        }
        self.create_from_files(source_dir, &files)
    }

    fn create_from_files(&self, root: &Path, paths: &[String]) -> Result<Vec<u8>, AddonError> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for path in paths {
            let Some(relative) = normalize_relative(path) else {
                continue;
            };
            let source = relative
                .split('/')
                .fold(root.to_path_buf(), |acc, part| acc.join(part));
            if !source.is_file() {
                continue;
            }

            writer
                .start_file(relative.as_str(), options)
                .map_err(|e| zip_err("Failed to add archive entry", &e))?;
            let mut file = File::open(&source)?;
            io::copy(&mut file, &mut writer)?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| zip_err("Failed to finish archive", &e))?;
        Ok(cursor.into_inner())
    }
}

/// Reads a package file from disk and extracts it.
pub fn extract_file(codec: &dyn ArchiveCodec, package: &Path, dest: &Path) -> Result<usize, AddonError> {
    let bytes = fs::read(package).map_err(|e| {
        AddonError::Package(format!("Failed to read package {}: {}", package.display(), e))
    })?;
    codec.extract(&bytes, dest)
}

fn zip_err(context: &str, e: &zip::result::ZipError) -> AddonError {
    AddonError::Package(format!("{}: {}", context, e))
}

/// Finds a single wrapping directory to strip.
///
/// Only strips when every entry lives under the same top-level directory and
/// that directory holds the metadata file, so packages rooted at their overlay
/// directories are left alone.
fn wrapping_prefix<'a>(names: impl Iterator<Item = &'a str> + Clone) -> Option<String> {
    let mut prefix: Option<&str> = None;
    for name in names.clone() {
        let (first, _) = name.split_once('/')?;
        match prefix {
            None => prefix = Some(first),
            Some(p) if p == first => {}
            Some(_) => return None,
        }
    }

    let prefix = prefix?;
    let info_path = format!("{}/{}", prefix, INFO_FILE);
    names
        .into_iter()
        .any(|n| n == info_path)
        .then(|| prefix.to_string())
}

/// Validates an entry path and returns where it lands under `dest`.
fn safe_target(dest: &Path, name: &str, prefix: Option<&str>) -> Result<Option<PathBuf>, AddonError> {
    let name = name.replace('\\', "/");
    let relative = match prefix {
        Some(p) => name
            .strip_prefix(p)
            .map(|rest| rest.trim_start_matches('/').to_string())
            .unwrap_or(name),
        None => name,
    };

    if relative.trim_matches('/').is_empty() {
        return Ok(None);
    }

    let path = Path::new(&relative);
    let mut target = dest.to_path_buf();
    for component in path.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            _ => {
                return Err(AddonError::Package(format!(
                    "Package entry escapes the add-on directory: {}",
                    relative
                )));
            }
        }
    }
    Ok(Some(target))
}

fn extract_zip(bytes: &[u8], dest: &Path) -> Result<usize, AddonError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| zip_err("Failed to open archive", &e))?;

    fs::create_dir_all(dest).map_err(|e| write_err(dest, &e))?;

    let names: Vec<String> = archive.file_names().map(String::from).collect();
    let prefix = wrapping_prefix(names.iter().map(String::as_str));

    let mut written = 0;
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| zip_err("Failed to read archive entry", &e))?;

        let Some(outpath) = safe_target(dest, file.name(), prefix.as_deref())? else {
            continue;
        };

        if file.is_dir() {
            fs::create_dir_all(&outpath).map_err(|e| write_err(&outpath, &e))?;
            continue;
        }

        write_entry(&mut file, &outpath)?;
        written += 1;
    }

    Ok(written)
}

fn extract_tar_gz(bytes: &[u8], dest: &Path) -> Result<usize, AddonError> {
    let mut decompressed = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut decompressed)
        .map_err(|e| AddonError::Package(format!("Failed to decompress package: {}", e)))?;

    // First pass collects names so a wrapping directory can be detected
    let mut names = Vec::new();
    let mut listing = tar::Archive::new(decompressed.as_slice());
    for entry in listing
        .entries()
        .map_err(|e| AddonError::Package(format!("Invalid tar archive: {}", e)))?
    {
        let entry =
            entry.map_err(|e| AddonError::Package(format!("Failed to read tar entry: {}", e)))?;
        if entry.header().entry_type().is_file() {
            let path = entry
                .path()
                .map_err(|e| AddonError::Package(format!("Invalid path in archive: {}", e)))?;
            names.push(to_tar_name(&path));
        }
    }
    let prefix = wrapping_prefix(names.iter().map(String::as_str));

    fs::create_dir_all(dest).map_err(|e| write_err(dest, &e))?;

    let mut written = 0;
    let mut archive = tar::Archive::new(decompressed.as_slice());
    for entry in archive
        .entries()
        .map_err(|e| AddonError::Package(format!("Invalid tar archive: {}", e)))?
    {
        let mut entry =
            entry.map_err(|e| AddonError::Package(format!("Failed to read tar entry: {}", e)))?;
        let kind = entry.header().entry_type();
        let name = entry
            .path()
            .map(|p| to_tar_name(&p))
            .map_err(|e| AddonError::Package(format!("Invalid path in archive: {}", e)))?;

        let Some(outpath) = safe_target(dest, &name, prefix.as_deref())? else {
            continue;
        };

        if kind.is_dir() {
            fs::create_dir_all(&outpath).map_err(|e| write_err(&outpath, &e))?;
        } else if kind.is_file() {
            write_entry(&mut entry, &outpath)?;
            written += 1;
        }
        // Links and special entries are skipped
    }

    Ok(written)
}

/// Writes one archive entry to disk. Failures count as a broken package.
fn write_entry(reader: &mut impl Read, outpath: &Path) -> Result<(), AddonError> {
    if let Some(parent) = outpath.parent() {
        fs::create_dir_all(parent).map_err(|e| write_err(parent, &e))?;
    }
    let mut outfile = File::create(outpath).map_err(|e| write_err(outpath, &e))?;
    io::copy(reader, &mut outfile).map_err(|e| write_err(outpath, &e))?;
    outfile.flush().map_err(|e| write_err(outpath, &e))
}

fn write_err(path: &Path, e: &io::Error) -> AddonError {
    AddonError::Package(format!("Failed to extract to {}: {}", path.display(), e))
}

fn to_tar_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
