//! Package fetchers.
//!
//! A fetcher turns an add-on name plus credentials into package bytes.
//! [`HttpFetcher`] talks to a package server; [`LocalFetcher`] reads packages
//! from a directory and is what the tests use.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::error::AddonError;

/// Request timeout for package downloads.
const DOWNLOAD_TIMEOUT_SECS: u64 = 60;

/// Credentials and extra form fields sent with a download request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    fields: Vec<(String, String)>,
}

impl Credentials {
    /// Creates empty credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, replacing an existing one with the same key.
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.fields.retain(|(k, _)| k != key);
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All fields in insertion order.
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

/// Source of add-on packages.
pub trait PackageFetcher {
    /// Fetches the package of `name`.
    fn fetch(&self, name: &str, credentials: &Credentials) -> Result<Vec<u8>, AddonError>;
}

/// Downloads packages from a package server with a form POST.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpFetcher {
    /// Creates a fetcher for a download endpoint.
    #[must_use]
    pub fn new(url: &str) -> Self {
        assert!(!url.is_empty(), "Package URL must not be empty");

        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("addonhost/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            client,
            url: url.to_string(),
        }
    }
}

impl PackageFetcher for HttpFetcher {
    fn fetch(&self, name: &str, credentials: &Credentials) -> Result<Vec<u8>, AddonError> {
        let mut form: Vec<(&str, &str)> = vec![("name", name)];
        form.extend(credentials.fields().iter().map(|(k, v)| (k.as_str(), v.as_str())));

        debug!("[ADDON-FETCH] POST {} for {}", self.url, name);
        let start = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .form(&form)
            .send()
            .map_err(|e| {
                warn!("[ADDON-FETCH] HTTP request failed: {}", e);
                AddonError::Package(format!("Addon package download failed: {}", e))
            })?;

        let status = response.status();
        debug!("[ADDON-FETCH] Response: {} in {:?}", status, start.elapsed());

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AddonError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            return Err(AddonError::Package(format!(
                "Package server error: {}",
                status
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| AddonError::Package(format!("Failed to read package body: {}", e)))?
            .to_vec();

        if let Some(message) = server_error(&bytes) {
            warn!("[ADDON-FETCH] Server refused {}: {}", name, message);
            return Err(AddonError::Package(message));
        }

        info!("[ADDON-FETCH] Downloaded {} ({} bytes)", name, bytes.len());
        Ok(bytes)
    }
}

/// Detects a JSON error body returned in place of a package.
fn server_error(body: &[u8]) -> Option<String> {
    if body.first() != Some(&b'{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get("code")?;

    let message = value
        .get("message")
        .or_else(|| value.get("msg"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("Error");
    Some(message.to_string())
}

/// Reads packages named `<name>.zip` from a directory.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    dir: PathBuf,
}

impl LocalFetcher {
    /// Creates a fetcher over a package directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PackageFetcher for LocalFetcher {
    fn fetch(&self, name: &str, _credentials: &Credentials) -> Result<Vec<u8>, AddonError> {
        let path = self.dir.join(format!("{}.zip", name));
        if !path.is_file() {
            return Err(AddonError::NotFound(name.to_string()));
        }
        debug!("[ADDON-FETCH] Reading {}", path.display());
        Ok(fs::read(path)?)
    }
}
