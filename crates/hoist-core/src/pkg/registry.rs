//! npm registry client and registry-backed metadata provider.

use super::error::PkgError;
use super::manifest::{Descriptor, Requested};
use super::provider::{resolve_directory, MetadataProvider};
use super::spec::{url_encoded_name, PackageSpec};
use super::version::max_satisfying;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment variable to override registry URL.
pub const REGISTRY_ENV: &str = "HOIST_REGISTRY";

/// Maximum concurrent packument fetches.
const MAX_CONCURRENT_FETCHES: usize = 32;

/// Cached packument data.
type PackumentCache = Arc<RwLock<HashMap<String, Arc<Value>>>>;

/// Registry client for fetching package metadata.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self, PkgError> {
        // `Url::join` drops the last path segment unless it ends in '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| PkgError::registry(format!("Invalid registry URL '{base_url}': {e}")))?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("hoist/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    /// Create a client using the registry URL from environment or default.
    ///
    /// # Errors
    /// Returns an error if the client cannot be created.
    pub fn from_env() -> Result<Self, PkgError> {
        let url = std::env::var(REGISTRY_ENV).unwrap_or_else(|_| DEFAULT_REGISTRY.to_string());
        Self::new(&url)
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the packument (package metadata) for a package.
    ///
    /// # Errors
    /// Returns an error if the request fails or the package is not found.
    pub async fn fetch_packument(&self, name: &str) -> Result<Value, PkgError> {
        let url = self
            .base_url
            .join(&url_encoded_name(name))
            .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))?;

        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PkgError::not_found(name));
        }

        if !response.status().is_success() {
            return Err(PkgError::registry(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        let json: Value = response.json().await?;
        Ok(json)
    }
}

/// Metadata provider backed by an npm registry.
///
/// Packuments are fetched once per name and shared by every resolution.
#[derive(Debug)]
pub struct RegistryProvider {
    client: RegistryClient,
    packuments: PackumentCache,
    fetches: Semaphore,
}

impl RegistryProvider {
    /// Create a provider over `client`.
    #[must_use]
    pub fn new(client: RegistryClient) -> Self {
        Self {
            client,
            packuments: Arc::new(RwLock::new(HashMap::new())),
            fetches: Semaphore::new(MAX_CONCURRENT_FETCHES),
        }
    }

    async fn packument(&self, name: &str) -> Result<Arc<Value>, PkgError> {
        if let Some(cached) = self.packuments.read().await.get(name) {
            return Ok(Arc::clone(cached));
        }

        let _permit = self
            .fetches
            .acquire()
            .await
            .map_err(|e| PkgError::registry(format!("Fetch queue closed: {e}")))?;
        let packument = Arc::new(self.client.fetch_packument(name).await?);
        self.packuments
            .write()
            .await
            .insert(name.to_string(), Arc::clone(&packument));
        Ok(packument)
    }
}

#[async_trait]
impl MetadataProvider for RegistryProvider {
    async fn resolve(&self, spec: &str, base_dir: &Path) -> Result<Descriptor, PkgError> {
        let parsed = PackageSpec::parse(spec)?;

        let (name, version) = match &parsed {
            PackageSpec::Directory { name, path } => {
                return resolve_directory(name.as_deref(), path, base_dir);
            }
            PackageSpec::Registry { name, range } => {
                let packument = self.packument(name).await?;
                let version = select_version(&packument, range)
                    .ok_or_else(|| PkgError::version_not_found(name, range))?;
                (name.clone(), version)
            }
            PackageSpec::Remote { name, url } => {
                let (url_name, version) = parse_tarball_url(url).ok_or_else(|| {
                    PkgError::spec_invalid(format!("Unsupported tarball URL: {url}"))
                })?;
                (name.clone().unwrap_or(url_name), version)
            }
        };

        let packument = self.packument(&name).await?;
        let mut descriptor = descriptor_for(&packument, &name, &version)?;
        descriptor.requested = Some(Requested::new(parsed.requested_spec(), parsed.request_kind()));
        Ok(descriptor)
    }
}

/// Pick the version a range or dist-tag refers to.
#[must_use]
pub fn select_version(packument: &Value, range: &str) -> Option<String> {
    if let Some(tagged) = packument
        .get("dist-tags")
        .and_then(|tags| tags.get(range))
        .and_then(Value::as_str)
    {
        return Some(tagged.to_string());
    }
    max_satisfying(get_versions(packument), range).map(str::to_string)
}

/// Build the descriptor for one version of a packument.
///
/// # Errors
/// Returns `PKG_VERSION_NOT_FOUND` if the version is not listed, or
/// `PKG_MANIFEST_INVALID` if its manifest is not an object.
pub fn descriptor_for(packument: &Value, name: &str, version: &str) -> Result<Descriptor, PkgError> {
    let manifest = packument
        .get("versions")
        .and_then(|versions| versions.get(version))
        .ok_or_else(|| PkgError::version_not_found(name, version))?;

    let mut warnings = Vec::new();
    let mut descriptor = Descriptor::from_manifest(manifest, &mut warnings)?;
    if descriptor.name.is_empty() {
        descriptor.name = name.to_string();
    }
    if descriptor.version.is_empty() {
        descriptor.version = version.to_string();
    }
    descriptor.warnings = warnings;
    Ok(descriptor)
}

/// Get all available version strings from a packument.
#[must_use]
pub fn get_versions(packument: &Value) -> Vec<&str> {
    packument
        .get("versions")
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

/// Split a registry tarball URL into package name and version.
///
/// Accepts `<registry>/<name>/-/<basename>-<version>.tgz`, where `<name>`
/// may be a scoped `@scope/name` (with or without an encoded slash).
#[must_use]
pub fn parse_tarball_url(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url).ok()?;
    let segments: Vec<String> = parsed
        .path_segments()?
        .map(|s| s.replace("%2F", "/").replace("%2f", "/"))
        .collect();

    let dash = segments.iter().rposition(|s| s == "-")?;
    let file = segments.get(dash + 1)?;
    let before = &segments[..dash];

    let name = match before {
        [.., scope, pkg] if scope.starts_with('@') => format!("{scope}/{pkg}"),
        [.., pkg] => pkg.clone(),
        [] => return None,
    };

    let basename = name.rsplit('/').next()?;
    let version = file
        .strip_suffix(".tgz")?
        .strip_prefix(basename)?
        .strip_prefix('-')?;
    if version.is_empty() {
        return None;
    }
    Some((name, version.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use serial_test::serial;

    fn packument() -> Value {
        serde_json::json!({
            "name": "react",
            "dist-tags": { "latest": "18.2.0", "next": "19.0.0-rc.0" },
            "versions": {
                "17.0.2": {},
                "18.1.0": {},
                "18.2.0": {
                    "name": "react",
                    "version": "18.2.0",
                    "dependencies": { "loose-envify": "^1.1.0" },
                    "dist": {
                        "tarball": "https://registry.npmjs.org/react/-/react-18.2.0.tgz",
                        "shasum": "abc123"
                    }
                },
                "19.0.0-rc.0": {}
            }
        })
    }

    #[test]
    fn test_select_version() {
        let p = packument();
        assert_eq!(select_version(&p, "latest").as_deref(), Some("18.2.0"));
        assert_eq!(select_version(&p, "next").as_deref(), Some("19.0.0-rc.0"));
        assert_eq!(select_version(&p, "^17.0.0").as_deref(), Some("17.0.2"));
        assert_eq!(select_version(&p, "~18.1.0").as_deref(), Some("18.1.0"));
        assert_eq!(select_version(&p, "^20.0.0"), None);
    }

    #[test]
    fn test_descriptor_for() {
        let desc = descriptor_for(&packument(), "react", "18.2.0").unwrap();
        assert_eq!(desc.id(), "react@18.2.0");
        assert_eq!(desc.checksum.as_deref(), Some("abc123"));
        assert_eq!(
            desc.resolved.as_deref(),
            Some("https://registry.npmjs.org/react/-/react-18.2.0.tgz")
        );
        assert_eq!(desc.dependencies["loose-envify"], "^1.1.0");

        let sparse = descriptor_for(&packument(), "react", "17.0.2").unwrap();
        assert_eq!(sparse.id(), "react@17.0.2");

        let err = descriptor_for(&packument(), "react", "1.0.0").unwrap_err();
        assert_eq!(err.code(), codes::PKG_VERSION_NOT_FOUND);
    }

    #[test]
    fn test_parse_tarball_url() {
        assert_eq!(
            parse_tarball_url("https://registry.npmjs.org/react/-/react-18.2.0.tgz"),
            Some(("react".to_string(), "18.2.0".to_string()))
        );
        assert_eq!(
            parse_tarball_url("https://registry.npmjs.org/@types/node/-/node-20.1.0.tgz"),
            Some(("@types/node".to_string(), "20.1.0".to_string()))
        );
        assert_eq!(
            parse_tarball_url("https://registry.npmjs.org/@types%2Fnode/-/node-20.1.0-beta.1.tgz"),
            Some(("@types/node".to_string(), "20.1.0-beta.1".to_string()))
        );
        assert_eq!(parse_tarball_url("https://example.com/archive.tgz"), None);
        assert_eq!(parse_tarball_url("not a url"), None);
    }

    #[test]
    fn test_client_creation() {
        let client = RegistryClient::new("https://npm.example.com/registry").unwrap();
        assert_eq!(client.base_url().as_str(), "https://npm.example.com/registry/");
        assert!(RegistryClient::new("not-a-url").is_err());
    }

    #[test]
    #[serial]
    fn test_client_from_env() {
        std::env::set_var(REGISTRY_ENV, "http://localhost:4873/");
        let client = RegistryClient::from_env().unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:4873/");

        std::env::remove_var(REGISTRY_ENV);
        let client = RegistryClient::from_env().unwrap();
        assert_eq!(client.base_url().as_str(), DEFAULT_REGISTRY);
    }
}
