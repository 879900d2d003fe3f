//! Metadata providers: turn a specifier into a [`Descriptor`].

use super::error::PkgError;
use super::manifest::{read_package_dir, Descriptor, RequestKind, Requested, MANIFEST_NAME};
use super::spec::{PackageSpec, DEFAULT_TAG};
use super::version::{max_satisfying, parse_version};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

/// Resolves dependency specifiers to package descriptors.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Resolve `spec`, interpreting relative paths against `base_dir`.
    ///
    /// The returned descriptor carries the request it was resolved for.
    async fn resolve(&self, spec: &str, base_dir: &Path) -> Result<Descriptor, PkgError>;
}

/// Resolve a package folder on disk.
///
/// Manifest warnings travel on the returned descriptor.
///
/// # Errors
/// Returns `PKG_NOT_FOUND` if the folder has no manifest, or the manifest's
/// own parse errors.
pub fn resolve_directory(
    name: Option<&str>,
    path: &Path,
    base_dir: &Path,
) -> Result<Descriptor, PkgError> {
    let dir = base_dir.join(path);
    let display = path.display().to_string();
    let dir = dunce::canonicalize(&dir).map_err(|_| PkgError::not_found(&display))?;
    if !dir.join(MANIFEST_NAME).is_file() {
        return Err(PkgError::not_found(&format!("{display} (no {MANIFEST_NAME})")));
    }

    let mut warnings = Vec::new();
    let mut descriptor = read_package_dir(&dir, &mut warnings)?;
    if descriptor.name.is_empty() {
        descriptor.name = name
            .map(str::to_string)
            .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();
    }
    descriptor.resolved = Some(format!("file:{}", dir.display()));
    descriptor.requested = Some(Requested::new(format!("file:{display}"), RequestKind::Directory));
    descriptor.warnings = warnings;
    Ok(descriptor)
}

/// An in-memory registry of descriptors.
///
/// Used for offline planning and in tests. Directory specifiers are read
/// from disk; everything else is answered from the published set.
#[derive(Debug, Default)]
pub struct StaticProvider {
    packages: BTreeMap<String, BTreeMap<String, Descriptor>>,
    dist_tags: BTreeMap<String, BTreeMap<String, String>>,
    failures: BTreeMap<String, &'static str>,
}

impl StaticProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a package version.
    #[must_use]
    pub fn with(mut self, descriptor: Descriptor) -> Self {
        self.publish(descriptor);
        self
    }

    /// Publish a package version.
    pub fn publish(&mut self, descriptor: Descriptor) {
        self.packages
            .entry(descriptor.name.clone())
            .or_default()
            .insert(descriptor.version.clone(), descriptor);
    }

    /// Point a dist-tag at a published version.
    #[must_use]
    pub fn with_tag(mut self, name: &str, tag: &str, version: &str) -> Self {
        self.dist_tags
            .entry(name.to_string())
            .or_default()
            .insert(tag.to_string(), version.to_string());
        self
    }

    /// Make every resolution of `name` fail with `code`.
    #[must_use]
    pub fn with_failure(mut self, name: &str, code: &'static str) -> Self {
        self.failures.insert(name.to_string(), code);
        self
    }

    fn resolve_registry(&self, name: &str, range: &str) -> Result<Descriptor, PkgError> {
        let versions = self
            .packages
            .get(name)
            .ok_or_else(|| PkgError::not_found(name))?;

        let tagged = self.dist_tags.get(name).and_then(|tags| tags.get(range));
        let version = match tagged {
            Some(version) => Some(version.as_str()),
            None if range == DEFAULT_TAG => versions
                .keys()
                .filter_map(|v| parse_version(v).map(|parsed| (parsed, v.as_str())))
                .filter(|(parsed, _)| parsed.pre.is_empty())
                .max_by(|(a, _), (b, _)| a.cmp(b))
                .map(|(_, v)| v),
            None => max_satisfying(versions.keys().map(String::as_str), range),
        };

        version
            .and_then(|v| versions.get(v))
            .cloned()
            .ok_or_else(|| PkgError::version_not_found(name, range))
    }

    fn resolve_remote(&self, url: &str) -> Result<Descriptor, PkgError> {
        self.packages
            .values()
            .flat_map(BTreeMap::values)
            .find(|d| d.resolved.as_deref() == Some(url))
            .cloned()
            .ok_or_else(|| PkgError::not_found(url))
    }
}

#[async_trait]
impl MetadataProvider for StaticProvider {
    async fn resolve(&self, spec: &str, base_dir: &Path) -> Result<Descriptor, PkgError> {
        // Let sibling resolutions interleave as they would over a network.
        tokio::task::yield_now().await;

        let parsed = PackageSpec::parse(spec)?;
        if let Some(code) = parsed.name().and_then(|name| self.failures.get(name).copied()) {
            return Err(PkgError::new(code, format!("Failed to resolve {spec}")));
        }

        let mut descriptor = match &parsed {
            PackageSpec::Registry { name, range } => self.resolve_registry(name, range)?,
            PackageSpec::Directory { name, path } => {
                return resolve_directory(name.as_deref(), path, base_dir)
            }
            PackageSpec::Remote { url, .. } => self.resolve_remote(url)?,
        };
        descriptor.requested = Some(Requested::new(parsed.requested_spec(), parsed.request_kind()));
        Ok(descriptor)
    }
}
