//! Package specifier parsing.
//!
//! Classifies what a user or a dependency map asks for:
//! - `react`, `react@18.2.0`, `react@^18.0.0`, `react@next` (registry)
//! - `@types/node`, `@types/node@^20` (scoped registry)
//! - `./pkgs/a`, `../a`, `/abs/a`, `file:a`, `a@file:../a` (directory)
//! - `https://host/a/-/a-1.0.0.tgz`, `a@https://...` (remote tarball)

use super::error::PkgError;
use super::manifest::RequestKind;
use super::version::{is_exact_version, is_valid_range};
use std::path::PathBuf;

/// Dist-tag used when a registry specifier carries no range.
pub const DEFAULT_TAG: &str = "latest";

/// A parsed package specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSpec {
    /// A name resolved through a registry, with a version, range or dist-tag.
    Registry {
        /// Full package name (e.g., "@scope/name" or "name").
        name: String,
        /// Version, range, or dist-tag. Defaults to `latest`.
        range: String,
    },
    /// A package folder on disk, relative to the requester's directory.
    Directory {
        /// Name given before the `@`, if any.
        name: Option<String>,
        /// Path with any `file:` prefix removed.
        path: PathBuf,
    },
    /// A tarball URL.
    Remote {
        /// Name given before the `@`, if any.
        name: Option<String>,
        /// Tarball URL.
        url: String,
    },
}

impl PackageSpec {
    /// Parse a package specifier string.
    ///
    /// # Errors
    /// Returns `PKG_SPEC_INVALID` if the spec is empty or malformed.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(PkgError::spec_invalid("Empty package spec"));
        }

        if let Some(path) = as_directory(input) {
            return Ok(Self::Directory { name: None, path });
        }

        if is_remote(input) {
            return Ok(Self::Remote {
                name: None,
                url: input.to_string(),
            });
        }

        let (name, rest) = split_name(input)?;

        let Some(rest) = rest else {
            return Ok(Self::Registry {
                name,
                range: DEFAULT_TAG.to_string(),
            });
        };

        if let Some(path) = as_directory(rest) {
            return Ok(Self::Directory {
                name: Some(name),
                path,
            });
        }

        if is_remote(rest) {
            return Ok(Self::Remote {
                name: Some(name),
                url: rest.to_string(),
            });
        }

        Ok(Self::Registry {
            name,
            range: rest.to_string(),
        })
    }

    /// Build the specifier string for a dependency map entry.
    ///
    /// An empty range means "any version".
    #[must_use]
    pub fn for_dependency(name: &str, range: &str) -> String {
        let range = range.trim();
        if range.is_empty() {
            format!("{name}@*")
        } else {
            format!("{name}@{range}")
        }
    }

    /// The package name, when the specifier states one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Registry { name, .. } => Some(name),
            Self::Directory { name, .. } | Self::Remote { name, .. } => name.as_deref(),
        }
    }

    /// The portion recorded as the requested spec.
    #[must_use]
    pub fn requested_spec(&self) -> String {
        match self {
            Self::Registry { range, .. } => range.clone(),
            Self::Directory { path, .. } => format!("file:{}", path.display()),
            Self::Remote { url, .. } => url.clone(),
        }
    }

    /// How this specifier constrains the version.
    #[must_use]
    pub fn request_kind(&self) -> RequestKind {
        match self {
            Self::Registry { range, .. } if is_exact_version(range) => RequestKind::Version,
            Self::Registry { range, .. } if is_valid_range(range) => RequestKind::Range,
            Self::Registry { .. } => RequestKind::Tag,
            Self::Directory { .. } => RequestKind::Directory,
            Self::Remote { .. } => RequestKind::Remote,
        }
    }
}

/// URL-encode a package name for registry requests.
///
/// For scoped packages, encodes the `/` as `%2F`.
#[must_use]
pub fn url_encoded_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    }
}

fn as_directory(input: &str) -> Option<PathBuf> {
    if let Some(path) = input.strip_prefix("file:") {
        return Some(PathBuf::from(path));
    }
    let path_like = input == "."
        || input == ".."
        || input.starts_with("./")
        || input.starts_with("../")
        || input.starts_with('/')
        || input.starts_with(".\\")
        || input.starts_with("..\\");
    path_like.then(|| PathBuf::from(input))
}

fn is_remote(input: &str) -> bool {
    input.starts_with("https://") || input.starts_with("http://")
}

/// Split `name[@rest]`, honoring a leading `@scope/`.
fn split_name(input: &str) -> Result<(String, Option<&str>), PkgError> {
    let (name, rest) = if let Some(scoped) = input.strip_prefix('@') {
        let Some(slash_pos) = scoped.find('/') else {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: missing '/' in '{input}'"
            )));
        };
        if slash_pos == 0 {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: empty scope in '{input}'"
            )));
        }
        validate_name(&scoped[..slash_pos])?;

        let after_slash = &scoped[slash_pos + 1..];
        let (pkg_name, rest) = match after_slash.find('@') {
            Some(at_pos) => (&after_slash[..at_pos], Some(&after_slash[at_pos + 1..])),
            None => (after_slash, None),
        };
        if pkg_name.is_empty() {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: empty name in '{input}'"
            )));
        }
        validate_name(pkg_name)?;
        (format!("@{}/{pkg_name}", &scoped[..slash_pos]), rest)
    } else {
        let (name, rest) = match input.find('@') {
            Some(at_pos) => (&input[..at_pos], Some(&input[at_pos + 1..])),
            None => (input, None),
        };
        validate_name(name)?;
        (name.to_string(), rest)
    };

    if rest.is_some_and(|r| r.trim().is_empty()) {
        return Err(PkgError::spec_invalid(format!(
            "Invalid package spec: empty version range in '{input}'"
        )));
    }

    Ok((name, rest.map(str::trim)))
}

fn validate_name(name: &str) -> Result<(), PkgError> {
    if name.is_empty() {
        return Err(PkgError::spec_invalid("Empty package name"));
    }

    for c in name.chars() {
        if !c.is_alphanumeric() && c != '-' && c != '_' && c != '.' && c != '~' {
            return Err(PkgError::spec_invalid(format!(
                "Invalid character '{c}' in package name '{name}'"
            )));
        }
    }

    Ok(())
}
