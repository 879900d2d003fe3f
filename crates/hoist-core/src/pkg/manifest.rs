//! Package descriptors read from `package.json`.

use super::error::{codes, PkgError, PkgWarning};
use super::lockfile::{LockDependencies, Lockfile};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Manifest file name inside every package directory.
pub const MANIFEST_NAME: &str = "package.json";

/// How a requested spec constrains the version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// A single exact version.
    Version,
    /// A range, or an intersection of merged ranges.
    Range,
    /// A dist-tag such as `latest`.
    Tag,
    /// A local package folder.
    Directory,
    /// A tarball URL.
    Remote,
}

impl RequestKind {
    /// Lowercase name as written in output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Range => "range",
            Self::Tag => "tag",
            Self::Directory => "directory",
            Self::Remote => "remote",
        }
    }
}

/// The requirement a node was placed to satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requested {
    /// The spec, or several specs joined by spaces when merged.
    pub spec: String,
    /// What kind of requirement `spec` is.
    #[serde(rename = "type")]
    pub kind: RequestKind,
}

impl Requested {
    /// Create a requested spec.
    #[must_use]
    pub fn new(spec: impl Into<String>, kind: RequestKind) -> Self {
        Self {
            spec: spec.into(),
            kind,
        }
    }
}

/// A resolved package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    /// Package name.
    pub name: String,
    /// Concrete version.
    pub version: String,
    /// Content checksum (`dist.shasum`), when known.
    pub checksum: Option<String>,
    /// Location the package was resolved from (`dist.tarball`, `file:` path).
    pub resolved: Option<String>,
    /// Regular dependencies, with optional dependencies merged in.
    pub dependencies: BTreeMap<String, String>,
    /// Development dependencies.
    pub dev_dependencies: BTreeMap<String, String>,
    /// Optional dependencies (also present in `dependencies`).
    pub optional_dependencies: BTreeMap<String, String>,
    /// Lock subtree to inflate instead of searching for placements.
    pub lock: Option<LockDependencies>,
    /// The request this descriptor was resolved for.
    pub requested: Option<Requested>,
    /// Problems found while reading this package's manifest.
    pub warnings: Vec<PkgWarning>,
}

impl Descriptor {
    /// Create a descriptor with just a name and version.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Add a regular dependency.
    #[must_use]
    pub fn with_dependency(mut self, name: &str, range: &str) -> Self {
        self.dependencies.insert(name.to_string(), range.to_string());
        self
    }

    /// Add a development dependency.
    #[must_use]
    pub fn with_dev_dependency(mut self, name: &str, range: &str) -> Self {
        self.dev_dependencies
            .insert(name.to_string(), range.to_string());
        self
    }

    /// Add an optional dependency. It is also recorded as a regular one.
    #[must_use]
    pub fn with_optional_dependency(mut self, name: &str, range: &str) -> Self {
        self.optional_dependencies
            .insert(name.to_string(), range.to_string());
        self.dependencies.insert(name.to_string(), range.to_string());
        self
    }

    /// Set the content checksum.
    #[must_use]
    pub fn with_checksum(mut self, checksum: &str) -> Self {
        self.checksum = Some(checksum.to_string());
        self
    }

    /// `name@version`, used in requester chains and output.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// True if `name` is an optional dependency of this package.
    #[must_use]
    pub fn is_optional(&self, name: &str) -> bool {
        self.optional_dependencies.contains_key(name)
    }

    /// Parse manifest JSON text.
    ///
    /// # Errors
    /// Returns `PKG_MANIFEST_INVALID` if the text is not a JSON object.
    pub fn parse(content: &str, warnings: &mut Vec<PkgWarning>) -> Result<Self, PkgError> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_manifest(&value, warnings)
    }

    /// Build a descriptor from a parsed manifest.
    ///
    /// Non-object sections and non-string ranges are skipped with a warning.
    ///
    /// # Errors
    /// Returns `PKG_MANIFEST_INVALID` if the manifest is not a JSON object.
    pub fn from_manifest(value: &Value, warnings: &mut Vec<PkgWarning>) -> Result<Self, PkgError> {
        let root = value
            .as_object()
            .ok_or_else(|| PkgError::manifest_invalid("package.json must be a JSON object"))?;

        let dist = root.get("dist").and_then(Value::as_object);
        let checksum = string_field(root, "_shasum")
            .or_else(|| dist.and_then(|d| string_field(d, "shasum")));
        let resolved = string_field(root, "_resolved")
            .or_else(|| dist.and_then(|d| string_field(d, "tarball")));

        let mut dependencies = extract_section(root, "dependencies", warnings);
        let dev_dependencies = extract_section(root, "devDependencies", warnings);
        let optional_dependencies = extract_section(root, "optionalDependencies", warnings);

        // Optional entries override same-named regular ones.
        for (name, range) in &optional_dependencies {
            dependencies.insert(name.clone(), range.clone());
        }

        Ok(Self {
            name: string_field(root, "name").unwrap_or_default(),
            version: string_field(root, "version").unwrap_or_default(),
            checksum,
            resolved,
            dependencies,
            dev_dependencies,
            optional_dependencies,
            lock: None,
            requested: None,
            warnings: Vec::new(),
        })
    }
}

/// Read a package directory: its manifest plus any lock descriptor.
///
/// A missing `package.json` yields an empty descriptor.
///
/// # Errors
/// Returns `PKG_MANIFEST_INVALID` for a malformed manifest and
/// `PKG_LOCKFILE_INVALID` for a malformed lock descriptor.
pub fn read_package_dir(dir: &Path, warnings: &mut Vec<PkgWarning>) -> Result<Descriptor, PkgError> {
    let path = dir.join(MANIFEST_NAME);
    let content = hoist_util::fs::read_optional(&path)
        .map_err(|e| PkgError::manifest_invalid(format!("Failed to read {}: {e}", path.display())))?;

    let mut descriptor = match content {
        Some(content) => Descriptor::parse(&content, warnings).map_err(|e| {
            PkgError::manifest_invalid(format!("{}: {}", path.display(), e.message()))
        })?,
        None => Descriptor::default(),
    };

    if let Some(lockfile) = Lockfile::read(dir)? {
        descriptor.lock = Some(lockfile.dependencies);
    }

    Ok(descriptor)
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Extract one dependency section, warning about malformed entries.
fn extract_section(
    root: &Map<String, Value>,
    section: &str,
    warnings: &mut Vec<PkgWarning>,
) -> BTreeMap<String, String> {
    let mut deps = BTreeMap::new();

    let Some(section_value) = root.get(section) else {
        return deps;
    };

    let Some(section_obj) = section_value.as_object() else {
        warnings.push(PkgWarning::new(
            codes::PKG_MANIFEST_INVALID,
            section,
            format!("'{section}' must be an object, got {}", json_type_name(section_value)),
        ));
        return deps;
    };

    for (name, range_value) in section_obj {
        if let Some(range) = range_value.as_str() {
            deps.insert(name.clone(), range.to_string());
        } else {
            warnings.push(PkgWarning::new(
                codes::PKG_DEP_RANGE_INVALID,
                name,
                format!("expected string, got {}", json_type_name(range_value)),
            ));
        }
    }

    deps
}

/// Get a human-readable type name for a JSON value.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
