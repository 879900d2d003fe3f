//! Writing requested packages back to `package.json`.

use super::error::{codes, PkgError, PkgWarning};
use super::install::InstallOptions;
use super::lockfile::{Lockfile, LOCKFILE_NAME};
use super::manifest::{RequestKind, MANIFEST_NAME};
use super::tree::{Node, Tree};
use super::version::parse_version;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

/// Default prefix for saved versions.
pub const DEFAULT_SAVE_PREFIX: &str = "^";

/// Manifest section a requested package is recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveTarget {
    /// `dependencies`
    Dependencies,
    /// `devDependencies`
    DevDependencies,
    /// `optionalDependencies`
    OptionalDependencies,
}

impl SaveTarget {
    /// Pick the target from command flags.
    ///
    /// Nothing is saved without specifiers or without a save flag. Optional
    /// beats dev, which beats regular.
    #[must_use]
    pub fn from_flags(has_specs: bool, save: bool, save_dev: bool, save_optional: bool) -> Option<Self> {
        if !has_specs {
            return None;
        }
        if save_optional {
            Some(Self::OptionalDependencies)
        } else if save_dev {
            Some(Self::DevDependencies)
        } else if save {
            Some(Self::Dependencies)
        } else {
            None
        }
    }

    /// Manifest key for this section.
    #[must_use]
    pub fn as_key(self) -> &'static str {
        match self {
            Self::Dependencies => "dependencies",
            Self::DevDependencies => "devDependencies",
            Self::OptionalDependencies => "optionalDependencies",
        }
    }
}

/// A manifest entry to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveEntry {
    /// Package name.
    pub name: String,
    /// Range to record.
    pub spec: String,
    /// Section to record it in.
    pub target: SaveTarget,
}

/// The range recorded for a saved node.
///
/// Uses the requested spec, or the installed version when nothing was
/// requested or the request was a dist-tag. A plain version of at least
/// 0.1.0 gets the save prefix unless saving exact.
#[must_use]
pub fn compute_version_spec(node: &Node, options: &InstallOptions) -> String {
    let spec = match &node.package.requested {
        Some(requested) if requested.kind != RequestKind::Tag => requested.spec.as_str(),
        _ => node.package.version.as_str(),
    };

    let minimum = semver::Version::new(0, 1, 0);
    let prefixable = !options.save_exact && parse_version(spec).is_some_and(|v| v >= minimum);
    if prefixable {
        format!("{}{spec}", options.save_prefix)
    } else {
        spec.to_string()
    }
}

/// Top-level nodes tagged for saving.
#[must_use]
pub fn things_to_save(tree: &Tree, options: &InstallOptions) -> Vec<SaveEntry> {
    tree.node(tree.root())
        .children
        .values()
        .map(|&id| tree.node(id))
        .filter_map(|node| {
            node.save.map(|target| SaveEntry {
                name: node.package.name.clone(),
                spec: compute_version_spec(node, options),
                target,
            })
        })
        .collect()
}

/// Record saved nodes in the project manifest and refresh an existing lock.
///
/// Failures never abort the install; they come back as warnings.
#[must_use]
pub fn save_requested(tree: &Tree, options: &InstallOptions) -> Vec<PkgWarning> {
    let mut warnings = Vec::new();
    let root_dir = tree.node(tree.root()).realpath.clone();
    let entries = things_to_save(tree, options);

    if let Err(e) = save_package_json(&root_dir, &entries) {
        warnings.push(PkgWarning::new(codes::PKG_SAVE_FAILED, MANIFEST_NAME, e.to_string()));
    }

    if root_dir.join(LOCKFILE_NAME).is_file() {
        if let Err(e) = Lockfile::capture(tree).write_to(&root_dir.join(LOCKFILE_NAME)) {
            warnings.push(PkgWarning::new(codes::PKG_SAVE_FAILED, LOCKFILE_NAME, e.to_string()));
        }
    }

    warnings
}

/// Rewrite `package.json` with `entries`, keeping all other keys in place.
///
/// # Errors
/// Returns `PKG_SAVE_FAILED` if the manifest is missing, malformed, or
/// cannot be written.
pub fn save_package_json(root_dir: &Path, entries: &[SaveEntry]) -> Result<(), PkgError> {
    let path = root_dir.join(MANIFEST_NAME);
    let content = hoist_util::fs::read_optional(&path)
        .map_err(|e| PkgError::save_failed(format!("Failed to read {}: {e}", path.display())))?
        .ok_or_else(|| PkgError::save_failed(format!("{} not found", path.display())))?;

    let mut data: Value = serde_json::from_str(&content)
        .map_err(|e| PkgError::save_failed(format!("Invalid JSON in {}: {e}", path.display())))?;
    let root = data
        .as_object_mut()
        .ok_or_else(|| PkgError::save_failed("package.json must be a JSON object"))?;

    for entry in entries {
        let section = root
            .entry(entry.target.as_key())
            .or_insert_with(|| Value::Object(Map::new()));
        if !section.is_object() {
            *section = Value::Object(Map::new());
        }
        if let Value::Object(section) = section {
            section.insert(entry.name.clone(), Value::String(entry.spec.clone()));
        }
    }

    for entry in entries {
        if let Some(Value::Object(section)) = root.get_mut(entry.target.as_key()) {
            let mut sorted: Vec<(String, Value)> = std::mem::take(section).into_iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            section.extend(sorted);
        }
    }

    let mut json = serde_json::to_string_pretty(&data)
        .map_err(|e| PkgError::save_failed(format!("Failed to serialize manifest: {e}")))?;
    json.push('\n');
    hoist_util::fs::atomic_write(&path, json.as_bytes())
        .map_err(|e| PkgError::save_failed(format!("Failed to write {}: {e}", path.display())))
}
