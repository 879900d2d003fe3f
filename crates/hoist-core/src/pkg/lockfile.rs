//! Lock descriptor (`npm-shrinkwrap.json`) reading and writing.
//!
//! The lock is a nested mapping that encodes the exact placement of every
//! package: an entry's `dependencies` are the packages installed in its own
//! `node_modules`.

use super::error::PkgError;
use super::tree::{NodeId, Tree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Lock descriptor file name at a package root.
pub const LOCKFILE_NAME: &str = "npm-shrinkwrap.json";

/// Nested lock entries, keyed by package name.
pub type LockDependencies = BTreeMap<String, LockEntry>;

/// One locked package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Pinned version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Location the package resolves from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    /// Packages placed beneath this one.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: LockDependencies,
}

impl LockEntry {
    /// The specifier used to resolve this entry.
    ///
    /// Prefers the pinned location; an entry without one resolves as
    /// `name@version`.
    #[must_use]
    pub fn spec(&self, name: &str) -> String {
        match (&self.resolved, &self.version) {
            (Some(resolved), _) => format!("{name}@{resolved}"),
            (None, Some(version)) => format!("{name}@{version}"),
            (None, None) => format!("{name}@*"),
        }
    }
}

/// The complete lock descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    /// Root package name.
    #[serde(default)]
    pub name: String,
    /// Root package version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Top-level locked packages.
    #[serde(default)]
    pub dependencies: LockDependencies,
}

impl Lockfile {
    /// Parse lock JSON text.
    ///
    /// # Errors
    /// Returns `PKG_LOCKFILE_INVALID` if the JSON does not match the lock shape.
    pub fn parse(content: &str) -> Result<Self, PkgError> {
        serde_json::from_str(content)
            .map_err(|e| PkgError::lockfile_invalid(format!("Invalid lock descriptor: {e}")))
    }

    /// Read the lock descriptor in `dir`, if there is one.
    ///
    /// # Errors
    /// Returns `PKG_LOCKFILE_INVALID` if the file exists but is malformed.
    pub fn read(dir: &Path) -> Result<Option<Self>, PkgError> {
        let path = dir.join(LOCKFILE_NAME);
        let content = hoist_util::fs::read_optional(&path).map_err(|e| {
            PkgError::lockfile_invalid(format!("Failed to read {}: {e}", path.display()))
        })?;
        content.map(|c| Self::parse(&c)).transpose()
    }

    /// Record a tree's layout in lock form.
    #[must_use]
    pub fn capture(tree: &Tree) -> Self {
        let root = tree.node(tree.root());
        Self {
            name: root.package.name.clone(),
            version: root.package.version.clone(),
            dependencies: capture_children(tree, tree.root()),
        }
    }

    /// Serialize to pretty JSON with a trailing newline.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, PkgError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Write the lock descriptor to a path atomically.
    ///
    /// # Errors
    /// Returns `PKG_IO_ERROR` if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), PkgError> {
        let content = self.to_json()?;
        hoist_util::fs::atomic_write(path, content.as_bytes())
            .map_err(|e| PkgError::io(format!("Failed to write {}: {e}", path.display())))
    }
}

fn capture_children(tree: &Tree, id: NodeId) -> LockDependencies {
    tree.node(id)
        .children
        .iter()
        .map(|(name, &child)| {
            let node = tree.node(child);
            let entry = LockEntry {
                version: Some(node.package.version.clone()),
                resolved: node.package.resolved.clone(),
                dependencies: capture_children(tree, child),
            };
            (name.clone(), entry)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use crate::pkg::manifest::Descriptor;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_parse_nested() {
        let lock = Lockfile::parse(
            r#"{
                "name": "app",
                "version": "1.0.0",
                "dependencies": {
                    "a": {
                        "version": "1.0.0",
                        "resolved": "https://r.example/a/-/a-1.0.0.tgz",
                        "dependencies": { "b": { "version": "2.0.0" } }
                    }
                }
            }"#,
        )
        .unwrap();

        let a = &lock.dependencies["a"];
        assert_eq!(a.spec("a"), "a@https://r.example/a/-/a-1.0.0.tgz");
        assert_eq!(a.dependencies["b"].spec("b"), "b@2.0.0");
    }

    #[test]
    fn test_parse_invalid() {
        let err = Lockfile::parse(r#"{"dependencies": []}"#).unwrap_err();
        assert_eq!(err.code(), codes::PKG_LOCKFILE_INVALID);
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempdir().unwrap();
        assert!(Lockfile::read(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_capture_and_write() {
        let root_dir = PathBuf::from("/project");
        let mut tree = Tree::new(Descriptor::new("app", "0.1.0"), root_dir);
        let root = tree.root();
        let mut a = Descriptor::new("a", "1.0.0");
        a.resolved = Some("https://r.example/a/-/a-1.0.0.tgz".to_string());
        let a_id = tree.attach(root, a);
        tree.attach(a_id, Descriptor::new("b", "2.0.0"));

        let lock = Lockfile::capture(&tree);
        assert_eq!(lock.name, "app");
        let a_entry = &lock.dependencies["a"];
        assert_eq!(a_entry.version.as_deref(), Some("1.0.0"));
        assert!(a_entry.resolved.is_some());
        assert_eq!(a_entry.dependencies["b"].resolved, None);

        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        lock.write_to(&path).unwrap();
        assert_eq!(Lockfile::read(dir.path()).unwrap(), Some(lock));
    }
}
