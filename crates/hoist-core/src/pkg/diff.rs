//! Tree differ: turns a current and an ideal tree into install actions.

use super::manifest::Descriptor;
use super::tree::{Node, NodeId, Tree};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One change the installer has to make.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    /// Install a package at a path that is currently empty.
    Add(&'a Node),
    /// Replace the package at a path with a different one.
    Update(&'a Node),
    /// Delete the package at a path.
    Remove(&'a Node),
}

impl<'a> Action<'a> {
    /// `add`, `update` or `remove`.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Update(_) => "update",
            Self::Remove(_) => "remove",
        }
    }

    /// The node the action applies to: the ideal node for add and update,
    /// the current node for remove.
    #[must_use]
    pub fn node(&self) -> &'a Node {
        match self {
            Self::Add(node) | Self::Update(node) | Self::Remove(node) => node,
        }
    }

    /// Owned, serializable form of this action.
    #[must_use]
    pub fn summary(&self) -> ActionSummary {
        let node = self.node();
        ActionSummary {
            action: self.verb(),
            name: node.package.name.clone(),
            version: node.package.version.clone(),
            path: node.path.clone(),
        }
    }
}

/// Serializable action record for output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    /// `add`, `update` or `remove`.
    pub action: &'static str,
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Install path.
    pub path: PathBuf,
}

/// Map every non-root node reachable from the root to its install path.
#[must_use]
pub fn flatten(tree: &Tree) -> BTreeMap<PathBuf, NodeId> {
    tree.descendants(tree.root())
        .into_iter()
        .map(|id| (tree.node(id).path.clone(), id))
        .collect()
}

/// Whether two descriptors denote the same installed content.
///
/// Checksums decide when both sides have one; one-sided checksums are never
/// equivalent; otherwise versions are compared.
#[must_use]
pub fn equivalent(a: &Descriptor, b: &Descriptor) -> bool {
    match (&a.checksum, &b.checksum) {
        (Some(x), Some(y)) => x == y,
        (None, None) => a.version == b.version,
        _ => false,
    }
}

/// Compute the actions that turn `old` into `new`.
///
/// Removals come first, then additions and updates, each in path order.
#[must_use]
pub fn diff<'a>(old: &'a Tree, new: &'a Tree) -> Vec<Action<'a>> {
    let old_flat = flatten(old);
    let new_flat = flatten(new);
    let mut actions = Vec::new();

    for (path, &id) in &old_flat {
        if !new_flat.contains_key(path) {
            actions.push(Action::Remove(old.node(id)));
        }
    }

    for (path, &id) in &new_flat {
        let new_node = new.node(id);
        match old_flat.get(path) {
            Some(&old_id) if equivalent(&old.node(old_id).package, &new_node.package) => {}
            Some(_) => actions.push(Action::Update(new_node)),
            None => actions.push(Action::Add(new_node)),
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> Tree {
        Tree::new(Descriptor::new("app", "0.1.0"), PathBuf::from("/p"))
    }

    /// app
    /// ├── a@1.0.0
    /// │   └── b@2.0.0
    /// └── b@1.0.0
    fn sample() -> Tree {
        let mut tree = empty();
        let root = tree.root();
        let a = tree.attach(root, Descriptor::new("a", "1.0.0"));
        tree.attach(a, Descriptor::new("b", "2.0.0"));
        tree.attach(root, Descriptor::new("b", "1.0.0"));
        tree
    }

    fn verbs(actions: &[Action<'_>]) -> Vec<(&'static str, String)> {
        actions
            .iter()
            .map(|a| (a.verb(), a.node().package.id()))
            .collect()
    }

    #[test]
    fn test_flatten_one_entry_per_node() {
        let tree = sample();
        let flat = flatten(&tree);
        assert_eq!(flat.len(), 3);
        assert!(flat.contains_key(&PathBuf::from("/p/node_modules/a/node_modules/b")));
        assert!(flat.contains_key(&PathBuf::from("/p/node_modules/b")));
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let tree = sample();
        let copy = tree.clone();
        assert!(diff(&tree, &copy).is_empty());
    }

    #[test]
    fn test_diff_from_empty_adds_everything() {
        let (old, new) = (empty(), sample());
        let actions = diff(&old, &new);
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().all(|a| matches!(a, Action::Add(_))));
    }

    #[test]
    fn test_diff_to_empty_removes_everything() {
        let (old, new) = (sample(), empty());
        let actions = diff(&old, &new);
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().all(|a| matches!(a, Action::Remove(_))));
    }

    #[test]
    fn test_diff_mixed() {
        let old = sample();
        let mut new = empty();
        let root = new.root();
        new.attach(root, Descriptor::new("a", "1.1.0"));
        new.attach(root, Descriptor::new("b", "1.0.0"));
        new.attach(root, Descriptor::new("c", "1.0.0"));

        assert_eq!(
            verbs(&diff(&old, &new)),
            vec![
                ("remove", "b@2.0.0".to_string()),
                ("update", "a@1.1.0".to_string()),
                ("add", "c@1.0.0".to_string()),
            ]
        );
    }

    #[test]
    fn test_checksum_decides() {
        let mut old = empty();
        let mut new = empty();
        let (old_root, new_root) = (old.root(), new.root());
        old.attach(old_root, Descriptor::new("a", "1.0.0").with_checksum("aaa"));
        new.attach(new_root, Descriptor::new("a", "1.0.0").with_checksum("bbb"));
        assert_eq!(verbs(&diff(&old, &new)), vec![("update", "a@1.0.0".to_string())]);

        let mut same = empty();
        let same_root = same.root();
        same.attach(same_root, Descriptor::new("a", "1.0.0").with_checksum("aaa"));
        assert!(diff(&old, &same).is_empty());
    }

    #[test]
    fn test_equivalent_is_symmetric() {
        let plain = Descriptor::new("a", "1.0.0");
        let other_version = Descriptor::new("a", "1.0.1");
        let summed = Descriptor::new("a", "1.0.0").with_checksum("aaa");
        let summed_other = Descriptor::new("a", "2.0.0").with_checksum("aaa");
        let all = [&plain, &other_version, &summed, &summed_other];

        for a in all {
            for b in all {
                assert_eq!(equivalent(a, b), equivalent(b, a));
            }
        }
        assert!(!equivalent(&plain, &summed));
        assert!(equivalent(&summed, &summed_other));
        assert!(!equivalent(&plain, &other_version));
    }

    #[test]
    fn test_summary_serializes() {
        let tree = sample();
        let empty = empty();
        let actions = diff(&empty, &tree);
        let json = serde_json::to_value(actions[0].summary()).unwrap();
        assert_eq!(json["action"], "add");
        assert_eq!(json["name"], "a");
        assert_eq!(json["path"], "/p/node_modules/a");
    }
}
