//! Arena-backed dependency tree.
//!
//! Nodes live in a flat `Vec` and refer to each other by [`NodeId`]. A node
//! is owned by its parent's `children` map; `parent` and `requiredby` are
//! plain back-references.

use super::error::PkgError;
use super::manifest::Descriptor;
use super::save::SaveTarget;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Per-package install directory name.
pub const NODE_MODULES: &str = "node_modules";

/// Stable index of a node within its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// One entry in the dependency tree.
#[derive(Debug, Clone)]
pub struct Node {
    /// The package placed here.
    pub package: Descriptor,
    /// Owning parent, `None` for the root (or while detached).
    pub parent: Option<NodeId>,
    /// Children keyed by package name.
    pub children: BTreeMap<String, NodeId>,
    /// Nodes that depend on this one.
    pub requiredby: Vec<NodeId>,
    /// Install path.
    pub path: PathBuf,
    /// Resolved location on disk.
    pub realpath: PathBuf,
    /// Set once this node's own dependencies are being resolved.
    pub loaded: bool,
    /// Manifest section to record this node in, if any.
    pub save: Option<SaveTarget>,
    /// Why loading this node's dependencies failed.
    pub failed: Option<PkgError>,
}

impl Node {
    fn new(package: Descriptor, parent: Option<NodeId>, path: PathBuf) -> Self {
        Self {
            package,
            parent,
            children: BTreeMap::new(),
            requiredby: Vec::new(),
            realpath: path.clone(),
            path,
            loaded: false,
            save: None,
            failed: None,
        }
    }
}

/// A dependency tree rooted at the project's own package.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Create a tree holding only the root package, installed at `root_dir`.
    #[must_use]
    pub fn new(package: Descriptor, root_dir: PathBuf) -> Self {
        let mut root = Node::new(package, None, root_dir);
        root.loaded = true;
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Borrow a node.
    ///
    /// # Panics
    /// Panics if `id` came from a different tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Mutably borrow a node.
    ///
    /// # Panics
    /// Panics if `id` came from a different tree.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Attach a new node for `package` under `parent`, keyed by its name.
    pub fn attach(&mut self, parent: NodeId, package: Descriptor) -> NodeId {
        let key = package.name.clone();
        self.attach_named(parent, key, package)
    }

    /// Attach a new node under `parent` with an explicit child key.
    ///
    /// The install path is `parent.path/node_modules/<key>`. A child already
    /// holding `key` is unlinked and replaced.
    pub fn attach_named(&mut self, parent: NodeId, key: String, package: Descriptor) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent_node = self.node(parent);
        let path = parent_node.path.join(NODE_MODULES).join(&key);
        let realpath = parent_node.realpath.join(NODE_MODULES).join(&key);

        let mut node = Node::new(package, Some(parent), path);
        node.realpath = realpath;
        self.nodes.push(node);

        if let Some(replaced) = self.node_mut(parent).children.insert(key, id) {
            self.node_mut(replaced).parent = None;
        }
        id
    }

    /// The direct child of `id` stored under `name`.
    #[must_use]
    pub fn child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.node(id).children.get(name).copied()
    }

    /// Walk from `id` (inclusive) up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |&current| self.node(current).parent)
    }

    /// `name@version` of `id` and each of its ancestors, innermost first.
    #[must_use]
    pub fn requester_chain(&self, id: NodeId) -> Vec<String> {
        self.ancestors(id)
            .map(|ancestor| self.node(ancestor).package.id())
            .collect()
    }

    /// Record that `requester` depends on `id`.
    pub fn add_required_by(&mut self, id: NodeId, requester: NodeId) {
        let requiredby = &mut self.node_mut(id).requiredby;
        if !requiredby.contains(&requester) {
            requiredby.push(requester);
        }
    }

    /// Unlink `id` from its parent. Its subtree goes with it.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node_mut(id).parent.take() else {
            return;
        };
        let children = &mut self.node_mut(parent).children;
        children.retain(|_, child| *child != id);
    }

    /// Unlink every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.node_mut(id).children);
        for child in children.into_values() {
            self.node_mut(child).parent = None;
        }
    }

    /// Every node reachable from `id` through `children`, excluding `id`,
    /// in depth-first order.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id).children.values().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.node(current).children.values().rev().copied());
        }
        out
    }

    /// Render the tree for debugging, one `name@version` per line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_node(self.root, 0, &mut out);
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let _ = write!(out, "{:indent$}{}", "", node.package.id(), indent = depth * 2);
        if let Some(requested) = &node.package.requested {
            let _ = write!(out, " ({})", requested.spec);
        }
        out.push('\n');
        for &child in node.children.values() {
            self.render_node(child, depth + 1, out);
        }
    }
}
