//! Placement search over the ancestor chain.
//!
//! Lookups mirror node-style directory resolution: a package is visible from
//! a node if it sits on the node itself or in the `node_modules` of the node
//! or of any ancestor, and the closest same-named entry shadows farther ones.

use super::tree::{NodeId, Tree};
use super::version::VersionPredicate;

/// Find an existing node named `name` that `node` can use for `range`.
///
/// Climbs from `node` toward the root. The first same-named entry found,
/// either `node` itself or a direct child, decides the result: it is
/// returned when its version satisfies `range`, otherwise the search stops
/// with `None`.
#[must_use]
pub fn find_requirement(
    tree: &Tree,
    node: NodeId,
    name: &str,
    range: &str,
    predicate: &dyn VersionPredicate,
) -> Option<NodeId> {
    let usable = |id: NodeId| {
        let package = &tree.node(id).package;
        (package.name == name && predicate.satisfies(&package.version, range)).then_some(id)
    };

    for current in tree.ancestors(node) {
        if tree.node(current).package.name == name {
            return usable(current);
        }
        if let Some(child) = tree.child_named(current, name) {
            return usable(child);
        }
    }
    None
}

/// The highest ancestor of `node` that may own a new child named `name`.
///
/// Returns `None` when `node` already has a child called `name`; the caller
/// then places below that level.
#[must_use]
pub fn earliest_installable(tree: &Tree, node: NodeId, name: &str) -> Option<NodeId> {
    let current = tree.node(node);
    if current.package.name == name {
        return Some(node);
    }
    if current.children.contains_key(name) {
        return None;
    }
    match current.parent {
        None => Some(node),
        Some(parent) => earliest_installable(tree, parent, name).or(Some(node)),
    }
}
