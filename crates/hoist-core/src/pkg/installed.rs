//! Reading the current tree from `node_modules`.

use super::error::{codes, PkgWarning};
use super::manifest::{read_package_dir, Descriptor, MANIFEST_NAME};
use super::tree::{NodeId, Tree, NODE_MODULES};
use std::path::Path;

/// Build the tree of packages installed under `root_dir`.
///
/// Package directories without a readable manifest are skipped with a
/// warning. Nodes are keyed by directory name, so install paths match the
/// disk.
#[must_use]
pub fn read_installed_tree(root_dir: &Path, root: Descriptor, warnings: &mut Vec<PkgWarning>) -> Tree {
    let mut tree = Tree::new(root, root_dir.to_path_buf());
    let root_id = tree.root();
    index_node_modules(&mut tree, root_id, &root_dir.join(NODE_MODULES), warnings);
    tree
}

fn index_node_modules(tree: &mut Tree, parent: NodeId, node_modules: &Path, warnings: &mut Vec<PkgWarning>) {
    let names = match hoist_util::fs::sorted_dir_names(node_modules) {
        Ok(names) => names,
        Err(e) => {
            warnings.push(PkgWarning::new(
                codes::PKG_INSTALLED_UNREADABLE,
                node_modules.to_string_lossy(),
                format!("Failed to read node_modules: {e}"),
            ));
            return;
        }
    };

    for name in names {
        // Skip .bin and hidden entries
        if name.starts_with('.') {
            continue;
        }

        let path = node_modules.join(&name);
        if !path.is_dir() {
            continue;
        }

        if name.starts_with('@') {
            let scoped = hoist_util::fs::sorted_dir_names(&path).unwrap_or_default();
            for scoped_name in scoped {
                let scoped_path = path.join(&scoped_name);
                if scoped_path.is_dir() {
                    index_single_package(tree, parent, &scoped_path, format!("{name}/{scoped_name}"), warnings);
                }
            }
        } else {
            index_single_package(tree, parent, &path, name, warnings);
        }
    }
}

fn index_single_package(
    tree: &mut Tree,
    parent: NodeId,
    pkg_path: &Path,
    key: String,
    warnings: &mut Vec<PkgWarning>,
) {
    if !pkg_path.join(MANIFEST_NAME).is_file() {
        warnings.push(PkgWarning::new(
            codes::PKG_INSTALLED_UNREADABLE,
            pkg_path.to_string_lossy(),
            format!("No package.json found in {key}"),
        ));
        return;
    }

    let mut descriptor = match read_package_dir(pkg_path, warnings) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            warnings.push(PkgWarning::new(
                codes::PKG_INSTALLED_UNREADABLE,
                pkg_path.to_string_lossy(),
                e.to_string(),
            ));
            return;
        }
    };
    if descriptor.name.is_empty() {
        descriptor.name.clone_from(&key);
    }
    descriptor.lock = None;

    let id = tree.attach_named(parent, key, descriptor);
    if let Ok(real) = dunce::canonicalize(pkg_path) {
        tree.node_mut(id).realpath = real;
    }

    index_node_modules(tree, id, &pkg_path.join(NODE_MODULES), warnings);
}
