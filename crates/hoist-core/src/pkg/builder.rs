//! Ideal tree construction.
//!
//! The builder resolves dependency maps concurrently and places every
//! package as close to the root as per-directory name uniqueness allows.
//!
//! Metadata resolution runs outside the tree lock. Looking for a reusable
//! node and placing a new one happen in a single critical section, so two
//! branches asking for the same name at the same time see each other's
//! placement and never create a duplicate.
//!
//! A node whose dependencies fail to load keeps the error. Reusing it
//! re-raises that error, and [`TreeBuilder::settle`] drops failed subtrees
//! once loading is over.

use super::error::{PkgError, PkgWarning};
use super::lockfile::LockDependencies;
use super::manifest::{Descriptor, RequestKind, Requested};
use super::placement::{earliest_installable, find_requirement};
use super::provider::MetadataProvider;
use super::save::SaveTarget;
use super::spec::PackageSpec;
use super::tree::{NodeId, Tree};
use super::version::VersionPredicate;
use futures::future::{join_all, try_join_all, BoxFuture, FutureExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

/// What still has to happen after a package has been placed.
#[derive(Debug)]
enum Placement {
    /// Reused a node that is already loaded.
    Done(NodeId),
    /// The node's own dependencies must be loaded.
    Load(NodeId),
    /// The node's subtree comes from a lock descriptor.
    Inflate(NodeId, LockDependencies),
    /// Reused a node whose load already failed.
    Failed(PkgError),
}

/// A resolved and placed package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Added {
    /// Where the package lives in the tree.
    pub id: NodeId,
    /// True if the caller must load the node's dependencies.
    pub load: bool,
}

/// Builds an ideal tree.
pub struct TreeBuilder<'a> {
    tree: Mutex<Tree>,
    provider: &'a dyn MetadataProvider,
    predicate: &'a dyn VersionPredicate,
    warnings: Mutex<Vec<PkgWarning>>,
}

impl<'a> TreeBuilder<'a> {
    /// Start building on top of `tree`.
    pub fn new(
        tree: Tree,
        provider: &'a dyn MetadataProvider,
        predicate: &'a dyn VersionPredicate,
    ) -> Self {
        Self {
            tree: Mutex::new(tree),
            provider,
            predicate,
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Finish building, returning the tree and any warnings.
    pub fn finish(self) -> (Tree, Vec<PkgWarning>) {
        (self.tree.into_inner(), self.warnings.into_inner())
    }

    /// Run `f` against the tree under its lock.
    pub async fn with_tree<R>(&self, f: impl FnOnce(&mut Tree) -> R) -> R {
        let mut tree = self.tree.lock().await;
        f(&mut tree)
    }

    /// Resolve explicit specifiers as top-level children of `node`, then
    /// their dependencies. Each resulting top-level node is tagged `save`.
    pub async fn load_requested_deps(
        &self,
        specs: &[String],
        node: NodeId,
        save: Option<SaveTarget>,
    ) -> Result<(), PkgError> {
        try_join_all(specs.iter().map(|spec| async move {
            let added = self.add_child(spec, node).await?;
            if let Some(target) = save {
                self.with_tree(|tree| {
                    if tree.node(added.id).parent == Some(node) {
                        tree.node_mut(added.id).save = Some(target);
                    }
                })
                .await;
            }
            if added.load {
                self.load_deps(added.id).await?;
            }
            Ok::<_, PkgError>(())
        }))
        .await?;
        Ok(())
    }

    /// Resolve every regular dependency of `node`, recursively.
    ///
    /// Failures of optional dependencies become warnings.
    pub fn load_deps(&self, node: NodeId) -> BoxFuture<'_, Result<(), PkgError>> {
        async move {
            let (dependencies, optional) = self
                .with_tree(|tree| {
                    let package = &tree.node(node).package;
                    (
                        package.dependencies.clone(),
                        package.optional_dependencies.clone(),
                    )
                })
                .await;

            // Siblings run to completion so no half-loaded node is left behind.
            let results = join_all(dependencies.iter().map(|(name, range)| {
                let optional = &optional;
                async move {
                    let spec = PackageSpec::for_dependency(name, range);
                    match self.add_child_and_load(&spec, node).await {
                        Err(e) if optional.contains_key(name) => {
                            self.warnings
                                .lock()
                                .await
                                .push(PkgWarning::optional_skipped(name, &e));
                            Ok(())
                        }
                        other => other,
                    }
                }
            }))
            .await;
            self.first_failure(node, results).await
        }
        .boxed()
    }

    /// Record the first error in `results` on `node` and return it.
    async fn first_failure(
        &self,
        node: NodeId,
        results: Vec<Result<(), PkgError>>,
    ) -> Result<(), PkgError> {
        match results.into_iter().find_map(Result::err) {
            Some(e) => {
                self.with_tree(|tree| tree.node_mut(node).failed = Some(e.clone()))
                    .await;
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Resolve dev dependencies of `node` that are not also regular ones.
    ///
    /// Each dev dependency's own subtree is resolved with its parent link
    /// cut, so its descendants cannot hoist out of it.
    pub async fn load_dev_deps(&self, node: NodeId) -> Result<(), PkgError> {
        let (dev, regular): (BTreeMap<String, String>, BTreeMap<String, String>) = self
            .with_tree(|tree| {
                let package = &tree.node(node).package;
                (package.dev_dependencies.clone(), package.dependencies.clone())
            })
            .await;

        // A failing sibling must not cancel a subtree whose parent is cut.
        let results = join_all(
            dev.iter()
                .filter(|(name, _)| !regular.contains_key(*name))
                .map(|(name, range)| async move {
                    let spec = PackageSpec::for_dependency(name, range);
                    let added = self.add_child(&spec, node).await?;
                    if !added.load {
                        return Ok(());
                    }

                    let real_parent = self
                        .with_tree(|tree| tree.node_mut(added.id).parent.take())
                        .await;
                    let loaded = self.load_deps(added.id).await;
                    self.with_tree(|tree| tree.node_mut(added.id).parent = real_parent)
                        .await;
                    loaded
                }),
        )
        .await;
        results.into_iter().collect()
    }

    async fn add_child_and_load(&self, spec: &str, requester: NodeId) -> Result<(), PkgError> {
        let added = self.add_child(spec, requester).await?;
        if added.load {
            self.load_deps(added.id).await?;
        }
        Ok(())
    }

    /// Resolve `spec` for `requester` and place it in the tree.
    ///
    /// Errors carry the requester chain.
    pub async fn add_child(&self, spec: &str, requester: NodeId) -> Result<Added, PkgError> {
        let result = self.resolve_and_place(spec, requester).await;
        match result {
            Ok(added) => Ok(added),
            Err(e) => {
                let chain = self.with_tree(|tree| tree.requester_chain(requester)).await;
                Err(e.with_required_by(chain))
            }
        }
    }

    async fn resolve_and_place(&self, spec: &str, requester: NodeId) -> Result<Added, PkgError> {
        let base_dir = self
            .with_tree(|tree| tree.node(requester).realpath.clone())
            .await;
        let mut descriptor = self.provider.resolve(spec, &base_dir).await?;
        self.keep_warnings(&mut descriptor).await;

        let placement = self
            .with_tree(|tree| {
                let range = requested_range(&descriptor);
                match find_requirement(tree, requester, &descriptor.name, &range, self.predicate) {
                    Some(existing) => {
                        self.resolve_with_existing_module(tree, existing, descriptor, requester)
                    }
                    None => Self::resolve_requirement(tree, descriptor, requester),
                }
            })
            .await;

        match placement {
            Placement::Done(id) => Ok(Added { id, load: false }),
            Placement::Load(id) => Ok(Added { id, load: true }),
            Placement::Inflate(id, lock) => {
                self.inflate(id, lock).await?;
                Ok(Added { id, load: false })
            }
            Placement::Failed(e) => Err(e),
        }
    }

    /// Move a descriptor's manifest warnings into the build's warnings.
    async fn keep_warnings(&self, descriptor: &mut Descriptor) {
        if descriptor.warnings.is_empty() {
            return;
        }
        let id = descriptor.id();
        let mut warnings = self.warnings.lock().await;
        for warning in descriptor.warnings.drain(..) {
            let warning = PkgWarning::new(
                warning.code,
                warning.subject,
                format!("{id}: {}", warning.message),
            );
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }
    }

    /// Merge a new request into an existing node.
    fn resolve_with_existing_module(
        &self,
        tree: &mut Tree,
        existing: NodeId,
        descriptor: Descriptor,
        requester: NodeId,
    ) -> Placement {
        let incoming = descriptor
            .requested
            .unwrap_or_else(|| Requested::new(descriptor.version.clone(), RequestKind::Version));

        let package = &mut tree.node_mut(existing).package;
        if package.requested.is_none() {
            let adopted = if self.predicate.satisfies(&package.version, &incoming.spec) {
                incoming.clone()
            } else {
                Requested::new(package.version.clone(), RequestKind::Version)
            };
            package.requested = Some(adopted);
        }
        if let Some(current) = package.requested.as_mut() {
            let merged = format!(" {} ", current.spec);
            if !merged.contains(&format!(" {} ", incoming.spec)) {
                current.spec.push(' ');
                current.spec.push_str(&incoming.spec);
                current.kind = RequestKind::Range;
            }
        }

        tree.add_required_by(existing, requester);

        let node = tree.node_mut(existing);
        if let Some(e) = &node.failed {
            return Placement::Failed(e.clone());
        }
        if node.loaded {
            return Placement::Done(existing);
        }
        node.loaded = true;
        match descriptor.lock {
            Some(lock) => Placement::Inflate(existing, lock),
            None => Placement::Load(existing),
        }
    }

    /// Place a new node at the highest level that allows it.
    fn resolve_requirement(tree: &mut Tree, mut descriptor: Descriptor, requester: NodeId) -> Placement {
        let parent = earliest_installable(tree, requester, &descriptor.name).unwrap_or(requester);
        let lock = descriptor.lock.take();

        let id = tree.attach(parent, descriptor);
        let node = tree.node_mut(id);
        node.loaded = true;
        node.requiredby.push(requester);

        match lock {
            Some(lock) => Placement::Inflate(id, lock),
            None => Placement::Load(id),
        }
    }

    /// Build `node`'s subtree straight from lock entries.
    ///
    /// Every entry becomes a loaded child at exactly the position the lock
    /// gives it; no placement search is done.
    pub fn inflate(&self, node: NodeId, lock: LockDependencies) -> BoxFuture<'_, Result<(), PkgError>> {
        async move {
            let base_dir = self.with_tree(|tree| tree.node(node).realpath.clone()).await;
            let base_dir = &base_dir;

            let results = join_all(lock.into_iter().map(|(name, entry)| async move {
                let mut descriptor = self.provider.resolve(&entry.spec(&name), base_dir).await?;
                descriptor.lock = None;
                self.keep_warnings(&mut descriptor).await;

                let child = self
                    .with_tree(|tree| {
                        let child = tree.attach(node, descriptor);
                        let child_node = tree.node_mut(child);
                        child_node.loaded = true;
                        child_node.requiredby = vec![node];
                        child
                    })
                    .await;

                if !entry.dependencies.is_empty() {
                    self.inflate(child, entry.dependencies).await?;
                }
                Ok::<_, PkgError>(())
            }))
            .await;
            self.first_failure(node, results).await
        }
        .boxed()
    }

    /// Drop subtrees that failed to load.
    ///
    /// A failure spreads to every requester that needs the failed node
    /// through a non-optional edge. Failed nodes are then unlinked, along
    /// with any node no surviving package requires. Nodes nobody requested
    /// (packages kept from the installed tree) stay.
    ///
    /// # Errors
    /// Returns the stored failure once it reaches the root.
    pub async fn settle(&self) -> Result<(), PkgError> {
        let mut tree = self.tree.lock().await;
        let root = tree.root();
        let nodes = tree.descendants(root);
        let attached: HashSet<NodeId> = nodes.iter().copied().chain([root]).collect();

        let mut pending: Vec<NodeId> = nodes
            .iter()
            .copied()
            .filter(|&id| tree.node(id).failed.is_some())
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let mut skipped = Vec::new();
        while let Some(failed) = pending.pop() {
            let node = tree.node(failed);
            let Some(err) = node.failed.clone() else {
                continue;
            };
            let name = node.package.name.clone();
            for requester in node.requiredby.clone() {
                let requester_node = tree.node(requester);
                if !attached.contains(&requester) || requester_node.failed.is_some() {
                    continue;
                }
                if requester_node.package.is_optional(&name) {
                    skipped.push(PkgWarning::optional_skipped(&name, &err));
                    continue;
                }
                if requester == root {
                    return Err(err);
                }
                tree.node_mut(requester).failed = Some(err.clone());
                pending.push(requester);
            }
        }

        let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut live = HashSet::from([root]);
        let mut queue = vec![root];
        for &id in &nodes {
            let node = tree.node(id);
            if node.failed.is_some() {
                continue;
            }
            let anchored = node.requiredby.is_empty()
                || node.requiredby.iter().any(|r| !attached.contains(r));
            if anchored {
                live.insert(id);
                queue.push(id);
            } else {
                for &requester in &node.requiredby {
                    dependents.entry(requester).or_default().push(id);
                }
            }
        }
        while let Some(id) = queue.pop() {
            for &dependent in dependents.get(&id).into_iter().flatten() {
                if live.insert(dependent) {
                    queue.push(dependent);
                }
            }
        }

        for id in nodes {
            if !live.contains(&id) {
                tree.detach(id);
            }
        }
        drop(tree);

        let mut warnings = self.warnings.lock().await;
        for warning in skipped {
            if !warnings.iter().any(|w| w.code == warning.code && w.subject == warning.subject) {
                warnings.push(warning);
            }
        }
        Ok(())
    }
}

/// The range a descriptor must satisfy: its requested spec, else its version.
fn requested_range(descriptor: &Descriptor) -> String {
    descriptor
        .requested
        .as_ref()
        .map(|r| r.spec.as_str())
        .filter(|spec| !spec.is_empty())
        .unwrap_or(&descriptor.version)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use crate::pkg::provider::StaticProvider;
    use crate::pkg::version::SemverPredicate;
    use std::path::PathBuf;

    fn root_tree(root: Descriptor) -> Tree {
        Tree::new(root, PathBuf::from("/p"))
    }

    fn names(tree: &Tree, id: NodeId) -> Vec<String> {
        tree.node(id)
            .children
            .values()
            .map(|&c| tree.node(c).package.id())
            .collect()
    }

    #[tokio::test]
    async fn test_load_deps_hoists() {
        let provider = StaticProvider::new()
            .with(Descriptor::new("a", "1.0.0").with_dependency("b", "^1.0.0"))
            .with(Descriptor::new("b", "1.2.0"));
        let tree = root_tree(Descriptor::new("app", "0.1.0").with_dependency("a", "^1.0.0"));
        let builder = TreeBuilder::new(tree, &provider, &SemverPredicate);

        let root = builder.with_tree(|t| t.root()).await;
        builder.load_deps(root).await.unwrap();
        let (tree, warnings) = builder.finish();

        assert!(warnings.is_empty());
        assert_eq!(names(&tree, root), vec!["a@1.0.0", "b@1.2.0"]);
        let b = tree.child_named(root, "b").unwrap();
        let a = tree.child_named(root, "a").unwrap();
        assert_eq!(tree.node(b).requiredby, vec![a]);
        assert!(tree.node(b).loaded);
    }

    #[tokio::test]
    async fn test_existing_node_adopts_request() {
        let provider = StaticProvider::new().with(Descriptor::new("b", "2.0.0"));
        let mut tree = root_tree(Descriptor::new("app", "0.1.0"));
        let root = tree.root();
        let b = tree.attach(root, Descriptor::new("b", "2.0.0"));
        let builder = TreeBuilder::new(tree, &provider, &SemverPredicate);

        let added = builder.add_child("b@2.0.0", root).await.unwrap();
        assert_eq!(added, Added { id: b, load: true });

        let (tree, _) = builder.finish();
        let requested = tree.node(b).package.requested.clone().unwrap();
        assert_eq!(requested, Requested::new("2.0.0", RequestKind::Version));
    }

    #[tokio::test]
    async fn test_merge_appends_specs() {
        let provider = StaticProvider::new().with(Descriptor::new("b", "1.3.1"));
        let tree = root_tree(Descriptor::new("app", "0.1.0"));
        let builder = TreeBuilder::new(tree, &provider, &SemverPredicate);
        let root = builder.with_tree(|t| t.root()).await;

        let first = builder.add_child("b@^1.2.0", root).await.unwrap();
        let second = builder.add_child("b@^1.3.0", root).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.load);
        assert!(!second.load);

        let (tree, _) = builder.finish();
        let requested = tree.node(first.id).package.requested.clone().unwrap();
        assert_eq!(requested.spec, "^1.2.0 ^1.3.0");
        assert_eq!(requested.kind, RequestKind::Range);
    }

    #[tokio::test]
    async fn test_merge_skips_repeated_spec() {
        let provider = StaticProvider::new().with(Descriptor::new("b", "1.3.1"));
        let tree = root_tree(Descriptor::new("app", "0.1.0"));
        let builder = TreeBuilder::new(tree, &provider, &SemverPredicate);
        let root = builder.with_tree(|t| t.root()).await;

        for spec in ["b@^1.2.0", "b@^1.3.0", "b@^1.2.0", "b@^1.3.0"] {
            builder.add_child(spec, root).await.unwrap();
        }
        let b = builder.with_tree(|t| t.child_named(root, "b")).await.unwrap();

        let (tree, _) = builder.finish();
        assert_eq!(tree.node(b).package.requested.clone().unwrap().spec, "^1.2.0 ^1.3.0");
    }

    #[tokio::test]
    async fn test_reusing_failed_node_reraises() {
        let provider = StaticProvider::new().with(Descriptor::new("b", "1.0.0"));
        let mut tree = root_tree(Descriptor::new("app", "0.1.0"));
        let root = tree.root();
        let b = tree.attach(root, Descriptor::new("b", "1.0.0"));
        tree.node_mut(b).loaded = true;
        tree.node_mut(b).failed = Some(PkgError::not_found("c"));
        let builder = TreeBuilder::new(tree, &provider, &SemverPredicate);

        let err = builder.add_child("b@^1.0.0", root).await.unwrap_err();
        assert_eq!(err.code(), codes::PKG_NOT_FOUND);
        assert_eq!(err.required_by(), ["app@0.1.0"]);
        assert!(builder.settle().await.is_err());
    }

    #[tokio::test]
    async fn test_settle_keeps_unrequested_nodes() {
        let provider = StaticProvider::new();
        let mut tree = root_tree(Descriptor::new("app", "0.1.0"));
        let root = tree.root();
        let kept = tree.attach(root, Descriptor::new("kept", "1.0.0"));
        let opt = tree.attach(root, Descriptor::new("opt", "1.0.0"));
        tree.node_mut(opt).requiredby.push(root);
        tree.node_mut(opt).failed = Some(PkgError::not_found("x"));
        let dep = tree.attach(root, Descriptor::new("dep", "1.0.0"));
        tree.node_mut(dep).requiredby.push(opt);
        tree.node_mut(root).package = Descriptor::new("app", "0.1.0")
            .with_optional_dependency("opt", "^1.0.0");
        let builder = TreeBuilder::new(tree, &provider, &SemverPredicate);

        builder.settle().await.unwrap();
        let (tree, warnings) = builder.finish();
        assert_eq!(tree.descendants(root), vec![kept]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, codes::PKG_OPTIONAL_SKIPPED);
    }

    #[tokio::test]
    async fn test_error_carries_requester_chain() {
        let provider = StaticProvider::new()
            .with(Descriptor::new("a", "1.0.0").with_dependency("missing", "^1.0.0"));
        let tree = root_tree(Descriptor::new("app", "0.1.0").with_dependency("a", "^1.0.0"));
        let builder = TreeBuilder::new(tree, &provider, &SemverPredicate);
        let root = builder.with_tree(|t| t.root()).await;

        let err = builder.load_deps(root).await.unwrap_err();
        assert_eq!(err.code(), codes::PKG_NOT_FOUND);
        assert_eq!(err.required_by(), ["a@1.0.0", "app@0.1.0"]);
    }

    #[tokio::test]
    async fn test_inflate_trusts_lock_layout() {
        let lock: LockDependencies = serde_json::from_str(
            r#"{
                "a": { "version": "1.0.0", "dependencies": { "b": { "version": "1.0.0" } } },
                "b": { "version": "2.0.0" }
            }"#,
        )
        .unwrap();
        let provider = StaticProvider::new()
            .with(Descriptor::new("a", "1.0.0").with_dependency("b", "^1.0.0"))
            .with(Descriptor::new("b", "1.0.0"))
            .with(Descriptor::new("b", "2.0.0"));
        let tree = root_tree(Descriptor::new("app", "0.1.0"));
        let builder = TreeBuilder::new(tree, &provider, &SemverPredicate);
        let root = builder.with_tree(|t| t.root()).await;

        builder.inflate(root, lock).await.unwrap();
        let (tree, _) = builder.finish();

        assert_eq!(names(&tree, root), vec!["a@1.0.0", "b@2.0.0"]);
        let a = tree.child_named(root, "a").unwrap();
        assert_eq!(names(&tree, a), vec!["b@1.0.0"]);
        assert!(tree.descendants(root).iter().all(|&id| tree.node(id).loaded));
        let nested = tree.child_named(a, "b").unwrap();
        assert_eq!(tree.node(nested).requiredby, vec![a]);
    }
}
