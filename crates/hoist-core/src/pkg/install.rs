//! Install planning: current tree, ideal tree, and the actions between them.

use super::builder::TreeBuilder;
use super::diff::{diff, Action, ActionSummary};
use super::error::{PkgError, PkgWarning};
use super::installed::read_installed_tree;
use super::manifest::read_package_dir;
use super::provider::MetadataProvider;
use super::save::{save_requested, SaveTarget, DEFAULT_SAVE_PREFIX};
use super::spec::PackageSpec;
use super::tree::Tree;
use super::version::VersionPredicate;
use std::path::Path;

/// Installer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Skip development dependencies.
    pub production: bool,
    /// Manifest section to record requested packages in.
    pub save: Option<SaveTarget>,
    /// Record exact versions instead of prefixed ranges.
    pub save_exact: bool,
    /// Prefix for recorded versions.
    pub save_prefix: String,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            production: false,
            save: None,
            save_exact: false,
            save_prefix: DEFAULT_SAVE_PREFIX.to_string(),
        }
    }
}

impl InstallOptions {
    /// Set production mode.
    #[must_use]
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Set the save target.
    #[must_use]
    pub fn with_save(mut self, save: Option<SaveTarget>) -> Self {
        self.save = save;
        self
    }

    /// Set exact saving.
    #[must_use]
    pub fn with_save_exact(mut self, save_exact: bool) -> Self {
        self.save_exact = save_exact;
        self
    }
}

/// The outcome of planning an install.
#[derive(Debug, Clone)]
pub struct InstallPlan {
    /// What is on disk.
    pub current: Tree,
    /// What should be on disk.
    pub ideal: Tree,
    /// Recoverable problems found while planning.
    pub warnings: Vec<PkgWarning>,
}

impl InstallPlan {
    /// Actions that turn the current tree into the ideal tree.
    #[must_use]
    pub fn actions(&self) -> Vec<Action<'_>> {
        diff(&self.current, &self.ideal)
    }

    /// Serializable form of [`InstallPlan::actions`].
    #[must_use]
    pub fn action_summaries(&self) -> Vec<ActionSummary> {
        self.actions().iter().map(Action::summary).collect()
    }

    /// Record requested packages in the manifest, if a save target is set.
    ///
    /// Save failures are added to the plan's warnings.
    pub fn save(&mut self, options: &InstallOptions) {
        if options.save.is_some() {
            let warnings = save_requested(&self.ideal, options);
            self.warnings.extend(warnings);
        }
    }
}

/// Plan an install of `specs` into the project at `project_root`.
///
/// With no specifiers the manifest's dependency maps are installed, or the
/// lock descriptor when the project has one.
///
/// # Errors
/// Returns the first non-optional resolution failure, or a manifest/lock
/// parse error.
pub async fn plan_install(
    project_root: &Path,
    specs: &[String],
    provider: &dyn MetadataProvider,
    predicate: &dyn VersionPredicate,
    options: &InstallOptions,
) -> Result<InstallPlan, PkgError> {
    let root_dir = dunce::canonicalize(project_root).map_err(|e| {
        PkgError::io(format!("Failed to resolve {}: {e}", project_root.display()))
    })?;

    let mut warnings = Vec::new();
    let mut root = read_package_dir(&root_dir, &mut warnings)?;
    let lock = root.lock.take();

    let current = read_installed_tree(&root_dir, root, &mut warnings);
    let ideal = current.clone();

    let specs: Vec<String> = specs
        .iter()
        .filter(|spec| !is_project_dir(spec, &root_dir))
        .cloned()
        .collect();

    let builder = TreeBuilder::new(ideal, provider, predicate);
    let root_id = builder.with_tree(|tree| tree.root()).await;

    if let Some(lock) = lock {
        builder.with_tree(|tree| tree.clear_children(root_id)).await;
        builder.inflate(root_id, lock).await?;
    } else if specs.is_empty() {
        builder.with_tree(|tree| tree.clear_children(root_id)).await;
    }

    builder.load_deps(root_id).await?;
    if !specs.is_empty() {
        builder
            .load_requested_deps(&specs, root_id, options.save)
            .await?;
    }
    if !options.production {
        builder.load_dev_deps(root_id).await?;
    }
    builder.settle().await?;

    let (ideal, build_warnings) = builder.finish();
    warnings.extend(build_warnings);

    Ok(InstallPlan {
        current,
        ideal,
        warnings,
    })
}

/// True if `spec` names the project directory itself.
fn is_project_dir(spec: &str, root_dir: &Path) -> bool {
    match PackageSpec::parse(spec) {
        Ok(PackageSpec::Directory { path, .. }) => {
            dunce::canonicalize(root_dir.join(path)).is_ok_and(|p| p == root_dir)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::lockfile::LOCKFILE_NAME;
    use crate::pkg::manifest::{Descriptor, MANIFEST_NAME};
    use crate::pkg::provider::StaticProvider;
    use crate::pkg::version::SemverPredicate;
    use std::fs;
    use tempfile::tempdir;

    fn provider() -> StaticProvider {
        StaticProvider::new()
            .with(Descriptor::new("a", "1.0.0").with_dependency("b", "^1.0.0"))
            .with(Descriptor::new("a", "1.1.0").with_dependency("b", "^1.0.0"))
            .with(Descriptor::new("b", "1.0.0"))
            .with(Descriptor::new("t", "3.0.0"))
    }

    fn project(manifest: &str) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_NAME), manifest).unwrap();
        dir
    }

    fn install_pkg(root: &Path, name: &str, version: &str) {
        let dir = root.join("node_modules").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(MANIFEST_NAME),
            format!(r#"{{"name": "{name}", "version": "{version}"}}"#),
        )
        .unwrap();
    }

    fn verbs(plan: &InstallPlan) -> Vec<(String, String)> {
        plan.actions()
            .iter()
            .map(|a| (a.verb().to_string(), a.node().package.id()))
            .collect()
    }

    #[tokio::test]
    async fn test_fresh_install_adds_everything() {
        let dir = project(r#"{"name": "app", "version": "0.1.0", "dependencies": {"a": "^1.0.0"}}"#);
        let plan = plan_install(dir.path(), &[], &provider(), &SemverPredicate, &InstallOptions::default())
            .await
            .unwrap();

        assert_eq!(
            verbs(&plan),
            vec![
                ("add".to_string(), "a@1.1.0".to_string()),
                ("add".to_string(), "b@1.0.0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_installed_tree_needs_no_actions() {
        let dir = project(r#"{"name": "app", "version": "0.1.0", "dependencies": {"b": "^1.0.0"}}"#);
        install_pkg(dir.path(), "b", "1.0.0");

        let plan = plan_install(dir.path(), &[], &provider(), &SemverPredicate, &InstallOptions::default())
            .await
            .unwrap();
        assert!(plan.actions().is_empty());
    }

    #[tokio::test]
    async fn test_extraneous_package_is_removed() {
        let dir = project(r#"{"name": "app", "version": "0.1.0"}"#);
        install_pkg(dir.path(), "old", "0.5.0");

        let plan = plan_install(dir.path(), &[], &provider(), &SemverPredicate, &InstallOptions::default())
            .await
            .unwrap();
        assert_eq!(verbs(&plan), vec![("remove".to_string(), "old@0.5.0".to_string())]);
    }

    #[tokio::test]
    async fn test_requested_spec_keeps_installed_packages() {
        let dir = project(r#"{"name": "app", "version": "0.1.0"}"#);
        install_pkg(dir.path(), "b", "1.0.0");

        let options = InstallOptions::default().with_save(Some(SaveTarget::Dependencies));
        let plan = plan_install(dir.path(), &["t@^3.0.0".to_string()], &provider(), &SemverPredicate, &options)
            .await
            .unwrap();

        assert_eq!(verbs(&plan), vec![("add".to_string(), "t@3.0.0".to_string())]);
        let root = plan.ideal.root();
        let t = plan.ideal.child_named(root, "t").unwrap();
        assert_eq!(plan.ideal.node(t).save, Some(SaveTarget::Dependencies));
    }

    #[tokio::test]
    async fn test_production_skips_dev() {
        let dir = project(r#"{"name": "app", "devDependencies": {"t": "^3.0.0"}}"#);
        let options = InstallOptions::default().with_production(true);
        let plan = plan_install(dir.path(), &[], &provider(), &SemverPredicate, &options)
            .await
            .unwrap();
        assert!(plan.actions().is_empty());

        let plan = plan_install(dir.path(), &[], &provider(), &SemverPredicate, &InstallOptions::default())
            .await
            .unwrap();
        assert_eq!(verbs(&plan), vec![("add".to_string(), "t@3.0.0".to_string())]);
    }

    #[tokio::test]
    async fn test_lock_pins_versions() {
        let dir = project(r#"{"name": "app", "dependencies": {"a": "^1.0.0"}}"#);
        fs::write(
            dir.path().join(LOCKFILE_NAME),
            r#"{"name": "app", "dependencies": {"a": {"version": "1.0.0"}, "b": {"version": "1.0.0"}}}"#,
        )
        .unwrap();

        let plan = plan_install(dir.path(), &[], &provider(), &SemverPredicate, &InstallOptions::default())
            .await
            .unwrap();
        assert_eq!(
            verbs(&plan),
            vec![
                ("add".to_string(), "a@1.0.0".to_string()),
                ("add".to_string(), "b@1.0.0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_optional_is_not_planned() {
        let dir = project(
            r#"{"name": "app", "dependencies": {"b": "^1.0.0"}, "optionalDependencies": {"opt": "^1.0.0"}}"#,
        );
        let provider = provider().with(Descriptor::new("opt", "1.0.0").with_dependency("gone", "^1.0.0"));
        let plan = plan_install(dir.path(), &[], &provider, &SemverPredicate, &InstallOptions::default())
            .await
            .unwrap();

        assert_eq!(verbs(&plan), vec![("add".to_string(), "b@1.0.0".to_string())]);
        assert_eq!(plan.warnings.len(), 1);
        assert_eq!(plan.warnings[0].subject, "opt");
    }

    #[tokio::test]
    async fn test_project_dir_spec_is_ignored() {
        let dir = project(r#"{"name": "app", "version": "0.1.0"}"#);
        let plan = plan_install(dir.path(), &[".".to_string()], &provider(), &SemverPredicate, &InstallOptions::default())
            .await
            .unwrap();
        assert!(plan.actions().is_empty());
    }

    #[tokio::test]
    async fn test_missing_manifest_is_empty_project() {
        let dir = tempdir().unwrap();
        let plan = plan_install(dir.path(), &[], &provider(), &SemverPredicate, &InstallOptions::default())
            .await
            .unwrap();
        assert!(plan.actions().is_empty());
    }

    #[tokio::test]
    async fn test_save_writes_manifest() {
        let dir = project(r#"{"name": "app", "version": "0.1.0"}"#);
        let options = InstallOptions::default().with_save(Some(SaveTarget::DevDependencies));
        let mut plan = plan_install(dir.path(), &["t".to_string()], &provider(), &SemverPredicate, &options)
            .await
            .unwrap();
        plan.save(&options);
        assert!(plan.warnings.is_empty(), "{:?}", plan.warnings);

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(MANIFEST_NAME)).unwrap()).unwrap();
        assert_eq!(manifest["devDependencies"]["t"], "^3.0.0");
    }
}
