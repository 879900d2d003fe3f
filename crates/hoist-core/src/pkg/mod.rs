//! Install planning.
//!
//! Provides:
//! - Parsing package specifiers (name@range, folders, tarball URLs)
//! - npm range matching on top of semver
//! - Metadata providers (in-memory and npm registry)
//! - Ideal tree building with hoisting and lock inflation
//! - Reading the installed tree from `node_modules`
//! - Diffing trees into add/update/remove actions
//! - Saving requested packages back to `package.json`

pub mod builder;
pub mod diff;
pub mod error;
pub mod install;
pub mod installed;
pub mod locker;
pub mod lockfile;
pub mod manifest;
pub mod placement;
pub mod provider;
pub mod registry;
pub mod save;
pub mod spec;
pub mod tree;
pub mod version;

pub use builder::{Added, TreeBuilder};
pub use diff::{diff, equivalent, flatten, Action, ActionSummary};
pub use error::{codes as pkg_codes, PkgError, PkgWarning};
pub use install::{plan_install, InstallOptions, InstallPlan};
pub use installed::read_installed_tree;
pub use locker::{ProjectLock, INSTALL_LOCK_NAME};
pub use lockfile::{LockDependencies, LockEntry, Lockfile, LOCKFILE_NAME};
pub use manifest::{read_package_dir, Descriptor, RequestKind, Requested, MANIFEST_NAME};
pub use placement::{earliest_installable, find_requirement};
pub use provider::{MetadataProvider, StaticProvider};
pub use registry::{RegistryClient, RegistryProvider, DEFAULT_REGISTRY, REGISTRY_ENV};
pub use save::{compute_version_spec, save_requested, SaveEntry, SaveTarget};
pub use spec::PackageSpec;
pub use tree::{Node, NodeId, Tree, NODE_MODULES};
pub use version::{max_satisfying, satisfies, SemverPredicate, VersionPredicate};
