use crate::pkg::MANIFEST_NAME;
use std::path::{Path, PathBuf};

/// Find the project root by walking up from `cwd` looking for `package.json`.
///
/// Returns the first directory containing one, or `None` if none is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|dir| dir.join(MANIFEST_NAME).is_file())
        .map(Path::to_path_buf)
}
