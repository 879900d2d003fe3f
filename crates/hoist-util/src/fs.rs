use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Read a file that is allowed to be absent.
///
/// Returns `Ok(None)` when the file does not exist. Invalid UTF-8 is replaced
/// with the replacement character rather than failing the read.
///
/// # Errors
/// Returns an error for any I/O failure other than `NotFound`.
pub fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Sibling temp path used by [`atomic_write`].
fn temp_path_for(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new("."));
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
    parent.join(format!(".{file_name}.hoist-tmp.{}", std::process::id()))
}

/// Atomically replace a file's contents: write a sibling temp file, sync, rename.
///
/// Readers observe either the old contents or the new contents, never a
/// partial write.
///
/// # Errors
/// Returns an error if the write or rename fails. The temp file is removed on
/// failure.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp_path = temp_path_for(path);

    let written = File::create(&temp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    match fs::rename(&temp_path, path) {
        Ok(()) => Ok(()),
        // Windows refuses to rename over an existing file.
        Err(_) if cfg!(windows) => {
            let copied = fs::copy(&temp_path, path).map(|_| ());
            let _ = fs::remove_file(&temp_path);
            copied
        }
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            Err(e)
        }
    }
}

/// List the entry names of a directory in sorted order.
///
/// A missing directory yields an empty list.
///
/// # Errors
/// Returns an error if the directory exists but cannot be read.
pub fn sorted_dir_names(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_optional_missing() {
        let dir = tempdir().unwrap();
        let content = read_optional(&dir.path().join("package.json")).unwrap();
        assert!(content.is_none());
    }

    #[test]
    fn test_read_optional_lossy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("package.json");
        fs::write(&path, [0x7b, 0x7d, 0x80]).unwrap();

        let content = read_optional(&path).unwrap().unwrap();
        assert!(content.starts_with("{}"));
        assert!(content.contains('\u{FFFD}'));
    }

    #[test]
    fn test_atomic_write_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("package.json");

        atomic_write(&path, b"{}").unwrap();
        atomic_write(&path, b"{\"name\":\"x\"}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"name\":\"x\"}");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("npm-shrinkwrap.json");

        atomic_write(&path, b"{}").unwrap();

        let names = sorted_dir_names(dir.path()).unwrap();
        assert_eq!(names, vec!["npm-shrinkwrap.json".to_string()]);
    }

    #[test]
    fn test_sorted_dir_names() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();
        fs::create_dir(dir.path().join("@scope")).unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();

        let names = sorted_dir_names(dir.path()).unwrap();
        assert_eq!(names, vec!["@scope", "alpha", "zeta"]);

        assert!(sorted_dir_names(&dir.path().join("missing")).unwrap().is_empty());
    }
}
