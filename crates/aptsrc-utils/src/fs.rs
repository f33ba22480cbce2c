use std::{
    fs,
    io::Write,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::error::{FileSystemError, FileSystemResult};

/// Removes the specified file or directory, ignoring paths that do not exist.
///
/// Directories are removed recursively.
///
/// # Errors
///
/// Returns a [`FileSystemError::File`] if the removal fails for any reason other than
/// the path not existing.
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(());
    }

    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|err| FileSystemError::File {
        path: path.to_path_buf(),
        action: "remove",
        source: err,
    })
}

/// Creates a directory structure if it doesn't exist.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| FileSystemError::Directory {
            path: path.to_path_buf(),
            action: "create",
            source: err,
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

const NEW_FILE_MODE: u32 = 0o644;

/// Writes `contents` to `path` atomically.
///
/// The data is written to a temporary file in the destination directory and then
/// renamed over the destination, so readers never observe a partially written file.
/// An existing file's permissions are carried over to the replacement; new files
/// are created `0644` instead of the private temp file mode.
///
/// # Errors
///
/// Returns [`FileSystemError::File`] when the temporary file cannot be created, written or
/// persisted. Callers can check [`FileSystemError::is_permission_denied`] to decide whether
/// the write should be retried with elevated privileges.
pub fn write_atomic<P: AsRef<Path>>(path: P, contents: &[u8]) -> FileSystemResult<()> {
    let path = path.as_ref();
    let parent = parent_dir(path);

    let file_err = |action: &'static str| {
        let path = path.to_path_buf();
        move |err: std::io::Error| FileSystemError::File {
            path,
            action,
            source: err,
        }
    };

    let mut temp = NamedTempFile::new_in(&parent).map_err(file_err("create"))?;
    temp.write_all(contents).map_err(file_err("write"))?;
    temp.as_file().sync_all().map_err(file_err("sync"))?;

    // New files must stay world-readable for APT.
    let permissions = match fs::metadata(path) {
        Ok(metadata) => metadata.permissions(),
        Err(_) => fs::Permissions::from_mode(NEW_FILE_MODE),
    };
    fs::set_permissions(temp.path(), permissions).map_err(file_err("set permissions on"))?;

    temp.persist(path)
        .map_err(|err| file_err("replace")(err.error))?;

    Ok(())
}

/// Reads a file to a string, mapping failures to [`FileSystemError::File`].
pub fn read_to_string<P: AsRef<Path>>(path: P) -> FileSystemResult<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|err| FileSystemError::File {
        path: path.to_path_buf(),
        action: "read",
        source: err,
    })
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn test_safe_remove_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("old.list");
        fs::write(&file_path, "deb http://example.com/ubuntu focal main\n").unwrap();
        safe_remove(&file_path).unwrap();
        assert!(!file_path.exists());
    }

    #[test]
    fn test_safe_remove_non_existent() {
        let dir = tempdir().unwrap();
        safe_remove(dir.path().join("missing.sources")).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists() {
        let dir = tempdir().unwrap();
        let new_dir = dir.path().join("sources.list.d");
        ensure_dir_exists(&new_dir).unwrap();
        assert!(new_dir.is_dir());
        ensure_dir_exists(&new_dir).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists_file_collision() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("file.txt");
        fs::write(&file_path, "hello").unwrap();
        assert!(matches!(
            ensure_dir_exists(&file_path),
            Err(FileSystemError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_write_atomic_creates_and_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("example.sources");

        write_atomic(&path, b"Types: deb\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Types: deb\n");

        write_atomic(&path, b"Types: deb deb-src\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Types: deb deb-src\n");

        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_write_atomic_keeps_permissions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keep.list");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        write_atomic(&path, b"new").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn test_write_atomic_new_file_is_world_readable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fresh.sources");

        write_atomic(&path, b"Types: deb\n").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn test_write_atomic_missing_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope").join("x.list");
        let err = write_atomic(&path, b"data").unwrap_err();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotFound));
    }

    #[test]
    fn test_read_to_string_missing() {
        let dir = tempdir().unwrap();
        let err = read_to_string(dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, FileSystemError::File { action: "read", .. }));
    }
}
