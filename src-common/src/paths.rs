//! Validation of flush destination directories.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Maximum path length in characters.
pub const MAX_PATH_LENGTH: usize = 4096;

/// Path validation error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path contains a null byte")]
    ContainsNullByte,
    #[error("path too long: {0} chars")]
    TooLong(usize),
    #[error("path must be absolute")]
    NotAbsolute,
    #[error("cannot resolve path: {0}")]
    CannotCanonicalize(String),
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("{} is read-only", .0.display())]
    ReadOnly(PathBuf),
}

/// Resolve a flush destination to an existing, writable directory.
///
/// Performs, in order:
/// 1. Rejects paths containing null bytes
/// 2. Rejects paths that are too long
/// 3. Requires absolute paths
/// 4. Canonicalizes the path to resolve symlinks and `..`
/// 5. Requires the result to be a directory that is not read-only
pub fn resolve_destination(path: &Path) -> Result<PathBuf, PathError> {
    let path_str = path.to_string_lossy();

    if path_str.contains('\0') {
        return Err(PathError::ContainsNullByte);
    }

    if path_str.len() > MAX_PATH_LENGTH {
        return Err(PathError::TooLong(path_str.len()));
    }

    if !path.is_absolute() {
        return Err(PathError::NotAbsolute);
    }

    let canonical =
        std::fs::canonicalize(path).map_err(|e| PathError::CannotCanonicalize(e.to_string()))?;

    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| PathError::CannotCanonicalize(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(PathError::NotADirectory(canonical));
    }
    if metadata.permissions().readonly() {
        return Err(PathError::ReadOnly(canonical));
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_destination(dir.path()).unwrap();
        assert_eq!(resolved, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_resolves_traversal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("shots")).unwrap();
        let path = dir.path().join("shots").join("..").join("shots");
        let resolved = resolve_destination(&path).unwrap();
        assert!(resolved.ends_with("shots"));
    }

    #[test]
    fn test_rejects_relative_path() {
        let path = PathBuf::from("relative/path");
        assert_eq!(resolve_destination(&path), Err(PathError::NotAbsolute));
    }

    #[test]
    fn test_rejects_null_byte() {
        let path = PathBuf::from("/home/user\0/shots");
        assert_eq!(resolve_destination(&path), Err(PathError::ContainsNullByte));
    }

    #[test]
    fn test_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        assert!(matches!(
            resolve_destination(&path),
            Err(PathError::CannotCanonicalize(_))
        ));
    }

    #[test]
    fn test_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("frame.jpg");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            resolve_destination(&file),
            Err(PathError::NotADirectory(_))
        ));
    }
}
