//! Marking consumed files so they are never loaded twice.

use std::io;
use std::path::{Path, PathBuf};

/// Prefix added to the base name of a handled file.
pub const MARKER_PREFIX: &str = ".";

/// `dir/name` -> `dir/.name`. `None` if the path has no file name.
pub fn marked_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let mut marked = std::ffi::OsString::from(MARKER_PREFIX);
    marked.push(name);
    Some(path.with_file_name(marked))
}

/// Rename `path` to its marked name in the same directory.
pub async fn mark_processed(path: &Path) -> io::Result<PathBuf> {
    let target = marked_path(path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    tokio::fs::rename(path, &target).await?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_marked_path() {
        assert_eq!(
            marked_path(Path::new("/data/appsinstalled/a.tsv.gz")),
            Some(PathBuf::from("/data/appsinstalled/.a.tsv.gz"))
        );
        assert_eq!(
            marked_path(Path::new("a.tsv.gz")),
            Some(PathBuf::from(".a.tsv.gz"))
        );
        assert_eq!(marked_path(Path::new("/")), None);
    }

    #[tokio::test]
    async fn test_mark_processed_renames_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tsv.gz");
        std::fs::write(&path, b"x").unwrap();

        let target = mark_processed(&path).await.unwrap();
        assert_eq!(target, dir.path().join(".a.tsv.gz"));
        assert!(!path.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_mark_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(mark_processed(&dir.path().join("gone.tsv.gz")).await.is_err());
    }
}
