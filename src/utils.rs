use std::io;
use std::path::Path;

use tracing::{info, warn};

/// File name for one burst image: `<prefix><epoch-millis>_<index>.<ext>`
pub fn image_file_name(prefix: &str, epoch_millis: i64, index: usize, extension: &str) -> String {
    format!("{}{}_{:02}.{}", prefix, epoch_millis, index, extension)
}

/// Delete every regular file directly inside `dir`, creating the directory if
/// it does not exist. Files that cannot be removed are logged and skipped.
/// Returns how many files were deleted.
pub fn clear_directory(dir: &Path) -> io::Result<usize> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
        }
    }

    info!("Cleared {} file(s) from {}", removed, dir.display());
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_layout() {
        assert_eq!(
            image_file_name("image_", 1_700_000_000_123, 3, "jpg"),
            "image_1700000000123_03.jpg"
        );
    }

    #[test]
    fn clear_removes_files_but_keeps_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"b").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        assert_eq!(clear_directory(dir.path()).unwrap(), 2);
        let left: Vec<_> = std::fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(left.len(), 1);
        assert!(left[0].path().is_dir());
    }

    #[test]
    fn clear_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("captures");
        assert_eq!(clear_directory(&target).unwrap(), 0);
        assert!(target.is_dir());
    }
}
