//! Atomic file writes, so a report is either fully written or absent

use bestflags_core::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write data to a file atomically by writing to a temporary file in the
/// same directory and renaming it into place
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(|e| Error::file_system(parent, "create parent directory", e))?;

    let mut file = NamedTempFile::new_in(parent)
        .map_err(|e| Error::file_system(parent, "create temporary file", e))?;
    file.write_all(content)
        .map_err(|e| Error::file_system(file.path(), "write to temporary file", e))?;
    file.as_file()
        .sync_all()
        .map_err(|e| Error::file_system(file.path(), "sync temporary file", e))?;

    // The temporary file is removed if the rename fails.
    file.persist(path)
        .map_err(|e| Error::file_system(path, "atomic rename", e.error))?;
    Ok(())
}

/// Write string content to a file atomically
pub fn write_atomic_string(path: &Path, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_and_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("report.json");

        write_atomic_string(&file_path, "{\"rounds\": 1}").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "{\"rounds\": 1}");

        write_atomic_string(&file_path, "{\"rounds\": 2}").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "{\"rounds\": 2}");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("out").join("nested").join("report.json");

        write_atomic(&file_path, b"{}").unwrap();
        assert!(file_path.exists());
        let leftovers = fs::read_dir(file_path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
