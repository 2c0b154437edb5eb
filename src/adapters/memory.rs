//! In-memory filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::ports::filesystem::FileSystem;

/// Filesystem kept entirely in memory, for tests and embedding.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<PathBuf, String>>,
}

impl MemoryFileSystem {
    /// Creates an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, replacing any existing one.
    #[must_use]
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.into(), contents.into());
        }
        self
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(
        &self,
        path: &Path,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let files = self.files.lock().map_err(|e| e.to_string())?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| format!("File not found: {}", path.display()).into())
    }

    fn write(
        &self,
        path: &Path,
        contents: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut files = self.files.lock().map_err(|e| e.to_string())?;
        files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .is_ok_and(|files| files.contains_key(path) || files.keys().any(|k| k.starts_with(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_written_file() {
        let fs = MemoryFileSystem::new().with_file("/p/a.yaml", "a: 1");
        assert_eq!(fs.read_to_string(Path::new("/p/a.yaml")).unwrap(), "a: 1");
        assert!(fs.exists(Path::new("/p")));
        fs.write(Path::new("/p/b.json"), "{}").unwrap();
        assert!(fs.exists(Path::new("/p/b.json")));
        assert!(fs.read_to_string(Path::new("/p/c.json")).is_err());
    }
}
