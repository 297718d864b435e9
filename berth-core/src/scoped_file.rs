//! Scoped temporary files
//!
//! Secret and TLS material is written once to a single-use file whose path is
//! handed to the consumer. The file is removed when the [`ScopedFile`] is
//! dropped, so every exit path of the owning operation cleans it up.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Prefix for every scoped file created by berth
const FILE_PREFIX: &str = "berth-";

/// A temporary file holding sensitive material, deleted on drop
#[derive(Debug)]
pub struct ScopedFile {
    file: NamedTempFile,
}

impl ScopedFile {
    /// Writes `contents` to a new temporary file in the system temp directory.
    ///
    /// The file is created with owner-only permissions.
    pub fn write(label: &str, contents: &[u8]) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{FILE_PREFIX}{label}-"))
            .tempfile()?;
        file.write_all(contents)?;
        file.flush()?;

        debug!("Wrote scoped file {}", file.path().display());
        Ok(Self { file })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Deletes the file now, reporting failures instead of ignoring them.
    pub fn close(self) -> std::io::Result<()> {
        let path = self.file.path().to_path_buf();
        self.file.close().inspect_err(|e| {
            warn!("Failed to delete scoped file {}: {}", path.display(), e);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contents_written() {
        let file = ScopedFile::write("secret", b"hunter2").unwrap();
        let read = std::fs::read(file.path()).unwrap();
        assert_eq!(read, b"hunter2");
    }

    #[test]
    fn test_deleted_on_drop() {
        let file = ScopedFile::write("secret", b"x").unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_close_deletes() {
        let file = ScopedFile::write("ca", b"pem").unwrap();
        let path = file.path().to_path_buf();
        file.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_prefix() {
        let file = ScopedFile::write("secret", b"x").unwrap();
        let name = file.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("berth-secret-"));
    }
}
