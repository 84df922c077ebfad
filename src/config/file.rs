//! Filesystem configuration source.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::source::{SourceError, SourceProvider, SourceStream};

/// Opens configuration documents from the filesystem.
///
/// Relative paths are resolved against the base directory when one is set,
/// otherwise against the process working directory. A missing file is a
/// recoverable [`SourceError::NotFound`]; any other I/O failure, including the
/// path naming a directory, is a recoverable [`SourceError::Unreadable`].
#[derive(Debug, Clone, Default)]
pub struct FileSourceProvider {
    base_dir: Option<PathBuf>,
}

impl FileSourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative paths against `dir`.
    pub fn with_base_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: Some(dir.as_ref().to_path_buf()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(path),
            None => PathBuf::from(path),
        }
    }
}

impl SourceProvider for FileSourceProvider {
    fn open(&self, path: &str) -> Result<SourceStream, SourceError> {
        let full_path = self.resolve(path);
        let io_error = |source: io::Error| match source.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound {
                path: full_path.display().to_string(),
                source,
            },
            _ => SourceError::Unreadable {
                path: full_path.display().to_string(),
                source,
            },
        };

        if full_path.is_dir() {
            return Err(io_error(io::Error::new(
                io::ErrorKind::Other,
                "path is a directory",
            )));
        }

        let file = File::open(&full_path).map_err(io_error)?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_file_provider_opens_existing_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "key = \"value\"").unwrap();

        let provider = FileSourceProvider::new();
        let mut contents = String::new();
        provider
            .open(file.path().to_str().unwrap())
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();

        assert_eq!(contents, "key = \"value\"\n");
    }

    #[test]
    fn test_file_provider_resolves_against_base_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.conf"), "a = 1").unwrap();

        let provider = FileSourceProvider::with_base_dir(dir.path());
        assert!(provider.open("app.conf").is_ok());
    }

    #[test]
    fn test_file_provider_missing_is_not_found() {
        let provider = FileSourceProvider::new();
        let err = provider
            .open("/nonexistent/path/config.conf")
            .err()
            .unwrap();

        assert!(matches!(err, SourceError::NotFound { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_file_provider_directory_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let provider = FileSourceProvider::new();
        let err = provider.open(dir.path().to_str().unwrap()).err().unwrap();

        assert!(matches!(err, SourceError::Unreadable { .. }));
        assert!(err.is_recoverable());
    }
}
