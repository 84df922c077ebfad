//! Trying one source provider after another.

use tracing::debug;

use super::file::FileSourceProvider;
use super::source::{BundledSourceProvider, SourceError, SourceProvider, SourceStream};

/// Opens a path with `main`, falling back to `fallback` when `main` reports a
/// recoverable failure.
///
/// - `main` succeeds: its stream is returned and `fallback` is never called.
/// - both fail recoverably: [`SourceError::ConfigurationSourceNotFound`] with
///   `main`'s error as the cause and `fallback`'s error as suppressed.
/// - `main` fails non-recoverably: that error is returned as is.
/// - `fallback` fails non-recoverably: that error is returned with `main`'s
///   error appended to its suppressed list.
///
/// The usual composition is the filesystem first and bundled documents second,
/// see [`file_or_bundled`].
#[derive(Debug, Clone)]
pub struct FallbackSourceProvider<M, F> {
    main: M,
    fallback: F,
}

impl<M, F> FallbackSourceProvider<M, F>
where
    M: SourceProvider,
    F: SourceProvider,
{
    pub fn new(main: M, fallback: F) -> Self {
        Self { main, fallback }
    }
}

impl<M, F> SourceProvider for FallbackSourceProvider<M, F>
where
    M: SourceProvider,
    F: SourceProvider,
{
    fn open(&self, path: &str) -> Result<SourceStream, SourceError> {
        let main_error = match self.main.open(path) {
            Ok(stream) => return Ok(stream),
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => e,
        };

        debug!(path, error = %main_error, "main source provider failed, trying fallback");

        match self.fallback.open(path) {
            Ok(stream) => Ok(stream),
            Err(fallback_error) if fallback_error.is_recoverable() => {
                Err(SourceError::ConfigurationSourceNotFound {
                    path: path.to_string(),
                    cause: Box::new(main_error),
                    suppressed: vec![fallback_error],
                })
            }
            Err(fallback_error) => Err(fallback_error.with_suppressed(main_error)),
        }
    }
}

/// The filesystem first, then documents bundled into the binary.
pub fn file_or_bundled(
    bundled: BundledSourceProvider,
) -> FallbackSourceProvider<FileSourceProvider, BundledSourceProvider> {
    FallbackSourceProvider::new(FileSourceProvider::new(), bundled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stream(contents: &'static str) -> Result<SourceStream, SourceError> {
        Ok(Box::new(Cursor::new(contents)))
    }

    fn read_all(mut stream: SourceStream) -> String {
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_main_provider_success() {
        let fallback_calls = AtomicUsize::new(0);
        let provider = FallbackSourceProvider::new(
            |_: &str| stream("main"),
            |_: &str| {
                fallback_calls.fetch_add(1, Ordering::SeqCst);
                stream("fallback")
            },
        );

        assert_eq!(read_all(provider.open("app.yml").unwrap()), "main");
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fallback_provider_success() {
        let provider = FallbackSourceProvider::new(
            |path: &str| -> Result<SourceStream, SourceError> { Err(SourceError::not_found(path)) },
            |_: &str| stream("fallback"),
        );

        assert_eq!(read_all(provider.open("app.yml").unwrap()), "fallback");
    }

    #[test]
    fn test_both_providers_not_found() {
        let provider = FallbackSourceProvider::new(
            |path: &str| -> Result<SourceStream, SourceError> { Err(SourceError::not_found(path)) },
            |path: &str| -> Result<SourceStream, SourceError> {
                Err(SourceError::Unreadable {
                    path: path.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "no bundle"),
                })
            },
        );

        let err = provider.open("app.yml").err().unwrap();
        match &err {
            SourceError::ConfigurationSourceNotFound {
                path,
                cause,
                suppressed,
            } => {
                assert_eq!(path, "app.yml");
                assert!(matches!(**cause, SourceError::NotFound { .. }));
                assert_eq!(suppressed.len(), 1);
                assert!(matches!(suppressed[0], SourceError::Unreadable { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_main_failure_is_propagated_without_fallback() {
        let fallback_calls = AtomicUsize::new(0);
        let provider = FallbackSourceProvider::new(
            |path: &str| -> Result<SourceStream, SourceError> { Err(SourceError::failed(path, "bug in main")) },
            |_: &str| {
                fallback_calls.fetch_add(1, Ordering::SeqCst);
                stream("fallback")
            },
        );

        let err = provider.open("app.yml").err().unwrap();
        assert!(matches!(err, SourceError::Failed { ref message, .. } if message == "bug in main"));
        assert!(err.suppressed().is_empty());
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fallback_failure_carries_main_error() {
        let provider = FallbackSourceProvider::new(
            |path: &str| -> Result<SourceStream, SourceError> { Err(SourceError::not_found(path)) },
            |path: &str| -> Result<SourceStream, SourceError> { Err(SourceError::failed(path, "bug in fallback")) },
        );

        let err = provider.open("app.yml").err().unwrap();
        assert!(matches!(err, SourceError::Failed { ref message, .. } if message == "bug in fallback"));
        assert_eq!(err.suppressed().len(), 1);
        assert!(matches!(err.suppressed()[0], SourceError::NotFound { .. }));
    }

    #[test]
    fn test_file_or_bundled_prefers_filesystem() {
        let dir = tempfile::TempDir::new().unwrap();
        let on_disk = dir.path().join("app.conf");
        std::fs::write(&on_disk, "from = disk").unwrap();
        let on_disk = on_disk.to_str().unwrap().to_string();

        let bundled = BundledSourceProvider::new()
            .with_document(on_disk.clone(), "from = bundle")
            .with_document("bundled-only.conf", "from = bundle");
        let provider = file_or_bundled(bundled);

        assert_eq!(read_all(provider.open(&on_disk).unwrap()), "from = disk");
        assert_eq!(
            read_all(provider.open("bundled-only.conf").unwrap()),
            "from = bundle"
        );
    }
}
