//! Opening configuration documents by symbolic path.
//!
//! A [`SourceProvider`] turns a path such as `"config.yml"` into a byte stream.
//! Where the bytes come from is up to the provider: the filesystem
//! ([`FileSourceProvider`](super::FileSourceProvider)), documents bundled into
//! the binary ([`BundledSourceProvider`]), or a chain of both
//! ([`FallbackSourceProvider`](super::FallbackSourceProvider)).

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use thiserror::Error;

/// An open configuration document. Dropping it releases the underlying resource.
pub type SourceStream = Box<dyn Read + Send>;

/// Resolves a symbolic path into a readable stream.
///
/// Any `Fn(&str) -> Result<SourceStream, SourceError>` closure is a provider,
/// which keeps tests and one-off integrations short:
///
/// ```
/// use std::io::Cursor;
/// use dragon_conf::{SourceError, SourceProvider, SourceStream};
///
/// let provider = |_path: &str| -> Result<SourceStream, SourceError> {
///     Ok(Box::new(Cursor::new(b"a = 1".to_vec())))
/// };
/// assert!(provider.open("anything.conf").is_ok());
/// ```
pub trait SourceProvider: Send + Sync {
    fn open(&self, path: &str) -> Result<SourceStream, SourceError>;
}

impl<F> SourceProvider for F
where
    F: Fn(&str) -> Result<SourceStream, SourceError> + Send + Sync,
{
    fn open(&self, path: &str) -> Result<SourceStream, SourceError> {
        self(path)
    }
}

/// Failure to open a configuration document.
///
/// Recoverable failures mean "not here, try elsewhere" and let a
/// [`FallbackSourceProvider`](super::FallbackSourceProvider) move on to its
/// second provider. [`SourceError::Failed`] is not recoverable and is never
/// masked by a fallback.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
    #[error("'{path}' was not found: {source}")]
    NotFound { path: String, source: io::Error },

    #[error("'{path}' could not be opened: {source}")]
    Unreadable { path: String, source: io::Error },

    #[error("no source provider was able to resolve configuration from '{path}', because {cause}{}", describe(.suppressed))]
    ConfigurationSourceNotFound {
        path: String,
        #[source]
        cause: Box<SourceError>,
        suppressed: Vec<SourceError>,
    },

    #[error("provider failed on '{path}': {message}")]
    Failed {
        path: String,
        message: String,
        suppressed: Vec<SourceError>,
    },
}

fn describe(suppressed: &[SourceError]) -> String {
    suppressed
        .iter()
        .map(|e| format!(", and {e}"))
        .collect()
}

impl SourceError {
    pub fn not_found(path: impl Into<String>) -> Self {
        SourceError::NotFound {
            path: path.into(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such document"),
        }
    }

    pub fn failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Failed {
            path: path.into(),
            message: message.into(),
            suppressed: Vec::new(),
        }
    }

    /// Returns `true` if another provider may still be able to open the path.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SourceError::Failed { .. })
    }

    /// Secondary failures recorded alongside this one.
    pub fn suppressed(&self) -> &[SourceError] {
        match self {
            SourceError::ConfigurationSourceNotFound { suppressed, .. }
            | SourceError::Failed { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// Records `other` as a secondary failure.
    ///
    /// Only variants that carry a suppressed list keep it; the others are
    /// returned unchanged.
    pub fn with_suppressed(mut self, other: SourceError) -> Self {
        match &mut self {
            SourceError::ConfigurationSourceNotFound { suppressed, .. }
            | SourceError::Failed { suppressed, .. } => suppressed.push(other),
            _ => {}
        }
        self
    }
}

/// Documents compiled into the binary, looked up by exact path.
///
/// ```
/// use dragon_conf::{BundledSourceProvider, SourceProvider};
///
/// let bundled = BundledSourceProvider::new()
///     .with_document("default.conf", "app.name = demo");
/// assert!(bundled.open("default.conf").is_ok());
/// assert!(bundled.open("other.conf").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct BundledSourceProvider {
    documents: BTreeMap<String, Arc<[u8]>>,
}

impl BundledSourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document(mut self, path: impl Into<String>, contents: impl AsRef<[u8]>) -> Self {
        self.documents
            .insert(path.into(), Arc::from(contents.as_ref()));
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.documents.contains_key(path)
    }
}

impl SourceProvider for BundledSourceProvider {
    fn open(&self, path: &str) -> Result<SourceStream, SourceError> {
        let contents = self
            .documents
            .get(path)
            .ok_or_else(|| SourceError::not_found(path))?;
        Ok(Box::new(Cursor::new(Arc::clone(contents))))
    }
}
