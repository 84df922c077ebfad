//! Turning a path and its bytes into a [`ConfigTree`].

use std::io::Read;
use std::path::Path;

use tracing::debug;

use super::parse::parse_document;
use super::source::SourceProvider;
use super::toml_doc::parse_toml;
use super::value::ConfigTree;
use super::yaml::normalize;
use super::ConfigError;

/// Document syntax, chosen from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// The native syntax, which also accepts JSON.
    Native,
    Yaml,
    Toml,
}

impl Syntax {
    /// `.yml` and `.yaml` are YAML, `.toml` is TOML and anything else is native.
    pub fn from_path(path: &str) -> Self {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("yml" | "yaml") => Syntax::Yaml,
            Some("toml") => Syntax::Toml,
            _ => Syntax::Native,
        }
    }
}

/// Parses document bytes. An empty document is an empty tree.
pub fn load(bytes: &[u8], syntax: Syntax, origin: &str) -> Result<ConfigTree, ConfigError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ConfigError::ParseError {
        origin: origin.to_string(),
        line: line_of(bytes, e.valid_up_to()),
        message: format!("document is not valid UTF-8: {e}"),
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    match syntax {
        Syntax::Native => parse_document(text, origin),
        Syntax::Yaml => normalize(text, origin),
        Syntax::Toml => parse_toml(text, origin),
    }
}

/// Opens `path` with `provider` and parses it, choosing the syntax from the path.
///
/// The stream is read completely and released before parsing starts.
pub fn load_from<P>(provider: &P, path: &str) -> Result<ConfigTree, ConfigError>
where
    P: SourceProvider + ?Sized,
{
    let bytes = {
        let mut stream = provider
            .open(path)
            .map_err(|source| ConfigError::SourceMissing {
                path: path.to_string(),
                source,
            })?;
        let mut bytes = Vec::new();
        stream
            .read_to_end(&mut bytes)
            .map_err(|source| ConfigError::ReadError {
                path: path.to_string(),
                source,
            })?;
        bytes
    };

    let syntax = Syntax::from_path(path);
    debug!(path, ?syntax, bytes = bytes.len(), "loading config source");
    load(&bytes, syntax, path)
}

fn line_of(bytes: &[u8], offset: usize) -> usize {
    bytes[..offset].iter().filter(|&&b| b == b'\n').count() + 1
}
