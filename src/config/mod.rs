//! Layered configuration loading and resolution.

mod builder;
mod environment;
mod error;
mod fallback;
mod file;
mod loader;
mod overrides;
mod parse;
mod render;
mod resolve;
mod secret;
mod source;
mod toml_doc;
mod value;
mod yaml;

pub use builder::ConfigFactory;
pub use environment::{reduce, EnvironmentSelector, MissingEnvironment, ENVIRONMENTS_KEY};
pub use error::ConfigError;
pub use fallback::{file_or_bundled, FallbackSourceProvider};
pub use file::FileSourceProvider;
pub use loader::{load, load_from, Syntax};
pub use overrides::{Overrides, ENV_KEY, SECRET_KEY};
pub use parse::parse_document;
pub use render::{concise, display};
pub use resolve::{debug_requested, resolve, resolve_references, DEBUG_LOGGER, VARIABLES_KEY};
pub use secret::overlay;
pub use source::{BundledSourceProvider, SourceError, SourceProvider, SourceStream};
pub use toml_doc::parse_toml;
pub use value::{ConfigObject, ConfigPath, ConfigTree, ConfigValue, Reference};
pub use yaml::{normalize, unquote_placeholders};
