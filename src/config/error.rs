use thiserror::Error;

use super::source::SourceError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("unable to load config from '{path}', because {source}")]
    SourceMissing { path: String, source: SourceError },

    #[error("failed to read config source '{path}': {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config source '{origin}' at line {line}: {message}")]
    ParseError {
        origin: String,
        line: usize,
        message: String,
    },

    #[error("failed to parse YAML config source '{origin}': {source}")]
    YamlError {
        origin: String,
        source: serde_yaml::Error,
    },

    #[error("failed to parse TOML config source '{origin}': {source}")]
    TomlError {
        origin: String,
        source: toml::de::Error,
    },

    #[error("override '{key}' is required and must have a corresponding section in the config file. Example: {key}=local")]
    RequiredOverrideMissing { key: String },

    #[error("environment '{environment}' was selected but the config has no '{path}' section")]
    EnvironmentSectionMissing { environment: String, path: String },

    #[error("environment section '{path}' must be an object, found {found}")]
    EnvironmentSectionInvalid { path: String, found: &'static str },

    #[error("unable to load secrets from '{path}': {source}")]
    SecretSourceUnreadable {
        path: String,
        source: Box<ConfigError>,
    },

    #[error("could not resolve substitution {reference} at '{at}'")]
    UnresolvedReference { reference: String, at: String },

    #[error("circular reference detected in configuration at '{0}'")]
    CircularReference(String),

    #[error("invalid reference path: {0}")]
    InvalidReferencePath(String),

    #[error("unclosed reference (missing '}}') in \"{0}\"")]
    UnclosedReference(String),

    #[error("cannot concatenate {found} into a string at '{at}'")]
    InvalidConcatenation { at: String, found: &'static str },

    #[error("failed to serialize resolved config: {0}")]
    SerializeError(String),

    #[error("failed to deserialize config: {0}")]
    DeserializeError(#[from] serde_json::Error),
}
