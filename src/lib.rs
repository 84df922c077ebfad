pub mod config;
pub mod duration;

pub use config::{
    BundledSourceProvider, ConfigError, ConfigFactory, ConfigTree, EnvironmentSelector,
    FallbackSourceProvider, FileSourceProvider, MissingEnvironment, Overrides, SourceError,
    SourceProvider, SourceStream,
};
pub use duration::{ConfigDuration, DurationError, DurationUnit};
