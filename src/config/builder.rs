use serde::de::DeserializeOwned;
use tracing::debug;

use super::environment::{reduce, MissingEnvironment};
use super::loader::load_from;
use super::overrides::Overrides;
use super::resolve::resolve;
use super::secret::overlay;
use super::source::SourceProvider;
use super::value::{ConfigPath, ConfigValue};
use super::ConfigError;

/// Builds resolved configuration from a document, its environment sections,
/// an optional secrets document and override values.
///
/// The pipeline for one build:
///
/// 1. The `env` override selects environments (`env=test,local`). Without it
///    the build fails before any source is opened.
/// 2. The document at `path` is opened with the provider and parsed; `.yml`
///    and `.yaml` are YAML, `.toml` is TOML, anything else is native syntax.
/// 3. `environments.<name>` sections are layered over the document, the first
///    listed environment winning.
/// 4. If the `secret` override names a secrets document, it is loaded through
///    the same provider, reduced for the same environments and layered on top.
/// 5. `${...}` substitutions are resolved against the overrides, the tree and
///    the `variables` section, and the result is rendered as compact JSON with
///    `variables` and `environments` removed.
///
/// The factory only holds options, so one instance can serve any number of
/// concurrent builds.
///
/// ## Example
///
/// ```no_run
/// use dragon_conf::{ConfigFactory, FileSourceProvider, Overrides};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct MyConfig {
///     name: String,
///     port: u16,
/// }
///
/// let overrides = Overrides::from_process();
/// let config: MyConfig = ConfigFactory::builder()
///     .with_property_prefix("myapp")
///     .build(&FileSourceProvider::new(), "config/app.yml", &overrides)?;
/// # Ok::<(), dragon_conf::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
#[must_use = "builders do nothing until .build() is called"]
pub struct ConfigFactory {
    property_prefix: Option<String>,
    missing_environments: MissingEnvironment,
    environment_key: Option<ConfigPath>,
    override_keys: Option<(String, String)>,
}

impl ConfigFactory {
    /// Creates a new configuration factory.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Also accepts `<prefix>.env` and `<prefix>.secret` when the plain `env`
    /// and `secret` overrides are not set.
    pub fn with_property_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.property_prefix = Some(prefix.into());
        self
    }

    /// What to do when a selected environment has no section in the main
    /// document. Defaults to [`MissingEnvironment::Fail`].
    pub fn with_missing_environments(mut self, policy: MissingEnvironment) -> Self {
        self.missing_environments = policy;
        self
    }

    /// Writes the selected environments, comma separated, into the tree at
    /// `key` so the application can see which environments it runs with.
    pub fn with_environment_key(mut self, key: ConfigPath) -> Self {
        self.environment_key = Some(key);
        self
    }

    /// Maps overrides named `<prefix><separator><path>` onto config values, as
    /// the highest-precedence layer.
    ///
    /// With prefix `MYAPP` and separator `__`, `MYAPP__DATABASE__PORT=5432`
    /// sets `database.port` to `5432`. Path segments are lowercased and values
    /// are coerced to booleans or numbers when they read back unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `separator` is empty.
    pub fn with_override_keys(mut self, prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        assert!(!separator.is_empty(), "separator must not be empty");
        self.override_keys = Some((prefix.into(), separator));
        self
    }

    /// Runs the pipeline and returns the resolved configuration as compact JSON.
    pub fn build_string<P>(&self, provider: &P, path: &str, overrides: &Overrides) -> Result<String, ConfigError>
    where
        P: SourceProvider + ?Sized,
    {
        let prefix = self.property_prefix.as_deref();
        let selector = overrides.environments(prefix)?;
        debug!(path, environments = %selector, "building config");

        let document = load_from(provider, path)?;
        let mut config = reduce(&document, &selector, self.missing_environments)?;

        if let Some(key) = &self.environment_key {
            config = config.with_value(key, ConfigValue::String(selector.to_string()));
        }

        let config = overlay(config, overrides.secret_path(prefix), &selector, |secret_path| {
            load_from(provider, secret_path)
        })?;

        let config = match &self.override_keys {
            Some((prefix, separator)) => overrides.to_tree(prefix, separator).with_fallback(&config),
            None => config,
        };

        resolve(&config, overrides)
    }

    /// Runs the pipeline and deserializes the result into `T`.
    ///
    /// This performs deserialization once at build time rather than on each access,
    /// making subsequent config reads zero-cost.
    pub fn build<T, P>(&self, provider: &P, path: &str, overrides: &Overrides) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
        P: SourceProvider + ?Sized,
    {
        let resolved = self.build_string(provider, path, overrides)?;
        serde_json::from_str(&resolved).map_err(ConfigError::DeserializeError)
    }
}
