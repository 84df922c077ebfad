//! Externally supplied override values.
//!
//! Overrides are a flat `key -> string` map handed to the factory explicitly.
//! They select environments (`env`), point at a secrets document (`secret`) and
//! answer substitutions with the highest precedence. Reading them from the
//! process environment is opt-in through [`Overrides::from_process`].
//!
//! A substituted override is typed: `true`/`false` become booleans and
//! numbers that print back unchanged become numbers, so `port = ${PORT}`
//! deserializes into a `u16`. To keep such a value a string, concatenate it
//! with an empty string: `password = ${PW}""` is `"123456"` for `PW=123456`.

use std::collections::BTreeMap;

use super::environment::EnvironmentSelector;
use super::value::{ConfigObject, ConfigPath, ConfigTree, ConfigValue};
use super::ConfigError;

/// Override selecting the environments, e.g. `env=test,local`.
pub const ENV_KEY: &str = "env";

/// Override naming the secrets document.
pub const SECRET_KEY: &str = "secret";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    values: BTreeMap<String, String>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every variable in the process environment.
    pub fn from_process() -> Self {
        std::env::vars().collect()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The first of `keys` that is set to a non-blank value.
    pub fn first_available<'a>(&'a self, keys: &[&str]) -> Option<&'a str> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .find(|value| !value.trim().is_empty())
    }

    /// The selected environments, from `env` or else `<prefix>.env`.
    pub fn environments(&self, prefix: Option<&str>) -> Result<EnvironmentSelector, ConfigError> {
        self.prefixed(ENV_KEY, prefix)
            .and_then(EnvironmentSelector::from_list)
            .ok_or_else(|| ConfigError::RequiredOverrideMissing {
                key: ENV_KEY.to_string(),
            })
    }

    /// The secrets document path, from `secret` or else `<prefix>.secret`.
    pub fn secret_path(&self, prefix: Option<&str>) -> Option<&str> {
        self.prefixed(SECRET_KEY, prefix).map(str::trim)
    }

    fn prefixed(&self, key: &str, prefix: Option<&str>) -> Option<&str> {
        let prefixed = prefix.map(|p| format!("{p}.{key}"));
        let mut keys = vec![key];
        keys.extend(prefixed.as_deref());
        self.first_available(&keys)
    }

    /// Answers a substitution. The key is the path as written, so `${a.b}`
    /// looks up the override named `a.b`. The value is typed as described in
    /// the module docs.
    pub(crate) fn lookup(&self, path: &ConfigPath) -> Option<ConfigValue> {
        let key = path.segments().join(".");
        self.get(&key).map(coerce_value)
    }

    /// Maps prefixed keys onto a tree: with prefix `MYAPP` and separator `__`,
    /// `MYAPP__DATABASE__PORT=5432` becomes `database.port = 5432`.
    pub(crate) fn to_tree(&self, prefix: &str, separator: &str) -> ConfigTree {
        let prefix_with_sep = format!("{prefix}{separator}");
        let mut tree = ConfigTree::new(ConfigObject::new(), &format!("overrides {prefix_with_sep}*"));

        for (key, value) in &self.values {
            let Some(path_str) = key.strip_prefix(&prefix_with_sep) else {
                continue;
            };
            if path_str.is_empty() {
                continue;
            }

            let path = ConfigPath::new(
                path_str
                    .split(separator)
                    .map(|s| s.to_lowercase())
                    .collect(),
            );
            tree = tree.with_value(&path, coerce_value(value));
        }

        tree
    }
}

impl<K, V> FromIterator<(K, V)> for Overrides
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Converts a string override to the most specific type it represents
/// without losing information: boolean, integer, float, then string.
fn coerce_value(s: &str) -> ConfigValue {
    if s.eq_ignore_ascii_case("true") {
        return ConfigValue::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return ConfigValue::Bool(false);
    }

    // "007" and "+1" do not print back the same and stay strings
    if looks_like_integer(s) {
        if let Ok(i) = s.parse::<i64>() {
            if i.to_string() == s {
                return ConfigValue::Integer(i);
            }
        }
    }

    // same for "1.50"
    if s.contains('.') {
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() && f.to_string() == s {
                return ConfigValue::Float(f);
            }
        }
    }

    ConfigValue::String(s.to_string())
}

fn looks_like_integer(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
