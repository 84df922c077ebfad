//! Folding environment sections over the base document.
//!
//! A document carries deployment-specific values under
//! `environments.<name>`. Reducing it for a selector such as `test,local`
//! layers `environments.test` over `environments.local` over the rest of the
//! document, then drops the `environments` section.

use std::fmt;

use tracing::warn;

use super::value::{ConfigPath, ConfigTree, ConfigValue};
use super::ConfigError;

/// Root section holding the environment overlays.
pub const ENVIRONMENTS_KEY: &str = "environments";

/// An ordered, non-empty list of environment names. Earlier names win.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSelector {
    names: Vec<String>,
}

impl EnvironmentSelector {
    /// Parses a comma separated list such as `"test, local"`.
    ///
    /// Blank entries are ignored; returns `None` when nothing is left.
    pub fn from_list(list: &str) -> Option<Self> {
        let names: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        (!names.is_empty()).then_some(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl fmt::Display for EnvironmentSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names.join(","))
    }
}

/// What to do when a selected environment has no section in the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingEnvironment {
    /// Fail with [`ConfigError::EnvironmentSectionMissing`].
    #[default]
    Fail,
    /// Log a warning and continue without it.
    Skip,
}

/// Specializes `tree` for the selected environments.
///
/// The result never contains the `environments` section.
pub fn reduce(
    tree: &ConfigTree,
    selector: &EnvironmentSelector,
    policy: MissingEnvironment,
) -> Result<ConfigTree, ConfigError> {
    let mut sections = Vec::with_capacity(selector.names().len());

    for name in selector.names() {
        let path = ConfigPath::key(ENVIRONMENTS_KEY).child(name.as_str());
        match tree.get(&path) {
            Some(ConfigValue::Object(section)) => {
                sections.push(ConfigTree::new(
                    section.clone(),
                    &format!("{path} in {}", tree.origin()),
                ));
            }
            Some(other) => {
                return Err(ConfigError::EnvironmentSectionInvalid {
                    path: path.to_string(),
                    found: other.type_name(),
                })
            }
            None => match policy {
                MissingEnvironment::Fail => {
                    return Err(ConfigError::EnvironmentSectionMissing {
                        environment: name.clone(),
                        path: path.to_string(),
                    })
                }
                MissingEnvironment::Skip => {
                    warn!(
                        environment = %name,
                        origin = tree.origin(),
                        "selected environment has no section, skipping"
                    );
                }
            },
        }
    }

    let base = tree.without_path(&ConfigPath::key(ENVIRONMENTS_KEY));
    let reduced = sections
        .iter()
        .rev()
        .fold(base, |acc, section| section.with_fallback(&acc));

    Ok(reduced)
}
