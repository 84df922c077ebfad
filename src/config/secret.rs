//! Layering a separately sourced secrets document over the configuration.

use tracing::debug;

use super::environment::{reduce, EnvironmentSelector, MissingEnvironment};
use super::value::ConfigTree;
use super::ConfigError;

/// Layers the secrets document at `secret_path` over `config`.
///
/// Without a path `config` is returned unchanged. The secrets document is
/// loaded with `load` and reduced for the same environments as the main
/// document; sections it does not have are skipped, since secrets usually
/// exist for only some environments. Its values win over everything in
/// `config`. Any failure to load or reduce it is a
/// [`ConfigError::SecretSourceUnreadable`].
pub fn overlay<L>(
    config: ConfigTree,
    secret_path: Option<&str>,
    selector: &EnvironmentSelector,
    load: L,
) -> Result<ConfigTree, ConfigError>
where
    L: FnOnce(&str) -> Result<ConfigTree, ConfigError>,
{
    let Some(path) = secret_path else {
        return Ok(config);
    };

    let unreadable = |source: ConfigError| ConfigError::SecretSourceUnreadable {
        path: path.to_string(),
        source: Box::new(source),
    };

    let secrets = load(path).map_err(unreadable)?;
    let secrets = reduce(&secrets, selector, MissingEnvironment::Skip).map_err(unreadable)?;

    debug!(path, environments = %selector, "layering secrets over config");
    Ok(secrets.with_fallback(&config))
}
