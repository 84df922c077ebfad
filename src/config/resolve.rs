//! Substitution resolution for configuration trees.
//!
//! `${path}` and `${?path}` are looked up, in order, in the override values,
//! at `path` in the tree, and at `variables.<path>`. Resolution runs in passes
//! against a snapshot of the previous pass until nothing is left to resolve,
//! so references may point forwards, backwards or at other references.

use tracing::debug;

use super::environment::ENVIRONMENTS_KEY;
use super::overrides::Overrides;
use super::render::{self, concise};
use super::value::{concatenate, ConfigObject, ConfigPath, ConfigTree, ConfigValue, Reference};
use super::ConfigError;

/// Root section for values that only exist to be substituted.
pub const VARIABLES_KEY: &str = "variables";

/// Logger name that turns on the resolved-config dump, e.g.
/// `logging.loggers."dragon_conf::config::resolve" = DEBUG`.
pub const DEBUG_LOGGER: &str = module_path!();

/// Resolves `tree` and serializes it as compact JSON.
///
/// The `variables` and `environments` sections are not part of the output.
pub fn resolve(tree: &ConfigTree, overrides: &Overrides) -> Result<String, ConfigError> {
    let resolved = resolve_references(tree, overrides)?
        .without_path(&ConfigPath::key(VARIABLES_KEY))
        .without_path(&ConfigPath::key(ENVIRONMENTS_KEY));

    if debug_requested(&resolved) {
        debug!(origin = resolved.origin(), "resolved config:\n{}", render::display(&resolved));
    }

    concise(&resolved)
}

/// Replaces every substitution in `tree` with the value it refers to.
///
/// A target set to `null` counts as no target. A required substitution with
/// no target fails with [`ConfigError::UnresolvedReference`]. An optional one
/// with no target removes the field or list element holding it, and
/// contributes nothing to a concatenation. Substitutions that can only be satisfied by each other are
/// reported as [`ConfigError::CircularReference`].
pub fn resolve_references(tree: &ConfigTree, overrides: &Overrides) -> Result<ConfigTree, ConfigError> {
    let mut current = tree.clone();

    while !current.is_resolved() {
        let mut pass = Pass {
            snapshot: current.root(),
            overrides,
            progress: 0,
        };
        let root = pass.object(current.root().clone(), &ConfigPath::root())?;

        if pass.progress == 0 {
            let at = first_unresolved(current.root(), &ConfigPath::root()).unwrap_or_default();
            return Err(ConfigError::CircularReference(at.to_string()));
        }

        current = ConfigTree::new(root, current.origin());
    }

    Ok(current)
}

/// Returns `true` if the tree asks for the resolved config to be logged:
/// `logging.loggers."<DEBUG_LOGGER>"` set to `debug` or `trace`, either
/// directly or as the logger's `level`.
pub fn debug_requested(tree: &ConfigTree) -> bool {
    let path = ConfigPath::new(vec![
        "logging".to_string(),
        "loggers".to_string(),
        DEBUG_LOGGER.to_string(),
    ]);

    let level = match tree.get(&path) {
        Some(ConfigValue::String(level)) => level,
        Some(ConfigValue::Object(logger)) => match logger.get("level") {
            Some(ConfigValue::String(level)) => level,
            _ => return false,
        },
        _ => return false,
    };

    level.eq_ignore_ascii_case("debug") || level.eq_ignore_ascii_case("trace")
}

enum Lookup {
    Found(ConfigValue),
    Missing,
    /// The target exists but is not resolved yet.
    Blocked,
}

/// One resolution pass. Lookups only see the snapshot.
struct Pass<'a> {
    snapshot: &'a ConfigObject,
    overrides: &'a Overrides,
    progress: usize,
}

impl Pass<'_> {
    fn object(&mut self, obj: ConfigObject, at: &ConfigPath) -> Result<ConfigObject, ConfigError> {
        let mut out = ConfigObject::new();
        for (key, value) in obj {
            let path = at.child(key.as_str());
            if let Some(value) = self.value(value, &path)? {
                out.insert(key, value);
            }
        }
        Ok(out)
    }

    /// `None` removes the value from its parent.
    fn value(&mut self, value: ConfigValue, at: &ConfigPath) -> Result<Option<ConfigValue>, ConfigError> {
        match value {
            ConfigValue::Reference(reference) => Ok(match self.substitute(&reference, at)? {
                Lookup::Found(value) => Some(value),
                Lookup::Missing => None,
                Lookup::Blocked => Some(ConfigValue::Reference(reference)),
            }),
            ConfigValue::Concat(pieces) => self.concat(pieces, at),
            ConfigValue::Merge(layers) => self.merge(layers, at),
            ConfigValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    if let Some(item) = self.value(item, &at.child(i.to_string()))? {
                        out.push(item);
                    }
                }
                Ok(Some(ConfigValue::List(out)))
            }
            ConfigValue::Object(obj) => Ok(Some(ConfigValue::Object(self.object(obj, at)?))),
            other => Ok(Some(other)),
        }
    }

    fn concat(&mut self, pieces: Vec<ConfigValue>, at: &ConfigPath) -> Result<Option<ConfigValue>, ConfigError> {
        let mut out = Vec::with_capacity(pieces.len());
        let mut blocked = false;

        for piece in pieces {
            match piece {
                ConfigValue::Reference(reference) => match self.substitute(&reference, at)? {
                    Lookup::Found(value) => out.push(value),
                    Lookup::Missing => {}
                    Lookup::Blocked => {
                        blocked = true;
                        out.push(ConfigValue::Reference(reference));
                    }
                },
                other => {
                    if let Some(value) = self.value(other, at)? {
                        blocked |= !value.is_resolved();
                        out.push(value);
                    }
                }
            }
        }

        if blocked {
            return Ok(Some(ConfigValue::Concat(out)));
        }
        self.progress += 1;
        concatenate(out, at)
    }

    /// Resolves layers from the top down. Lower layers only count while every
    /// layer above them is an object; the first other value hides the rest.
    fn merge(&mut self, mut layers: Vec<ConfigValue>, at: &ConfigPath) -> Result<Option<ConfigValue>, ConfigError> {
        let mut merged: Option<ConfigValue> = None;

        while let Some(layer) = layers.pop() {
            let Some(value) = self.value(layer, at)? else {
                continue;
            };
            if value.is_pending() {
                layers.push(value);
                layers.extend(merged);
                return Ok(Some(ConfigValue::Merge(layers)));
            }

            let is_object = matches!(value, ConfigValue::Object(_));
            merged = Some(match merged {
                Some(upper) => upper.with_fallback(&value, at),
                None => value,
            });
            if !is_object {
                break;
            }
        }

        self.progress += 1;
        Ok(merged)
    }

    /// Only returns [`Lookup::Missing`] for optional references.
    fn substitute(&mut self, reference: &Reference, at: &ConfigPath) -> Result<Lookup, ConfigError> {
        match self.lookup(&reference.path) {
            Lookup::Blocked => Ok(Lookup::Blocked),
            Lookup::Missing if !reference.optional => Err(ConfigError::UnresolvedReference {
                reference: reference.to_string(),
                at: at.to_string(),
            }),
            found_or_missing => {
                self.progress += 1;
                Ok(found_or_missing)
            }
        }
    }

    fn lookup(&self, path: &ConfigPath) -> Lookup {
        if let Some(value) = self.overrides.lookup(path) {
            return Lookup::Found(value);
        }

        match lookup_in(self.snapshot, path.segments()) {
            Lookup::Missing => {
                let in_variables = ConfigPath::key(VARIABLES_KEY).join(path);
                lookup_in(self.snapshot, in_variables.segments())
            }
            found_or_blocked => found_or_blocked,
        }
    }
}

fn lookup_in(obj: &ConfigObject, segments: &[String]) -> Lookup {
    let Some((first, rest)) = segments.split_first() else {
        return Lookup::Missing;
    };

    match obj.get(first) {
        None | Some(ConfigValue::Null) => Lookup::Missing,
        Some(value) if rest.is_empty() => {
            if value.is_resolved() {
                Lookup::Found(value.clone())
            } else {
                Lookup::Blocked
            }
        }
        Some(ConfigValue::Object(child)) => lookup_in(child, rest),
        // The parent may still turn into an object.
        Some(value) if value.is_pending() => Lookup::Blocked,
        Some(_) => Lookup::Missing,
    }
}

fn first_unresolved(obj: &ConfigObject, at: &ConfigPath) -> Option<ConfigPath> {
    obj.iter().find_map(|(key, value)| {
        let path = at.child(key.as_str());
        match value {
            value if value.is_pending() => Some(path),
            ConfigValue::Object(child) => first_unresolved(child, &path),
            ConfigValue::List(items) => items
                .iter()
                .enumerate()
                .find_map(|(i, item)| match item {
                    ConfigValue::Object(child) => first_unresolved(child, &path.child(i.to_string())),
                    other if !other.is_resolved() => Some(path.child(i.to_string())),
                    _ => None,
                }),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse::parse_document;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects everything a test subscriber writes.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn resolve_with_logs(tree: &ConfigTree) -> (String, String) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();

        let output = tracing::subscriber::with_default(subscriber, || resolve(tree, &Overrides::new())).unwrap();
        (output, logs.contents())
    }

    fn make_tree(text: &str) -> ConfigTree {
        parse_document(text, "test.conf").unwrap()
    }

    fn resolved(text: &str) -> ConfigTree {
        resolve_references(&make_tree(text), &Overrides::new()).unwrap()
    }

    fn get(tree: &ConfigTree, path: &str) -> Option<ConfigValue> {
        tree.get(&ConfigPath::parse(path).unwrap()).cloned()
    }

    #[test]
    fn test_simple_reference() {
        let tree = resolved(
            r#"
            host = localhost
            url = "http://"${host}"/api"
            "#,
        );
        assert_eq!(get(&tree, "url"), Some("http://localhost/api".into()));
    }

    #[test]
    fn test_nested_path() {
        let tree = resolved(
            r#"
            server { host = "example.com", port = 8080 }
            client.endpoint = "https://"${server.host}":"${server.port}
            "#,
        );
        assert_eq!(
            get(&tree, "client.endpoint"),
            Some("https://example.com:8080".into())
        );
    }

    #[test]
    fn test_chained_references_in_any_order() {
        let tree = resolved(
            r#"
            c = ${b}"!"
            b = ${a}" world"
            a = hello
            "#,
        );
        assert_eq!(get(&tree, "c"), Some("hello world!".into()));
    }

    #[test]
    fn test_bare_reference_keeps_type() {
        let tree = resolved(
            r#"
            port = 3000
            copy = ${port}
            defaults { timeout = 30, retries = [1, 2] }
            service = ${defaults}
            "#,
        );
        assert_eq!(get(&tree, "copy"), Some(ConfigValue::Integer(3000)));
        assert_eq!(get(&tree, "service.retries"), get(&tree, "defaults.retries"));
    }

    #[test]
    fn test_reference_through_unresolved_parent() {
        let tree = resolved(
            r#"
            url = ${db.host}
            db = ${base}
            base { host = h1 }
            "#,
        );
        assert_eq!(get(&tree, "url"), Some("h1".into()));
    }

    #[test]
    fn test_variables_are_a_fallback_scope() {
        let tree = resolved(
            r#"
            db.password = ${secretVar}
            variables.secretVar = "default value"
            "#,
        );
        assert_eq!(get(&tree, "db.password"), Some("default value".into()));
    }

    #[test]
    fn test_overrides_win_and_are_coerced() {
        let tree = make_tree(
            r#"
            driver = ${driverClass}
            driverClass = fromTree
            port = ${PORT}
            pin = ${PORT}""
            "#,
        );
        let overrides = Overrides::new()
            .with("driverClass", "fromOverride")
            .with("PORT", "5432");
        let tree = resolve_references(&tree, &overrides).unwrap();

        assert_eq!(get(&tree, "driver"), Some("fromOverride".into()));
        assert_eq!(get(&tree, "port"), Some(ConfigValue::Integer(5432)));
        assert_eq!(get(&tree, "pin"), Some("5432".into()));
        assert_eq!(get(&tree, "driverClass"), Some("fromTree".into()));
    }

    #[test]
    fn test_optional_reference() {
        let tree = resolved(
            r#"
            password = ${?DB_PASSWORD}
            hosts = [a, ${?EXTRA_HOST}, b]
            greeting = "hello"${?NAME}
            "#,
        );
        assert_eq!(get(&tree, "password"), None);
        assert_eq!(
            get(&tree, "hosts"),
            Some(ConfigValue::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(get(&tree, "greeting"), Some("hello".into()));
    }

    #[test]
    fn test_missing_reference() {
        let result = resolve_references(
            &make_tree("db { url = ${nonexistent.path} }"),
            &Overrides::new(),
        );
        match result {
            Err(ConfigError::UnresolvedReference { reference, at }) => {
                assert_eq!(reference, "${nonexistent.path}");
                assert_eq!(at, "db.url");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_circular_reference() {
        let result = resolve_references(&make_tree("a = ${b}\nb = ${a}"), &Overrides::new());
        assert!(matches!(result, Err(ConfigError::CircularReference(ref at)) if at == "a"));

        let result = resolve_references(&make_tree("a = ${a}"), &Overrides::new());
        assert!(matches!(result, Err(ConfigError::CircularReference(_))));
    }

    #[test]
    fn test_literal_concatenation_resolves() {
        let tree = resolved("merged = { a = 1 } { b = 2 }\nlist = [1] [2]");
        assert_eq!(get(&tree, "merged.a"), Some(ConfigValue::Integer(1)));
        assert_eq!(get(&tree, "merged.b"), Some(ConfigValue::Integer(2)));
        assert_eq!(
            get(&tree, "list"),
            Some(ConfigValue::List(vec![
                ConfigValue::Integer(1),
                ConfigValue::Integer(2)
            ]))
        );
    }

    #[test]
    fn test_resolve_strips_reserved_sections() {
        let tree = make_tree(
            r#"
            name = ${appName}
            variables.appName = demo
            environments.test.name = other
            "#,
        );
        assert_eq!(resolve(&tree, &Overrides::new()).unwrap(), r#"{"name":"demo"}"#);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let tree = make_tree("b = ${a}\na = [1, 2]\nc { z = 1, y = ${b} }");
        let first = resolve(&tree, &Overrides::new()).unwrap();
        let second = resolve(&tree, &Overrides::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, r#"{"a":[1,2],"b":[1,2],"c":{"y":[1,2],"z":1}}"#);
    }

    #[test]
    fn test_null_target_is_undefined() {
        let result = resolve_references(&make_tree("x = null\ny = ${x}"), &Overrides::new());
        assert!(matches!(
            result,
            Err(ConfigError::UnresolvedReference { ref reference, ref at }) if reference == "${x}" && at == "y"
        ));

        let tree = resolved("x = null\ny = ${?x}\nz = \"a\"${?x}");
        assert_eq!(get(&tree, "y"), None);
        assert_eq!(get(&tree, "z"), Some("a".into()));
    }

    #[test]
    fn test_null_in_tree_falls_back_to_variables() {
        let tree = resolved("password = null\nvariables.password = hunter2\nout = ${password}");
        assert_eq!(get(&tree, "out"), Some("hunter2".into()));
    }

    #[test]
    fn test_object_over_substitution_merges_after_resolution() {
        let tree = make_tree("defaults { url = a, user = u }\ndb = ${defaults}");
        let overlay = make_tree("db.url = b");
        let tree = resolve_references(&overlay.with_fallback(&tree), &Overrides::new()).unwrap();

        assert_eq!(get(&tree, "db.url"), Some("b".into()));
        assert_eq!(get(&tree, "db.user"), Some("u".into()));
        assert_eq!(get(&tree, "defaults.url"), Some("a".into()));
    }

    #[test]
    fn test_substitution_over_object_merges_after_resolution() {
        let tree = resolved(
            r#"
            db { url = a, pool = 5 }
            db = ${extra}
            extra { url = b, user = u }
            "#,
        );
        assert_eq!(get(&tree, "db.url"), Some("b".into()));
        assert_eq!(get(&tree, "db.user"), Some("u".into()));
        assert_eq!(get(&tree, "db.pool"), Some(ConfigValue::Integer(5)));
    }

    #[test]
    fn test_scalar_layer_hides_lower_layers() {
        let tree = resolved(
            r#"
            a { x = 1 }
            a = ${s}
            s = plain
            b = ${?missing}
            b { y = 2 }
            "#,
        );
        assert_eq!(get(&tree, "a"), Some("plain".into()));
        assert_eq!(get(&tree, "b.y"), Some(ConfigValue::Integer(2)));
    }

    #[test]
    fn test_self_reference_extends_overridden_value() {
        let base = make_tree("opts = \"-Xms1g\"\nlist = [a]");
        let overlay = make_tree("opts = ${opts}\" -Xmx2g\"\nlist = ${list} [b]");
        let tree = resolve_references(&overlay.with_fallback(&base), &Overrides::new()).unwrap();

        assert_eq!(get(&tree, "opts"), Some("-Xms1g -Xmx2g".into()));
        assert_eq!(
            get(&tree, "list"),
            Some(ConfigValue::List(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_resolve_dumps_config_when_requested() {
        let tree = make_tree(&format!(
            "name = ${{appName}}\nvariables.appName = demo\nlogging.loggers.\"{DEBUG_LOGGER}\" = DEBUG"
        ));
        let (output, logs) = resolve_with_logs(&tree);

        assert!(output.contains(r#""name":"demo""#));
        assert!(logs.contains("resolved config"), "{logs}");
        assert!(logs.contains(r#"name = "demo""#), "{logs}");
    }

    #[test]
    fn test_resolve_does_not_dump_by_default() {
        let (_, logs) = resolve_with_logs(&make_tree("name = demo"));
        assert!(!logs.contains("resolved config"), "{logs}");
    }

    #[test]
    fn test_debug_requested() {
        let enabled = make_tree(&format!("logging.loggers.\"{DEBUG_LOGGER}\" = DEBUG"));
        assert!(debug_requested(&enabled));

        let as_level = make_tree(&format!("logging.loggers.\"{DEBUG_LOGGER}\".level = trace"));
        assert!(debug_requested(&as_level));

        let info = make_tree(&format!("logging.loggers.\"{DEBUG_LOGGER}\" = INFO"));
        assert!(!debug_requested(&info));

        let other = make_tree("logging.loggers.\"some::other\" = DEBUG");
        assert!(!debug_requested(&other));
    }
}
