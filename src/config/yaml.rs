//! YAML documents, normalized into native syntax.
//!
//! YAML has no notion of substitutions, so a YAML value such as
//! `password: ${secretVar}` arrives as the plain string `"${secretVar}"`.
//! Converting it directly would keep that quoting, and the native parser treats
//! a quoted `"${...}"` as literal text: the placeholder would silently never
//! resolve. Normalization therefore runs in two stages:
//!
//! 1. YAML → JSON → native tree → [`display`](super::render::display) text.
//!    Every placeholder is now inside a quoted string.
//! 2. [`unquote_placeholders`] rewrites those quoted values into unquoted
//!    substitutions (`"a${b}c"` becomes `"a"${b}"c"`) and the result is parsed
//!    again.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::parse::parse_document;
use super::render::display;
use super::value::ConfigTree;
use super::ConfigError;

/// A quoted field value or list element whose text contains `${`.
static QUOTED_PLACEHOLDER_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(=\s?|\[|,\s?)"((?:[^"\\]|\\.)*\$\{(?:[^"\\]|\\.)*)""#).unwrap()
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{[^}]*\}").unwrap());

/// Converts a YAML document into a tree with live substitutions.
///
/// An empty document (or one containing only `null`) is an empty tree. The
/// root must otherwise be a mapping. YAML merge keys (`<<: *anchor`) are applied.
pub fn normalize(text: &str, origin: &str) -> Result<ConfigTree, ConfigError> {
    let Some(rendered) = render_as_display(text, origin)? else {
        return Ok(ConfigTree::new(Default::default(), origin));
    };
    parse_document(&unquote_placeholders(&rendered), origin)
}

/// Stage one: YAML to display syntax, with placeholders still quoted.
fn render_as_display(text: &str, origin: &str) -> Result<Option<String>, ConfigError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let yaml_error = |source| ConfigError::YamlError {
        origin: origin.to_string(),
        source,
    };

    let mut document: serde_yaml::Value = serde_yaml::from_str(text).map_err(yaml_error)?;
    document.apply_merge().map_err(yaml_error)?;

    match &document {
        serde_yaml::Value::Null => return Ok(None),
        serde_yaml::Value::Mapping(_) => {}
        other => {
            return Err(ConfigError::ParseError {
                origin: origin.to_string(),
                line: 1,
                message: format!("YAML document root must be a mapping, found {other:?}"),
            })
        }
    }

    let json = serde_json::to_string(&document).map_err(|e| ConfigError::ParseError {
        origin: origin.to_string(),
        line: 1,
        message: format!("YAML document cannot be represented as JSON: {e}"),
    })?;

    let intermediate = parse_document(&json, origin)?;
    Ok(Some(display(&intermediate)))
}

/// Stage two: turns quoted values containing `${...}` into native substitutions.
///
/// A value that is exactly one placeholder becomes a bare substitution, so the
/// referenced value keeps its type. Anything else becomes a concatenation of
/// quoted text and substitutions, written without spaces so no whitespace is
/// added to the result.
pub fn unquote_placeholders(rendered: &str) -> String {
    QUOTED_PLACEHOLDER_VALUE
        .replace_all(rendered, |caps: &Captures| {
            format!("{}{}", &caps[1], split_placeholders(&caps[2]))
        })
        .into_owned()
}

fn split_placeholders(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 4);
    let mut last = 0;

    for m in PLACEHOLDER.find_iter(body) {
        if m.start() > last {
            push_quoted(&mut out, &body[last..m.start()]);
        }
        out.push_str(&m.as_str().replace("\\\"", "\""));
        last = m.end();
    }
    if last < body.len() {
        push_quoted(&mut out, &body[last..]);
    }
    out
}

/// `text` is already escaped, it only needs the quotes back.
fn push_quoted(out: &mut String, text: &str) {
    out.push('"');
    out.push_str(text);
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::value::{ConfigPath, ConfigValue, Reference};

    fn get(tree: &ConfigTree, path: &str) -> ConfigValue {
        tree.get(&ConfigPath::parse(path).unwrap()).cloned().unwrap()
    }

    fn reference(expr: &str) -> ConfigValue {
        ConfigValue::Reference(expr.parse::<Reference>().unwrap())
    }

    #[test]
    fn test_unquote_whole_placeholder() {
        assert_eq!(
            unquote_placeholders("password = \"${secretVar}\"\n"),
            "password = ${secretVar}\n"
        );
    }

    #[test]
    fn test_unquote_embedded_placeholder() {
        assert_eq!(
            unquote_placeholders("url = \"jdbc:${db.host}/app\"\n"),
            "url = \"jdbc:\"${db.host}\"/app\"\n"
        );
        assert_eq!(
            unquote_placeholders("pair = \"${a} ${b}\"\n"),
            "pair = ${a}\" \"${b}\n"
        );
    }

    #[test]
    fn test_unquote_list_elements() {
        assert_eq!(
            unquote_placeholders("hosts = [\"${a}\", \"plain\", \"x${b}\"]\n"),
            "hosts = [${a}, \"plain\", \"x\"${b}]\n"
        );
    }

    #[test]
    fn test_unquote_leaves_plain_strings_and_keys() {
        let text = "\"${weird}.key\" = \"plain\"\nescaped = \"say \\\"hi\\\" = \\\"x\\\"\"\n";
        assert_eq!(unquote_placeholders(text), text);
    }

    #[test]
    fn test_unquote_keeps_escaped_quotes_in_text() {
        assert_eq!(
            unquote_placeholders("v = \"a \\\"${b}\\\"\"\n"),
            "v = \"a \\\"\"${b}\"\\\"\"\n"
        );
    }

    #[test]
    fn test_normalize_keeps_placeholders_live() {
        let tree = normalize(
            r#"
database:
  driverClass: org.postgresql.Driver
  password: ${secretVar}
  url: "jdbc:postgresql://${db_host}/app"
  port: 5432
  url2:
"#,
            "test.yml",
        )
        .unwrap();

        assert_eq!(get(&tree, "database.driverClass"), "org.postgresql.Driver".into());
        assert_eq!(get(&tree, "database.password"), reference("secretVar"));
        assert_eq!(
            get(&tree, "database.url"),
            ConfigValue::Concat(vec![
                "jdbc:postgresql://".into(),
                reference("db_host"),
                "/app".into(),
            ])
        );
        assert_eq!(get(&tree, "database.port"), ConfigValue::Integer(5432));
        assert_eq!(get(&tree, "database.url2"), ConfigValue::Null);
    }

    #[test]
    fn test_normalize_applies_merge_keys() {
        let tree = normalize(
            r#"
defaults: &defaults
  timeout: 30
  retries: 2
service:
  <<: *defaults
  retries: 5
"#,
            "merge.yml",
        )
        .unwrap();
        assert_eq!(get(&tree, "service.timeout"), ConfigValue::Integer(30));
        assert_eq!(get(&tree, "service.retries"), ConfigValue::Integer(5));
    }

    #[test]
    fn test_normalize_empty_document() {
        assert!(normalize("", "empty.yml").unwrap().is_empty());
        assert!(normalize("# nothing\n", "empty.yml").unwrap().is_empty());
    }

    #[test]
    fn test_normalize_rejects_non_mapping_root() {
        assert!(matches!(
            normalize("- a\n- b\n", "list.yml"),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_normalize_reports_yaml_errors() {
        assert!(matches!(
            normalize("a: [unclosed\n", "broken.yml"),
            Err(ConfigError::YamlError { .. })
        ));
    }
}
