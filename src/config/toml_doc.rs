//! TOML documents.
//!
//! TOML has no unquoted values, so substitutions live inside strings:
//! `url = "http://${server.host}:${server.port}/api"`. A string that is exactly
//! one `${...}` keeps the referenced value's type. Use `$${...}` to escape and
//! produce a literal `${...}`.

use toml::{Table, Value};

use super::value::{ConfigObject, ConfigTree, ConfigValue};
use super::ConfigError;

pub fn parse_toml(text: &str, origin: &str) -> Result<ConfigTree, ConfigError> {
    let table: Table = toml::from_str(text).map_err(|source| ConfigError::TomlError {
        origin: origin.to_string(),
        source,
    })?;
    Ok(ConfigTree::new(convert_table(table)?, origin))
}

fn convert_table(table: Table) -> Result<ConfigObject, ConfigError> {
    table
        .into_iter()
        .map(|(key, value)| Ok((key, convert_value(value)?)))
        .collect()
}

fn convert_value(value: Value) -> Result<ConfigValue, ConfigError> {
    match value {
        Value::String(s) => parse_template(&s),
        Value::Integer(i) => Ok(ConfigValue::Integer(i)),
        Value::Float(f) => Ok(ConfigValue::Float(f)),
        Value::Boolean(b) => Ok(ConfigValue::Bool(b)),
        Value::Datetime(dt) => Ok(ConfigValue::String(dt.to_string())),
        Value::Array(items) => items
            .into_iter()
            .map(convert_value)
            .collect::<Result<Vec<_>, _>>()
            .map(ConfigValue::List),
        Value::Table(t) => convert_table(t).map(ConfigValue::Object),
    }
}

/// Splits a TOML string into literal text and substitutions, e.g.
/// `"${base}/users"` becomes a concatenation. `$$` stands for a literal `$`.
fn parse_template(s: &str) -> Result<ConfigValue, ConfigError> {
    let mut pieces = Vec::new();
    let mut literal = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    literal.push('$');
                }
                Some('{') => {
                    chars.next();
                    let expr = consume_until(&mut chars, '}')
                        .ok_or_else(|| ConfigError::UnclosedReference(s.to_string()))?;

                    if !literal.is_empty() {
                        pieces.push(ConfigValue::String(std::mem::take(&mut literal)));
                    }
                    pieces.push(ConfigValue::Reference(expr.parse()?));
                }
                // not followed by `{`, so plain text
                _ => literal.push('$'),
            }
        } else {
            literal.push(ch);
        }
    }

    if !literal.is_empty() || pieces.is_empty() {
        pieces.push(ConfigValue::String(literal));
    }

    Ok(match pieces.len() {
        1 => pieces.remove(0),
        _ => ConfigValue::Concat(pieces),
    })
}

/// The text up to `delim`, or `None` when the string ends first.
fn consume_until(chars: &mut std::iter::Peekable<std::str::Chars>, delim: char) -> Option<String> {
    let mut result = String::new();
    for ch in chars.by_ref() {
        if ch == delim {
            return Some(result);
        }
        result.push(ch);
    }
    None
}
