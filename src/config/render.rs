//! Rendering trees as text.
//!
//! [`concise`] produces the single-line JSON handed to deserializers.
//! [`display`] produces indented native syntax for humans; it is also valid
//! input for the native parser.

use serde_json::{Map, Number, Value};

use super::value::{needs_quotes, quote, ConfigObject, ConfigPath, ConfigTree, ConfigValue};
use super::ConfigError;

const INDENT: &str = "    ";

/// Serializes a fully resolved tree as compact JSON.
pub fn concise(tree: &ConfigTree) -> Result<String, ConfigError> {
    let json = object_to_json(tree.root(), &ConfigPath::root())?;
    serde_json::to_string(&json).map_err(|e| ConfigError::SerializeError(e.to_string()))
}

fn object_to_json(obj: &ConfigObject, at: &ConfigPath) -> Result<Value, ConfigError> {
    let mut map = Map::new();
    for (key, value) in obj {
        map.insert(key.clone(), to_json(value, &at.child(key.as_str()))?);
    }
    Ok(Value::Object(map))
}

fn to_json(value: &ConfigValue, at: &ConfigPath) -> Result<Value, ConfigError> {
    match value {
        ConfigValue::Null => Ok(Value::Null),
        ConfigValue::Bool(b) => Ok(Value::Bool(*b)),
        ConfigValue::Integer(i) => Ok(Value::Number((*i).into())),
        ConfigValue::Float(f) => Number::from_f64(*f).map(Value::Number).ok_or_else(|| {
            ConfigError::SerializeError(format!("{f} at '{at}' is not representable in JSON"))
        }),
        ConfigValue::String(s) => Ok(Value::String(s.clone())),
        ConfigValue::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| to_json(item, &at.child(i.to_string())))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ConfigValue::Object(obj) => object_to_json(obj, at),
        ConfigValue::Reference(_) | ConfigValue::Concat(_) | ConfigValue::Merge(_) => {
            Err(ConfigError::SerializeError(format!(
                "'{at}' still contains an unresolved substitution"
            )))
        }
    }
}

/// Renders a tree as indented native syntax, one field per line.
pub fn display(tree: &ConfigTree) -> String {
    let mut out = String::new();
    write_fields(&mut out, tree.root(), 0);
    out
}

fn write_fields(out: &mut String, obj: &ConfigObject, depth: usize) {
    for (key, value) in obj {
        write_field(out, key, value, depth);
    }
}

fn write_field(out: &mut String, key: &str, value: &ConfigValue, depth: usize) {
    // repeating the field once per layer parses back into the same merge
    if let ConfigValue::Merge(layers) = value {
        for layer in layers {
            write_field(out, key, layer, depth);
        }
        return;
    }

    out.push_str(&INDENT.repeat(depth));
    if needs_quotes(key) {
        out.push_str(&quote(key));
    } else {
        out.push_str(key);
    }
    match value {
        ConfigValue::Object(child) => {
            out.push_str(" {\n");
            write_fields(out, child, depth + 1);
            out.push_str(&INDENT.repeat(depth));
            out.push_str("}\n");
        }
        other => {
            out.push_str(" = ");
            write_value(out, other, depth);
            out.push('\n');
        }
    }
}

fn write_value(out: &mut String, value: &ConfigValue, depth: usize) {
    match value {
        ConfigValue::Null => out.push_str("null"),
        ConfigValue::Bool(b) => out.push_str(&b.to_string()),
        ConfigValue::Integer(i) => out.push_str(&i.to_string()),
        // Debug formatting keeps a fractional part or exponent, so the value reads back as a float.
        ConfigValue::Float(f) => out.push_str(&format!("{f:?}")),
        ConfigValue::String(s) => out.push_str(&quote(s)),
        ConfigValue::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item, depth);
            }
            out.push(']');
        }
        ConfigValue::Object(obj) => {
            out.push_str("{\n");
            write_fields(out, obj, depth + 1);
            out.push_str(&INDENT.repeat(depth));
            out.push('}');
        }
        ConfigValue::Reference(reference) => out.push_str(&reference.to_string()),
        ConfigValue::Concat(pieces) => {
            for piece in pieces {
                write_value(out, piece, depth);
            }
        }
        ConfigValue::Merge(layers) => {
            for (i, layer) in layers.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, layer, depth);
            }
        }
    }
}
