//! Immutable configuration trees.
//!
//! A [`ConfigTree`] is never mutated in place: [`with_fallback`](ConfigTree::with_fallback),
//! [`without_path`](ConfigTree::without_path) and [`with_value`](ConfigTree::with_value)
//! all return a new tree. Unresolved `${...}` substitutions are kept as
//! [`ConfigValue::Reference`], [`ConfigValue::Concat`] and [`ConfigValue::Merge`]
//! until the tree is resolved.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::ConfigError;

/// Object keys are kept sorted, so rendering is deterministic.
pub type ConfigObject = BTreeMap<String, ConfigValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Object(ConfigObject),
    /// A `${path}` or `${?path}` substitution that has not been resolved yet.
    Reference(Reference),
    /// Adjacent values joined into one, e.g. `"http://"${host}"/api"`.
    Concat(Vec<ConfigValue>),
    /// Layers of one field that can only be merged once resolved, lowest
    /// first, e.g. `db = ${defaults}` under an overlay setting `db.url`.
    Merge(Vec<ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ConfigObject> {
        match self {
            ConfigValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Returns `true` if neither this value nor anything nested in it is a
    /// substitution or concatenation.
    pub fn is_resolved(&self) -> bool {
        match self {
            ConfigValue::Reference(_) | ConfigValue::Concat(_) | ConfigValue::Merge(_) => false,
            ConfigValue::List(items) => items.iter().all(ConfigValue::is_resolved),
            ConfigValue::Object(obj) => obj.values().all(ConfigValue::is_resolved),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Null => "null",
            ConfigValue::Bool(_) => "boolean",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::String(_) => "string",
            ConfigValue::List(_) => "list",
            ConfigValue::Object(_) => "object",
            ConfigValue::Reference(_) => "substitution",
            ConfigValue::Concat(_) => "concatenation",
            ConfigValue::Merge(_) => "merge",
        }
    }

    /// A substitution, concatenation or merge at the top level, whose type is
    /// only known after resolution.
    pub(crate) fn is_pending(&self) -> bool {
        matches!(
            self,
            ConfigValue::Reference(_) | ConfigValue::Concat(_) | ConfigValue::Merge(_)
        )
    }

    /// Layers `self` over `fallback`, both found at `at`.
    ///
    /// Objects merge key by key. When either side is pending and both could
    /// turn out to be objects, the layers are kept as a [`ConfigValue::Merge`].
    /// Otherwise `self` wins. Substitutions of `at` itself inside `self` are
    /// replaced by `fallback`, so `opts = ${opts}" -Xmx2g"` extends the value
    /// it overrides.
    pub(crate) fn with_fallback(self, fallback: &ConfigValue, at: &ConfigPath) -> ConfigValue {
        let overlay = if self.is_resolved() {
            self
        } else {
            self.inline_self_references(at, fallback)
        };

        let mergeable = |v: &ConfigValue| v.is_pending() || matches!(v, ConfigValue::Object(_));

        match (overlay, fallback) {
            (ConfigValue::Object(overlay), ConfigValue::Object(base)) => {
                ConfigValue::Object(merge_objects(overlay, base, at))
            }
            (overlay, base) if mergeable(&overlay) && mergeable(base) => {
                let mut layers = match base {
                    ConfigValue::Merge(layers) => layers.clone(),
                    other => vec![other.clone()],
                };
                match overlay {
                    ConfigValue::Merge(upper) => layers.extend(upper),
                    other => layers.push(other),
                }
                ConfigValue::Merge(layers)
            }
            (overlay, _) => overlay,
        }
    }

    fn inline_self_references(self, at: &ConfigPath, previous: &ConfigValue) -> ConfigValue {
        let inline_all = |values: Vec<ConfigValue>| -> Vec<ConfigValue> {
            values
                .into_iter()
                .map(|v| v.inline_self_references(at, previous))
                .collect()
        };

        match self {
            ConfigValue::Reference(reference) if reference.path == *at => previous.clone(),
            ConfigValue::Concat(pieces) => {
                let mut flat = Vec::with_capacity(pieces.len());
                for piece in inline_all(pieces) {
                    match piece {
                        ConfigValue::Concat(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                ConfigValue::Concat(flat)
            }
            ConfigValue::Merge(layers) => ConfigValue::Merge(inline_all(layers)),
            ConfigValue::List(items) => ConfigValue::List(inline_all(items)),
            other => other,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

pub(crate) fn merge_objects(
    mut overlay: ConfigObject,
    fallback: &ConfigObject,
    at: &ConfigPath,
) -> ConfigObject {
    for (key, base) in fallback {
        let merged = match overlay.remove(key) {
            Some(value) => value.with_fallback(base, &at.child(key.as_str())),
            None => base.clone(),
        };
        overlay.insert(key.clone(), merged);
    }
    overlay
}

/// Joins resolved pieces of a concatenation.
///
/// Objects merge (later pieces win), lists append, and scalars are joined as
/// strings. Whitespace between objects or lists is dropped. Returns `None` when
/// there is nothing left to join, which happens when every piece was an
/// undefined optional substitution.
pub(crate) fn concatenate(
    pieces: Vec<ConfigValue>,
    at: &ConfigPath,
) -> Result<Option<ConfigValue>, ConfigError> {
    let structured = pieces
        .iter()
        .any(|p| matches!(p, ConfigValue::Object(_) | ConfigValue::List(_)));

    let mut pieces: Vec<ConfigValue> = if structured {
        pieces
            .into_iter()
            .filter(|p| !matches!(p, ConfigValue::String(s) if s.trim().is_empty()))
            .collect()
    } else {
        pieces
    };

    if pieces.len() <= 1 {
        return Ok(pieces.pop());
    }

    if pieces.iter().all(|p| matches!(p, ConfigValue::Object(_))) {
        let merged = pieces
            .into_iter()
            .reduce(|acc, next| next.with_fallback(&acc, at));
        return Ok(merged);
    }

    if pieces.iter().all(|p| matches!(p, ConfigValue::List(_))) {
        let mut joined = Vec::new();
        for piece in pieces {
            if let ConfigValue::List(items) = piece {
                joined.extend(items);
            }
        }
        return Ok(Some(ConfigValue::List(joined)));
    }

    let mut joined = String::new();
    for piece in &pieces {
        match piece {
            ConfigValue::Null => joined.push_str("null"),
            ConfigValue::Bool(b) => joined.push_str(&b.to_string()),
            ConfigValue::Integer(i) => joined.push_str(&i.to_string()),
            ConfigValue::Float(f) => joined.push_str(&f.to_string()),
            ConfigValue::String(s) => joined.push_str(s),
            other => {
                return Err(ConfigError::InvalidConcatenation {
                    at: at.to_string(),
                    found: other.type_name(),
                })
            }
        }
    }
    Ok(Some(ConfigValue::String(joined)))
}

/// A dotted path into a tree. Segments containing anything other than
/// letters, digits, `_` or `-` are written quoted: `logging.loggers."a::b"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigPath(Vec<String>);

impl ConfigPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// A single-segment path. The key is taken verbatim, dots included.
    pub fn key(key: impl Into<String>) -> Self {
        Self(vec![key.into()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.into());
        Self(segments)
    }

    pub fn join(&self, other: &ConfigPath) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// Parses a dotted path expression such as `server.host` or `a."b.c"`.
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidReferencePath(expr.to_string());

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut has_content = false;
        let mut chars = expr.trim().chars();

        while let Some(ch) = chars.next() {
            match ch {
                '"' => {
                    loop {
                        match chars.next() {
                            Some('"') => break,
                            Some('\\') => current.push(chars.next().ok_or_else(invalid)?),
                            Some(c) => current.push(c),
                            None => return Err(invalid()),
                        }
                    }
                    has_content = true;
                }
                '.' => {
                    if !has_content {
                        return Err(invalid());
                    }
                    segments.push(std::mem::take(&mut current));
                    has_content = false;
                }
                c if c.is_whitespace() => return Err(invalid()),
                c => {
                    current.push(c);
                    has_content = true;
                }
            }
        }

        if !has_content {
            return Err(invalid());
        }
        segments.push(current);
        Ok(Self(segments))
    }
}

impl FromStr for ConfigPath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            if needs_quotes(segment) {
                f.write_str(&quote(segment))?;
            } else {
                f.write_str(segment)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn needs_quotes(key: &str) -> bool {
    key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Renders `s` as a double-quoted string literal.
pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// A substitution such as `${db.host}`, or `${?db.host}` when optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub path: ConfigPath,
    pub optional: bool,
}

impl Reference {
    pub fn required(path: ConfigPath) -> Self {
        Self {
            path,
            optional: false,
        }
    }

    pub fn optional(path: ConfigPath) -> Self {
        Self {
            path,
            optional: true,
        }
    }
}

impl FromStr for Reference {
    type Err = ConfigError;

    /// Parses the text between `${` and `}`.
    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let expr = expr.trim();
        match expr.strip_prefix('?') {
            Some(rest) => Ok(Self::optional(ConfigPath::parse(rest)?)),
            None => Ok(Self::required(ConfigPath::parse(expr)?)),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.optional { "?" } else { "" };
        write!(f, "${{{marker}{}}}", self.path)
    }
}

/// An immutable, cheaply cloneable configuration tree.
///
/// The origin names where the tree came from and only feeds diagnostics;
/// two trees with the same content compare equal regardless of origin.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    root: Arc<ConfigObject>,
    origin: Arc<str>,
}

impl ConfigTree {
    pub fn new(root: ConfigObject, origin: &str) -> Self {
        Self {
            root: Arc::new(root),
            origin: Arc::from(origin),
        }
    }

    pub fn empty() -> Self {
        Self::new(ConfigObject::new(), "empty config")
    }

    pub fn root(&self) -> &ConfigObject {
        &self.root
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn is_resolved(&self) -> bool {
        self.root.values().all(ConfigValue::is_resolved)
    }

    pub fn get(&self, path: &ConfigPath) -> Option<&ConfigValue> {
        let (first, rest) = path.segments().split_first()?;
        let mut current = self.root.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn has_path(&self, path: &ConfigPath) -> bool {
        self.get(path).is_some()
    }

    /// Layers `self` over `fallback`: keys in `self` win, nested objects merge.
    /// A field that is not resolved yet is merged once it is, and a
    /// substitution of a field's own path picks up the value it overrides.
    pub fn with_fallback(&self, fallback: &ConfigTree) -> ConfigTree {
        if fallback.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return fallback.clone();
        }
        let merged = merge_objects((*self.root).clone(), &fallback.root, &ConfigPath::root());
        Self::new(
            merged,
            &format!("{} with fallback {}", self.origin, fallback.origin),
        )
    }

    pub fn without_path(&self, path: &ConfigPath) -> ConfigTree {
        if !self.has_path(path) {
            return self.clone();
        }
        let mut root = (*self.root).clone();
        remove_path(&mut root, path.segments());
        Self {
            root: Arc::new(root),
            origin: Arc::clone(&self.origin),
        }
    }

    /// Sets `value` at `path`, replacing whatever was there and creating
    /// intermediate objects as needed. An empty path leaves the tree unchanged.
    pub fn with_value(&self, path: &ConfigPath, value: ConfigValue) -> ConfigTree {
        if path.is_root() {
            return self.clone();
        }
        let mut root = (*self.root).clone();
        insert_path(&mut root, path.segments(), value);
        Self {
            root: Arc::new(root),
            origin: Arc::clone(&self.origin),
        }
    }
}

impl PartialEq for ConfigTree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::empty()
    }
}

fn remove_path(obj: &mut ConfigObject, segments: &[String]) -> bool {
    match segments {
        [] => false,
        [last] => obj.remove(last).is_some(),
        [first, rest @ ..] => match obj.get_mut(first) {
            Some(ConfigValue::Object(child)) => remove_path(child, rest),
            _ => false,
        },
    }
}

fn insert_path(obj: &mut ConfigObject, segments: &[String], value: ConfigValue) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        obj.insert(first.clone(), value);
        return;
    }

    if !matches!(obj.get(first), Some(ConfigValue::Object(_))) {
        obj.insert(first.clone(), ConfigValue::Object(ConfigObject::new()));
    }

    if let Some(ConfigValue::Object(nested)) = obj.get_mut(first) {
        insert_path(nested, rest, value);
    }
}
