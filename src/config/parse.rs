//! Parser for the native configuration syntax.
//!
//! The syntax is a relaxed superset of JSON:
//!
//! ```text
//! # comments start with '#' or '//'
//! db {
//!     driver = "org.postgresql.Driver"
//!     url = "jdbc:postgresql://"${db.host}"/app"
//!     pool.size = 10
//! }
//! db.host: localhost
//! hosts = [a, b]
//! hosts += c
//! password = ${?DB_PASSWORD}
//! ```
//!
//! Fields are separated by newlines or commas, `=` and `:` are interchangeable,
//! and `key { ... }` is shorthand for `key = { ... }`. Dotted keys are paths;
//! quoted keys are taken verbatim. A key that appears twice with object values
//! is merged, later fields winning. Values written next to each other on one
//! line are concatenated, and `${path}` / `${?path}` are substitutions.
//! Substitutions are only recognized unquoted: `"${path}"` is a plain string.

use super::value::{ConfigObject, ConfigPath, ConfigTree, ConfigValue, Reference};
use super::ConfigError;

/// Parses a complete document. The root may be wrapped in braces or not.
pub fn parse_document(text: &str, origin: &str) -> Result<ConfigTree, ConfigError> {
    let mut parser = Parser::new(text, origin);
    let root = parser.document()?;
    Ok(ConfigTree::new(root, origin))
}

/// Characters that end an unquoted token.
const FORBIDDEN: &[char] = &[
    '$', '"', '{', '}', '[', ']', ':', '=', ',', '+', '#', '`', '^', '?', '!', '@', '*', '&',
    '\\',
];

fn is_unquoted_char(c: char) -> bool {
    !c.is_whitespace() && !FORBIDDEN.contains(&c)
}

/// One element of a value before concatenation.
enum Piece {
    Space(String),
    Unquoted(String),
    Value(ConfigValue),
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    origin: &'a str,
    /// Path of the field whose value is being parsed.
    path: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(text: &str, origin: &'a str) -> Self {
        Self {
            chars: text.trim_start_matches('\u{feff}').chars().collect(),
            pos: 0,
            line: 1,
            origin,
            path: Vec::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::ParseError {
            origin: self.origin.to_string(),
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn at_comment(&self) -> bool {
        match self.peek() {
            Some('#') => true,
            Some('/') => self.peek_at(1) == Some('/'),
            _ => false,
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// Consumes spaces and tabs (not newlines) and returns them.
    fn take_inline_space(&mut self) -> String {
        let mut taken = String::new();
        while let Some(ch) = self.peek() {
            if ch == '\n' || !ch.is_whitespace() {
                break;
            }
            taken.push(ch);
            self.bump();
        }
        taken
    }

    fn skip_inline(&mut self) {
        loop {
            self.take_inline_space();
            if self.at_comment() {
                self.skip_comment();
            } else {
                break;
            }
        }
    }

    /// Skips whitespace, newlines and comments.
    fn skip_blank(&mut self) {
        loop {
            self.skip_inline();
            if self.peek() == Some('\n') {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn document(&mut self) -> Result<ConfigObject, ConfigError> {
        self.skip_blank();
        let root = match self.peek() {
            Some('{') => {
                self.bump();
                self.object_body(Some('}'))?
            }
            Some('[') => return Err(self.error("the document root must be an object, not a list")),
            _ => self.object_body(None)?,
        };
        self.skip_blank();
        match self.peek() {
            None => Ok(root),
            Some(c) => Err(self.error(format!("unexpected '{c}' after the end of the document"))),
        }
    }

    /// Parses fields until `close` (consumed) or, for a brace-less root, end of input.
    fn object_body(&mut self, close: Option<char>) -> Result<ConfigObject, ConfigError> {
        let mut obj = ConfigObject::new();
        loop {
            self.skip_blank();
            match self.peek() {
                None if close.is_some() => return Err(self.error("unterminated object, expected '}'")),
                None => break,
                Some(c) if Some(c) == close => {
                    self.bump();
                    break;
                }
                Some(',') => {
                    self.bump();
                    continue;
                }
                _ => {}
            }

            self.field(&mut obj)?;

            self.skip_inline();
            match self.peek() {
                Some('\n') | Some(',') => {
                    self.bump();
                }
                None => {}
                Some(c) if Some(c) == close => {}
                Some(c) => {
                    return Err(self.error(format!("expected a newline or ',' after a field, found '{c}'")))
                }
            }
        }
        Ok(obj)
    }

    fn field(&mut self, obj: &mut ConfigObject) -> Result<(), ConfigError> {
        let key = self.key_path()?;
        self.take_inline_space();
        let at = ConfigPath::new(self.path.clone());

        match self.peek() {
            Some('=') | Some(':') => {
                self.bump();
                let value = self.field_value(&key)?;
                insert_field(obj, &at, &key, value);
            }
            Some('+') if self.peek_at(1) == Some('=') => {
                self.bump();
                self.bump();
                let value = self.field_value(&key)?;
                append_field(obj, &key, value);
            }
            Some('{') => {
                let value = self.field_value(&key)?;
                insert_field(obj, &at, &key, value);
            }
            Some(c) => {
                return Err(self.error(format!(
                    "expected '=', ':' or '{{' after key '{}', found '{c}'",
                    key.join(".")
                )))
            }
            None => {
                return Err(self.error(format!(
                    "expected a value for key '{}' but reached the end of the document",
                    key.join(".")
                )))
            }
        }
        Ok(())
    }

    fn key_path(&mut self) -> Result<Vec<String>, ConfigError> {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut has_content = false;

        loop {
            match self.peek() {
                Some('"') => {
                    let quoted = self.quoted_string()?;
                    current.push_str(&quoted);
                    has_content = true;
                }
                Some('.') => {
                    if !has_content {
                        return Err(self.error("empty key segment"));
                    }
                    self.bump();
                    segments.push(std::mem::take(&mut current));
                    has_content = false;
                }
                Some(c) if is_unquoted_char(c) && !self.at_comment() => {
                    current.push(c);
                    self.bump();
                    has_content = true;
                }
                _ => break,
            }
        }

        if !has_content {
            return Err(match self.peek() {
                Some(c) => self.error(format!("expected a key, found '{c}'")),
                None => self.error("expected a key"),
            });
        }
        segments.push(current);
        Ok(segments)
    }

    fn field_value(&mut self, key: &[String]) -> Result<ConfigValue, ConfigError> {
        let depth = self.path.len();
        self.path.extend_from_slice(key);
        let value = self.value();
        self.path.truncate(depth);
        value
    }

    /// Parses a value, joining adjacent pieces into a concatenation.
    fn value(&mut self) -> Result<ConfigValue, ConfigError> {
        self.skip_blank();
        let mut pieces = Vec::new();

        loop {
            let space = self.take_inline_space();
            if self.at_comment() {
                break;
            }
            match self.peek() {
                None | Some('\n') | Some(',') | Some('}') | Some(']') => break,
                _ => {}
            }
            if !pieces.is_empty() && !space.is_empty() {
                pieces.push(Piece::Space(space));
            }
            pieces.push(self.simple_value()?);
        }

        match pieces.len() {
            0 => Err(self.error("expected a value")),
            1 => match pieces.pop() {
                Some(Piece::Unquoted(text)) => Ok(literal_token(&text)),
                Some(Piece::Value(value)) => Ok(value),
                _ => Err(self.error("expected a value")),
            },
            _ => Ok(join_pieces(pieces)),
        }
    }

    fn simple_value(&mut self) -> Result<Piece, ConfigError> {
        match self.peek() {
            Some('"') if self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') => {
                Ok(Piece::Value(ConfigValue::String(self.triple_quoted_string()?)))
            }
            Some('"') => Ok(Piece::Value(ConfigValue::String(self.quoted_string()?))),
            Some('{') => {
                self.bump();
                Ok(Piece::Value(ConfigValue::Object(self.object_body(Some('}'))?)))
            }
            Some('[') => {
                self.bump();
                Ok(Piece::Value(ConfigValue::List(self.list()?)))
            }
            Some('$') if self.peek_at(1) == Some('{') => {
                Ok(Piece::Value(ConfigValue::Reference(self.substitution()?)))
            }
            Some(c) if is_unquoted_char(c) => Ok(Piece::Unquoted(self.unquoted_text())),
            Some(c) => Err(self.error(format!("unexpected '{c}' in value"))),
            None => Err(self.error("expected a value")),
        }
    }

    fn unquoted_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !is_unquoted_char(c) || self.at_comment() {
                break;
            }
            text.push(c);
            self.bump();
        }
        text
    }

    fn list(&mut self) -> Result<Vec<ConfigValue>, ConfigError> {
        let mut items = Vec::new();
        loop {
            self.skip_blank();
            match self.peek() {
                None => return Err(self.error("unterminated list, expected ']'")),
                Some(']') => {
                    self.bump();
                    return Ok(items);
                }
                Some(',') => {
                    self.bump();
                    continue;
                }
                _ => {}
            }

            items.push(self.value()?);

            self.skip_inline();
            match self.peek() {
                Some(',') | Some('\n') => {
                    self.bump();
                }
                Some(']') => {}
                None => return Err(self.error("unterminated list, expected ']'")),
                Some(c) => return Err(self.error(format!("expected ',' or ']' in list, found '{c}'"))),
            }
        }
    }

    fn substitution(&mut self) -> Result<Reference, ConfigError> {
        // consume "${"
        self.bump();
        self.bump();
        let mut expr = String::new();
        loop {
            if matches!(self.peek(), Some('\n') | None) {
                return Err(self.error("unclosed substitution (missing '}')"));
            }
            match self.bump() {
                Some('}') => break,
                Some(c) => expr.push(c),
                None => return Err(self.error("unclosed substitution (missing '}')")),
            }
        }
        expr.parse()
            .map_err(|_| self.error(format!("invalid substitution '${{{expr}}}'")))
    }

    fn quoted_string(&mut self) -> Result<String, ConfigError> {
        // opening quote
        self.bump();
        let mut s = String::new();
        loop {
            if matches!(self.peek(), Some('\n') | None) {
                return Err(self.error("unterminated string"));
            }
            match self.bump() {
                Some('"') => return Ok(s),
                Some('\\') => s.push(self.escape()?),
                Some(c) => s.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn escape(&mut self) -> Result<char, ConfigError> {
        match self.bump() {
            Some('"') => Ok('"'),
            Some('\\') => Ok('\\'),
            Some('/') => Ok('/'),
            Some('b') => Ok('\u{0008}'),
            Some('f') => Ok('\u{000c}'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('u') => {
                let first = self.hex4()?;
                if (0xD800..0xDC00).contains(&first) {
                    // surrogate pair, as JSON encodes characters outside the BMP
                    if self.bump() != Some('\\') || self.bump() != Some('u') {
                        return Err(self.error("unpaired surrogate in \\u escape"));
                    }
                    let second = self.hex4()?;
                    let code = 0x10000 + ((first - 0xD800) << 10) + (second.wrapping_sub(0xDC00) & 0x3FF);
                    return char::from_u32(code).ok_or_else(|| self.error("invalid \\u escape"));
                }
                char::from_u32(first).ok_or_else(|| self.error("invalid \\u escape"))
            }
            Some(c) => Err(self.error(format!("invalid escape '\\{c}'"))),
            None => Err(self.error("unterminated string")),
        }
    }

    fn hex4(&mut self) -> Result<u32, ConfigError> {
        let mut code = 0;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid \\u escape"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn triple_quoted_string(&mut self) -> Result<String, ConfigError> {
        for _ in 0..3 {
            self.bump();
        }
        let mut s = String::new();
        loop {
            if self.peek() == Some('"') && self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') {
                // extra quotes directly before the closing ones belong to the content
                while self.peek_at(3) == Some('"') {
                    s.push('"');
                    self.bump();
                }
                for _ in 0..3 {
                    self.bump();
                }
                return Ok(s);
            }
            match self.bump() {
                Some(c) => s.push(c),
                None => return Err(self.error("unterminated triple-quoted string")),
            }
        }
    }
}

/// Interprets a lone unquoted token as a boolean, null, number or string.
fn literal_token(text: &str) -> ConfigValue {
    match text {
        "true" => return ConfigValue::Bool(true),
        "false" => return ConfigValue::Bool(false),
        "null" => return ConfigValue::Null,
        _ => {}
    }

    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.starts_with(|c: char| c.is_ascii_digit()) {
        if let Ok(i) = text.parse::<i64>() {
            return ConfigValue::Integer(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return ConfigValue::Float(f);
        }
    }

    ConfigValue::String(text.to_string())
}

/// Builds a value from several adjacent pieces. Pieces without substitutions
/// collapse into a single string right away.
fn join_pieces(pieces: Vec<Piece>) -> ConfigValue {
    let values: Vec<ConfigValue> = pieces
        .into_iter()
        .map(|piece| match piece {
            Piece::Space(s) | Piece::Unquoted(s) => ConfigValue::String(s),
            Piece::Value(v) => v,
        })
        .collect();

    if values.iter().all(|v| matches!(v, ConfigValue::String(_))) {
        let joined = values.iter().filter_map(ConfigValue::as_str).collect::<String>();
        return ConfigValue::String(joined);
    }

    ConfigValue::Concat(values)
}

/// Inserts `value` at the dotted `key` of the object found at `at`, merging
/// objects with what is already there.
fn insert_field(obj: &mut ConfigObject, at: &ConfigPath, key: &[String], value: ConfigValue) {
    let Some((first, rest)) = key.split_first() else {
        return;
    };

    let value = rest.iter().rev().fold(value, |inner, segment| {
        let mut wrapper = ConfigObject::new();
        wrapper.insert(segment.clone(), inner);
        ConfigValue::Object(wrapper)
    });

    let merged = match obj.remove(first) {
        Some(existing) => value.with_fallback(&existing, &at.child(first.as_str())),
        None => value,
    };
    obj.insert(first.clone(), merged);
}

/// `key += value` appends to the list already stored at `key` in this document.
fn append_field(obj: &mut ConfigObject, key: &[String], value: ConfigValue) {
    let Some((first, rest)) = key.split_first() else {
        return;
    };

    if !rest.is_empty() {
        if !matches!(obj.get(first), Some(ConfigValue::Object(_))) {
            obj.insert(first.clone(), ConfigValue::Object(ConfigObject::new()));
        }
        if let Some(ConfigValue::Object(nested)) = obj.get_mut(first) {
            append_field(nested, rest, value);
        }
        return;
    }

    let appended = match obj.remove(first) {
        None => ConfigValue::List(vec![value]),
        Some(ConfigValue::List(mut items)) => {
            items.push(value);
            ConfigValue::List(items)
        }
        Some(existing) => ConfigValue::Concat(vec![existing, ConfigValue::List(vec![value])]),
    };
    obj.insert(first.clone(), appended);
}
