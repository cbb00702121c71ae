//! Record values and SQL literal quoting.
//!
//! A [`Record`] is an ordered mapping from field name to a tagged [`Value`].
//! Every literal that ends up in generated SQL text goes through [`quote`].

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A record: field name to value, in field order.
pub type Record = IndexMap<String, Value>;

/// A single scalar (or list of scalars) stored in or queried from a table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean, stored as `'1'` / `'0'`.
    Bool(bool),
    /// Any integer-family value.
    Int(i64),
    /// Any float/decimal-family value.
    Float(f64),
    /// Character data.
    Text(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// A sequence of values; used as an `IN (...)` filter in examples.
    List(Vec<Value>),
    /// A raw SQL expression used verbatim in a WHERE clause.
    ///
    /// The first occurrence of the field name inside the expression is
    /// qualified with the table name.
    Raw(String),
}

impl Value {
    /// Creates a raw expression marker (for subqueries and SQL functions).
    #[must_use]
    pub fn raw(expr: impl Into<String>) -> Self {
        Self::Raw(expr.into())
    }

    /// Returns true for NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns whether the value counts as "set".
    ///
    /// NULL, `false`, zero and the empty string are not set.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) | Self::Raw(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
            Self::List(_) => true,
        }
    }

    /// Returns the value as an integer if it holds one (or a numeric string).
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns character data, decoding bytes when needed.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Text(s) => Some(Cow::Borrowed(s)),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{}", u8::from(*b)),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) | Self::Raw(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// How quotes inside string literals are escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeStyle {
    /// MySQL: backslash-escape `\`, `'`, `"` and NUL.
    Backslash,
    /// Standard SQL: double single quotes. NUL bytes are dropped.
    Doubling,
}

/// Quotes a value as an SQL literal.
///
/// - NULL becomes `NULL`
/// - `true` and `"yes"` become `'1'`, `false` and `"no"` become `'0'`
/// - lists are quoted element-wise and joined with commas
/// - anything else is string-cast, escaped and single-quoted
#[must_use]
pub fn quote(value: &Value, style: EscapeStyle) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "'1'".to_string(),
        Value::Bool(false) => "'0'".to_string(),
        Value::Text(s) if s == "yes" => "'1'".to_string(),
        Value::Text(s) if s == "no" => "'0'".to_string(),
        Value::List(items) => items
            .iter()
            .map(|item| quote(item, style))
            .collect::<Vec<_>>()
            .join(","),
        other => format!("'{}'", escape(&other.to_string(), style)),
    }
}

fn escape(s: &str, style: EscapeStyle) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match (style, c) {
            (EscapeStyle::Backslash, '\\' | '\'' | '"') => {
                out.push('\\');
                out.push(c);
            }
            (EscapeStyle::Backslash, '\0') => out.push_str("\\0"),
            (EscapeStyle::Doubling, '\'') => out.push_str("''"),
            (EscapeStyle::Doubling, '\0') => {}
            _ => out.push(c),
        }
    }
    out
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Text(s) | Self::Raw(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            Self::List(items) => items.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or_default()), Self::Int),
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            // Nested objects have no column representation; keep their JSON text.
            serde_json::Value::Object(_) => Self::Text(value.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(values: [T; N]) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Builds a [`Record`] from `name => value` pairs.
///
/// ```
/// use oxide_schema::{record, Value};
///
/// let example = record! { "name" => "bolt", "qty" => 3 };
/// assert_eq!(example["qty"], Value::Int(3));
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $(record.insert(::std::string::String::from($key), $crate::Value::from($value));)+
        record
    }};
}
