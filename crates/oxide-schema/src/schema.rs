//! Schema representation types.
//!
//! A [`SchemaDefinition`] describes the table an application expects; a
//! [`LiveTable`] describes what the store actually has. Both are built from
//! [`FieldDescriptor`]s so the reconciliation engine can compare them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SchemaError};
use crate::hooks::{OnLoad, OnPut, SchemaHooks, StartHook};
use crate::value::Value;

/// Storage engine used when a schema does not name one.
pub const DEFAULT_ENGINE: &str = "InnoDB";

/// SQL column types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SqlType {
    /// `tinyint`
    TinyInt,
    /// `smallint`
    SmallInt,
    /// `mediumint`
    MediumInt,
    /// `int`
    Int,
    /// `bigint`
    BigInt,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `decimal`
    Decimal,
    /// `char`
    Char,
    /// `varchar` (size required)
    Varchar,
    /// `text`
    Text,
    /// `mediumtext`
    MediumText,
    /// `longtext`
    LongText,
    /// `blob`
    Blob,
    /// `mediumblob`
    MediumBlob,
    /// `longblob`
    LongBlob,
    /// `varbinary`
    VarBinary,
    /// `date`
    Date,
    /// `time`
    Time,
    /// `datetime`
    DateTime,
    /// `timestamp`
    Timestamp,
    /// `enum`
    Enum,
    /// Any other type, by its lowercase name.
    Other(String),
}

impl SqlType {
    /// Parses a type name as reported by the store or written in a
    /// declaration.
    ///
    /// Display widths, sizes and modifiers are ignored: `int(11) unsigned`
    /// parses as [`SqlType::Int`]. Use [`parse_column_type`] to keep the size.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let lower = s.trim().to_ascii_lowercase();
        let base = lower
            .split(['(', ' '])
            .next()
            .unwrap_or_default()
            .to_string();
        match base.as_str() {
            "tinyint" | "bool" | "boolean" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "mediumint" => Self::MediumInt,
            "int" | "integer" => Self::Int,
            "bigint" => Self::BigInt,
            "float" | "real" => Self::Float,
            "double" => Self::Double,
            "decimal" | "numeric" => Self::Decimal,
            "char" => Self::Char,
            "varchar" => Self::Varchar,
            "text" => Self::Text,
            "mediumtext" => Self::MediumText,
            "longtext" => Self::LongText,
            "blob" => Self::Blob,
            "mediumblob" => Self::MediumBlob,
            "longblob" => Self::LongBlob,
            "varbinary" => Self::VarBinary,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" => Self::DateTime,
            "timestamp" => Self::Timestamp,
            "enum" => Self::Enum,
            _ => Self::Other(base),
        }
    }

    /// Returns the lowercase SQL name of this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::MediumInt => "mediumint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Char => "char",
            Self::Varchar => "varchar",
            Self::Text => "text",
            Self::MediumText => "mediumtext",
            Self::LongText => "longtext",
            Self::Blob => "blob",
            Self::MediumBlob => "mediumblob",
            Self::LongBlob => "longblob",
            Self::VarBinary => "varbinary",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Timestamp => "timestamp",
            Self::Enum => "enum",
            Self::Other(name) => name,
        }
    }

    /// Returns whether this is an integer-family type.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::TinyInt | Self::SmallInt | Self::MediumInt | Self::Int | Self::BigInt
        )
    }

    /// Returns whether the type carries a size in its DDL (`varchar(32)`).
    #[must_use]
    pub fn is_sized(&self) -> bool {
        matches!(self, Self::Varchar | Self::Char | Self::VarBinary)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SqlType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<SqlType> for String {
    fn from(t: SqlType) -> Self {
        t.as_str().to_string()
    }
}

/// Parses a full column type such as `varchar(32)` or `int(11) unsigned`
/// into its type and size.
///
/// For multi-argument types (`decimal(10,2)`) the first argument is the size.
#[must_use]
pub fn parse_column_type(s: &str) -> (SqlType, Option<u32>) {
    let size = s
        .split_once('(')
        .and_then(|(_, rest)| rest.split([')', ',']).next())
        .and_then(|n| n.trim().parse().ok());
    (SqlType::parse(s), size)
}

/// A zero-argument generator for default values.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Declared default for a field.
#[derive(Clone)]
pub enum DefaultValue {
    /// A fixed value.
    Literal(Value),
    /// Computed each time a default is needed.
    Generated(DefaultFn),
}

impl DefaultValue {
    /// Produces the default value.
    #[must_use]
    pub fn produce(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Generated(generate) => generate(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Generated(a), Self::Generated(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Serialize for DefaultValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Literal(value) => value.serialize(serializer),
            Self::Generated(_) => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for DefaultValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::Literal)
    }
}

/// Visibility flags for a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldFlags {
    /// Not stored, not queried.
    pub reserved: bool,
    /// Exists only on the client side; not stored, not queried.
    pub client_only: bool,
    /// Stored, but stripped by [`crate::Catalog::clean`] before leaving the server.
    pub server_only: bool,
    /// Stored, but never turned into a WHERE predicate.
    pub no_query: bool,
}

/// Schema definition for a single field (column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Field (column) name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    /// Size, required for varchar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// Whether the column auto-increments.
    #[serde(default)]
    pub auto_increment: bool,
    /// Declared default.
    #[serde(default, rename = "defaultValue", skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Visibility flags.
    #[serde(flatten)]
    pub flags: FieldFlags,
}

impl FieldDescriptor {
    /// Creates a new field.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            size: None,
            auto_increment: false,
            default: None,
            flags: FieldFlags::default(),
        }
    }

    /// Creates a `varchar(size)` field.
    #[must_use]
    pub fn varchar(name: impl Into<String>, size: u32) -> Self {
        Self::new(name, SqlType::Varchar).size(size)
    }

    /// Sets the size.
    #[must_use]
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Marks the field as auto-incrementing.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets a literal default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    /// Sets a generated default value.
    #[must_use]
    pub fn default_with(mut self, generate: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Generated(Arc::new(generate)));
        self
    }

    /// Marks the field as reserved.
    #[must_use]
    pub fn reserved(mut self) -> Self {
        self.flags.reserved = true;
        self
    }

    /// Marks the field as client-only.
    #[must_use]
    pub fn client_only(mut self) -> Self {
        self.flags.client_only = true;
        self
    }

    /// Marks the field as server-only.
    #[must_use]
    pub fn server_only(mut self) -> Self {
        self.flags.server_only = true;
        self
    }

    /// Excludes the field from example queries.
    #[must_use]
    pub fn no_query(mut self) -> Self {
        self.flags.no_query = true;
        self
    }

    /// Returns whether the field has a column in the table.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        !self.flags.reserved && !self.flags.client_only
    }

    /// Returns whether the field may appear in a WHERE clause.
    #[must_use]
    pub fn is_queryable(&self) -> bool {
        self.is_stored() && !self.flags.no_query
    }

    /// Returns the value a new record gets for this field.
    ///
    /// An unset (or unset-like) declared default falls back to `0` for
    /// integer-family types and the empty string otherwise.
    #[must_use]
    pub fn default_value(&self) -> Value {
        if let Some(value) = self
            .default
            .as_ref()
            .map(DefaultValue::produce)
            .filter(Value::is_truthy)
        {
            return value;
        }
        if self.sql_type.is_integer() {
            Value::Int(0)
        } else {
            Value::Text(String::new())
        }
    }

    /// Field-type equality used to match declared and live columns.
    ///
    /// Types must be equal; varchar sizes must also be equal, and
    /// integer-family fields must agree on auto-increment.
    #[must_use]
    pub fn type_eq(&self, other: &Self) -> bool {
        if self.sql_type != other.sql_type {
            return false;
        }
        if self.sql_type == SqlType::Varchar {
            return self.size == other.size;
        }
        if self.sql_type.is_integer() {
            return self.auto_increment == other.auto_increment;
        }
        true
    }
}

/// An ordered list of column names, written comma-joined (`"a,b"`).
///
/// Used for primary keys and indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ColumnList(Vec<String>);

impl ColumnList {
    /// Parses a comma-joined column list, trimming whitespace.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        Self(
            s.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Creates a list from column names.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self(columns)
    }

    /// Returns the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.0
    }

    /// Returns the only column, if the list has exactly one.
    #[must_use]
    pub fn single(&self) -> Option<&str> {
        match self.0.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Returns true if the list has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the identifier form: columns joined with underscores.
    #[must_use]
    pub fn identifier(&self) -> String {
        self.0.join("_")
    }
}

impl fmt::Display for ColumnList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

impl From<&str> for ColumnList {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for ColumnList {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ColumnList> for String {
    fn from(list: ColumnList) -> Self {
        list.to_string()
    }
}

/// Declared structure and hooks of a table.
///
/// # Example
///
/// ```
/// use oxide_schema::{FieldDescriptor, SchemaDefinition, SqlType};
///
/// let widgets = SchemaDefinition::new("Widgets")
///     .field(FieldDescriptor::new("id", SqlType::Int).auto_increment())
///     .field(FieldDescriptor::varchar("name", 32).default(""))
///     .field(FieldDescriptor::new("qty", SqlType::Int).default(0))
///     .primary_key("id")
///     .index("name");
///
/// assert_eq!(widgets.stored_fields().count(), 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    /// Schema (and table) name.
    pub name: String,
    /// Fields, in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// Primary key column(s).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<ColumnList>,
    /// Indexes, one column list each.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<ColumnList>,
    /// Storage engine (MySQL only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Lifecycle hooks.
    #[serde(skip)]
    pub hooks: SchemaHooks,
}

impl SchemaDefinition {
    /// Creates an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            engine: None,
            hooks: SchemaHooks::default(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the primary key (`"id"` or `"a,b"`).
    #[must_use]
    pub fn primary_key(mut self, columns: impl Into<ColumnList>) -> Self {
        self.primary_key = Some(columns.into());
        self
    }

    /// Adds an index (`"name"` or `"a,b"`).
    #[must_use]
    pub fn index(mut self, columns: impl Into<ColumnList>) -> Self {
        self.indexes.push(columns.into());
        self
    }

    /// Sets the storage engine.
    #[must_use]
    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    /// Sets the hook applied to every loaded record.
    #[must_use]
    pub fn on_load(mut self, hook: impl OnLoad + 'static) -> Self {
        self.hooks.on_load = Some(Arc::new(hook));
        self
    }

    /// Sets the hook applied to every record before it is written.
    #[must_use]
    pub fn on_put(mut self, hook: impl OnPut + 'static) -> Self {
        self.hooks.on_put = Some(Arc::new(hook));
        self
    }

    /// Sets the hook run at start after the table was created.
    #[must_use]
    pub fn on_create(mut self, hook: impl StartHook + 'static) -> Self {
        self.hooks.on_create = Some(Arc::new(hook));
        self
    }

    /// Sets the hook run at start after the table was altered.
    #[must_use]
    pub fn on_change(mut self, hook: impl StartHook + 'static) -> Self {
        self.hooks.on_change = Some(Arc::new(hook));
        self
    }

    /// Returns the fields that have a column in the table.
    pub fn stored_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_stored())
    }

    /// Gets a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the storage engine, defaulting to InnoDB.
    #[must_use]
    pub fn engine_name(&self) -> &str {
        self.engine.as_deref().unwrap_or(DEFAULT_ENGINE)
    }

    /// Returns the primary key the table is created and reconciled with.
    ///
    /// Without a declared key, the first stored auto-increment field is the key.
    #[must_use]
    pub fn effective_primary_key(&self) -> Option<ColumnList> {
        self.primary_key.clone().filter(|pk| !pk.is_empty()).or_else(|| {
            self.stored_fields()
                .find(|f| f.auto_increment)
                .map(|f| ColumnList::new(vec![f.name.clone()]))
        })
    }

    /// Returns the primary key column if the key has exactly one column.
    #[must_use]
    pub fn single_primary_key(&self) -> Option<String> {
        self.effective_primary_key()
            .and_then(|pk| pk.single().map(str::to_string))
    }

    /// Checks that field names are unique, varchar fields have a size and
    /// an auto-increment field is the whole primary key.
    pub fn validate(&self) -> Result<()> {
        let key = self.single_primary_key();
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            if field.sql_type == SqlType::Varchar && field.size.unwrap_or(0) == 0 {
                return Err(SchemaError::InvalidField {
                    field: field.name.clone(),
                    reason: "varchar requires a size greater than 0".to_string(),
                });
            }
            let keyed = key.as_deref() == Some(field.name.as_str());
            if field.auto_increment && field.is_stored() && !keyed {
                return Err(SchemaError::InvalidField {
                    field: field.name.clone(),
                    reason: "auto-increment field must be the single-column primary key"
                        .to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Structure of a table as introspected from the store.
///
/// Built fresh on every reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTable {
    /// Table name.
    pub name: String,
    /// Columns, in the store's order.
    pub fields: Vec<FieldDescriptor>,
    /// Primary key column(s).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<ColumnList>,
    /// Secondary indexes.
    pub indexes: Vec<LiveIndex>,
}

/// A secondary index as introspected.
///
/// The name is kept as found: a column rename leaves it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveIndex {
    /// Index name in the store.
    pub name: String,
    /// Indexed columns, in key order.
    pub columns: ColumnList,
}

impl LiveIndex {
    /// Creates a live index.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: impl Into<ColumnList>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into(),
        }
    }
}
