//! Database dialect implementations.
//!
//! Each dialect renders the statement text for table creation, diff
//! operations, introspection and record writes, and turns introspection
//! rows back into a [`LiveTable`].

mod mysql;
mod sqlite;

pub use mysql::MySqlDialect;
pub use sqlite::SqliteDialect;

use crate::plan::DiffOperation;
use crate::schema::{ColumnList, FieldDescriptor, LiveTable, SchemaDefinition};
use crate::value::{self, EscapeStyle, Record, Value};

/// Name of the table holding the schema version marker.
pub const SETTINGS_TABLE: &str = "SchemaSettings";

/// Trait for database-specific SQL generation.
pub trait Dialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns how string literals are escaped.
    fn escape_style(&self) -> EscapeStyle;

    /// Quotes a value as a literal. Every literal in generated SQL goes through here.
    fn quote(&self, value: &Value) -> String {
        value::quote(value, self.escape_style())
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String;

    /// Returns `table.column`, both quoted.
    fn qualify(&self, table: &str, column: &str) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Returns the SQL type of a field, with its size where the type takes one.
    fn type_name(&self, field: &FieldDescriptor) -> String {
        match field.size {
            Some(size) if field.sql_type.is_sized() => format!("{}({size})", field.sql_type),
            _ => field.sql_type.to_string(),
        }
    }

    /// Generates column definition SQL.
    fn column_definition(&self, field: &FieldDescriptor) -> String;

    /// Returns the name an index on `columns` gets.
    fn index_name(&self, table: &str, columns: &ColumnList) -> String;

    /// Renders the statements creating a table for a schema.
    fn create_table_sql(&self, schema: &SchemaDefinition) -> Vec<String>;

    /// Generates SQL for dropping a table if it exists.
    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_identifier(table))
    }

    /// Query returning one row if the table exists.
    fn table_exists_sql(&self, table: &str) -> String;

    /// Query describing the table's columns.
    fn columns_sql(&self, table: &str) -> String;

    /// Query describing the table's indexes.
    fn indexes_sql(&self, table: &str) -> String;

    /// Builds a live descriptor from the rows returned by
    /// [`Dialect::columns_sql`] and [`Dialect::indexes_sql`].
    fn parse_live_table(&self, table: &str, columns: &[Record], indexes: &[Record]) -> LiveTable;

    /// Generates SQL for a diff operation.
    ///
    /// Statements starting with `--` describe a change the dialect cannot
    /// make in place; executors log and skip them.
    fn generate_sql(&self, table: &str, operation: &DiffOperation) -> Vec<String>;

    /// Sets a newly added column to its default on every existing row.
    ///
    /// Auto-increment columns are filled by the store and get no backfill.
    fn backfill_sql(&self, table: &str, field: &FieldDescriptor) -> Option<String> {
        if field.auto_increment {
            return None;
        }
        Some(format!(
            "UPDATE {} SET {} = {}",
            self.quote_identifier(table),
            self.quote_identifier(&field.name),
            self.quote(&field.default_value())
        ))
    }

    /// Upsert by primary key: an existing row with the same key is replaced.
    fn upsert_sql(&self, table: &str, record: &Record) -> String {
        let columns: Vec<String> = record.keys().map(|c| self.quote_identifier(c)).collect();
        let values: Vec<String> = record.values().map(|v| self.quote(v)).collect();
        format!(
            "REPLACE INTO {} ({}) VALUES ({})",
            self.quote_identifier(table),
            columns.join(", "),
            values.join(", ")
        )
    }

    /// Pagination clause.
    fn limit_clause(&self, start: u64, limit: u64) -> String {
        format!("LIMIT {start}, {limit}")
    }

    /// Creates the version marker table if missing.
    fn settings_table_sql(&self) -> String;
}

/// Reads a text column from an introspection row, accepting byte strings.
pub(crate) fn text_column(row: &Record, column: &str) -> Option<String> {
    row.get(column)
        .and_then(Value::as_text)
        .map(|text| text.into_owned())
}

/// Groups `(index, column)` pairs into column lists, preserving first-seen order.
pub(crate) fn group_index_columns(
    pairs: impl IntoIterator<Item = (String, String)>,
) -> indexmap::IndexMap<String, Vec<String>> {
    let mut grouped: indexmap::IndexMap<String, Vec<String>> = indexmap::IndexMap::new();
    for (index, column) in pairs {
        grouped.entry(index).or_default().push(column);
    }
    grouped
}
