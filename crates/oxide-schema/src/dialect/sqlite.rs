//! SQLite dialect.
//!
//! SQLite has limited ALTER TABLE support. Columns can be added, dropped and
//! renamed in place; retyping a column, changing the primary key and adding
//! key or auto-increment columns would need table recreation, so those
//! operations are rendered as `--` comments.

use crate::plan::DiffOperation;
use crate::schema::{
    parse_column_type, ColumnList, DefaultValue, FieldDescriptor, LiveIndex, LiveTable,
    SchemaDefinition,
};
use crate::value::{EscapeStyle, Record, Value};

use super::{group_index_columns, text_column, Dialect, SETTINGS_TABLE};

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn columns(&self, columns: &ColumnList) -> String {
        columns
            .columns()
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn create_index_sql(&self, table: &str, columns: &ColumnList) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.quote_identifier(&self.index_name(table, columns)),
            self.quote_identifier(table),
            self.columns(columns)
        )
    }

    fn literal(&self, s: &str) -> String {
        self.quote(&Value::from(s))
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn escape_style(&self) -> EscapeStyle {
        EscapeStyle::Doubling
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn column_definition(&self, field: &FieldDescriptor) -> String {
        if field.auto_increment {
            // Only a rowid alias can auto-increment.
            return format!(
                "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                self.quote_identifier(&field.name)
            );
        }
        format!(
            "{} {}",
            self.quote_identifier(&field.name),
            self.type_name(field)
        )
    }

    fn index_name(&self, table: &str, columns: &ColumnList) -> String {
        format!("{table}_{}", columns.identifier())
    }

    fn create_table_sql(&self, schema: &SchemaDefinition) -> Vec<String> {
        let pk = schema.effective_primary_key();
        let inline_key = pk.as_ref().and_then(ColumnList::single).and_then(|name| {
            schema
                .get_field(name)
                .filter(|f| f.auto_increment)
                .map(|f| f.name.clone())
        });

        let mut parts: Vec<String> = schema
            .stored_fields()
            .map(|f| self.column_definition(f))
            .collect();
        if let Some(pk) = pk.filter(|_| inline_key.is_none()) {
            parts.push(format!("PRIMARY KEY ({})", self.columns(&pk)));
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(&schema.name),
            parts.join(",\n  ")
        )];
        statements.extend(
            schema
                .indexes
                .iter()
                .map(|index| self.create_index_sql(&schema.name, index)),
        );
        statements
    }

    fn table_exists_sql(&self, table: &str) -> String {
        format!(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = {}",
            self.literal(table)
        )
    }

    fn columns_sql(&self, table: &str) -> String {
        let name = self.literal(table);
        format!(
            "SELECT p.name AS name, p.type AS type, p.pk AS pk, p.dflt_value AS dflt_value, \
             (SELECT sql FROM sqlite_master WHERE type = 'table' AND name = {name}) LIKE '%AUTOINCREMENT%' AS autoinc \
             FROM pragma_table_info({name}) AS p ORDER BY p.cid"
        )
    }

    fn indexes_sql(&self, table: &str) -> String {
        format!(
            "SELECT il.name AS index_name, ii.name AS column_name \
             FROM pragma_index_list({}) AS il, pragma_index_info(il.name) AS ii \
             WHERE il.origin = 'c' ORDER BY il.name, ii.seqno",
            self.literal(table)
        )
    }

    fn parse_live_table(&self, table: &str, columns: &[Record], indexes: &[Record]) -> LiveTable {
        let mut key_columns: Vec<(i64, String)> = Vec::new();
        let fields = columns
            .iter()
            .filter_map(|row| {
                let name = text_column(row, "name")?;
                let declared = text_column(row, "type").unwrap_or_default();
                let (sql_type, size) = parse_column_type(&declared);
                let pk = row.get("pk").and_then(Value::as_i64).unwrap_or(0);
                let autoinc = row.get("autoinc").and_then(Value::as_i64).unwrap_or(0) != 0;

                if pk > 0 {
                    key_columns.push((pk, name.clone()));
                }
                let mut field = FieldDescriptor::new(name, sql_type);
                field.size = size;
                field.auto_increment =
                    autoinc && pk > 0 && declared.eq_ignore_ascii_case("integer");
                field.default = row
                    .get("dflt_value")
                    .filter(|v| !v.is_null())
                    .map(|v| DefaultValue::Literal(v.clone()));
                Some(field)
            })
            .collect();

        key_columns.sort_by_key(|(order, _)| *order);
        let primary_key = (!key_columns.is_empty())
            .then(|| ColumnList::new(key_columns.into_iter().map(|(_, c)| c).collect()));

        let grouped = group_index_columns(indexes.iter().filter_map(|row| {
            Some((
                text_column(row, "index_name")?,
                text_column(row, "column_name")?,
            ))
        }));

        LiveTable {
            name: table.to_string(),
            fields,
            primary_key,
            indexes: grouped
                .into_iter()
                .map(|(name, columns)| LiveIndex::new(name, ColumnList::new(columns)))
                .collect(),
        }
    }

    fn generate_sql(&self, table: &str, operation: &DiffOperation) -> Vec<String> {
        let qt = self.quote_identifier(table);
        match operation {
            DiffOperation::AddField { field, primary_key } => {
                if *primary_key || field.auto_increment {
                    return vec![format!(
                        "-- Key column {}.{} cannot be added in SQLite. Table recreation required.",
                        table, field.name
                    )];
                }
                let mut statements = vec![format!(
                    "ALTER TABLE {qt} ADD COLUMN {}",
                    self.column_definition(field)
                )];
                statements.extend(self.backfill_sql(table, field));
                statements
            }

            DiffOperation::DropField { name } => vec![format!(
                "ALTER TABLE {qt} DROP COLUMN {}",
                self.quote_identifier(name)
            )],

            DiffOperation::RenameOrRetypeField { from, to } => {
                if from.type_eq(to) {
                    vec![format!(
                        "ALTER TABLE {qt} RENAME COLUMN {} TO {}",
                        self.quote_identifier(&from.name),
                        self.quote_identifier(&to.name)
                    )]
                } else {
                    vec![format!(
                        "-- Changing the type of {}.{} to {} is not supported in SQLite. \
                         Table recreation required.",
                        table,
                        from.name,
                        self.type_name(to)
                    )]
                }
            }

            DiffOperation::DropPrimaryKey => vec![format!(
                "-- Primary key of {table} cannot be dropped in SQLite. Table recreation required."
            )],

            DiffOperation::AddPrimaryKey { columns } => vec![format!(
                "-- Primary key ({columns}) cannot be added to {table} in SQLite. \
                 Table recreation required."
            )],

            DiffOperation::DropIndex { name, .. } => {
                vec![format!("DROP INDEX {}", self.quote_identifier(name))]
            }

            DiffOperation::AddIndex { columns } => vec![self.create_index_sql(table, columns)],
        }
    }

    fn settings_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\"key\" varchar(16) NOT NULL PRIMARY KEY, \"value\" varchar(16))",
            self.quote_identifier(SETTINGS_TABLE)
        )
    }
}
