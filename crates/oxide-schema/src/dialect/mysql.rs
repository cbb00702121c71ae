//! MySQL dialect.
//!
//! Tables are introspected with `DESCRIBE` and `SHOW INDEXES IN`, and altered
//! in place with `ALTER TABLE ... CHANGE`, which renames and retypes a column
//! in one statement.

use crate::plan::DiffOperation;
use crate::schema::{
    parse_column_type, ColumnList, DefaultValue, FieldDescriptor, LiveIndex, LiveTable,
    SchemaDefinition,
};
use crate::value::{EscapeStyle, Record, Value};

use super::{group_index_columns, text_column, Dialect, SETTINGS_TABLE};

/// MySQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn alter(&self, table: &str, clause: &str) -> String {
        format!("ALTER TABLE {} {clause}", self.quote_identifier(table))
    }

    fn columns(&self, columns: &ColumnList) -> String {
        columns
            .columns()
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn escape_style(&self) -> EscapeStyle {
        EscapeStyle::Backslash
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn column_definition(&self, field: &FieldDescriptor) -> String {
        let mut def = format!(
            "{} {}",
            self.quote_identifier(&field.name),
            self.type_name(field)
        );
        if field.auto_increment {
            def.push_str(" AUTO_INCREMENT");
        }
        def
    }

    fn index_name(&self, _table: &str, columns: &ColumnList) -> String {
        columns.identifier()
    }

    fn create_table_sql(&self, schema: &SchemaDefinition) -> Vec<String> {
        let mut parts: Vec<String> = schema
            .stored_fields()
            .map(|f| self.column_definition(f))
            .collect();
        for index in &schema.indexes {
            parts.push(format!(
                "INDEX {} ({})",
                self.quote_identifier(&self.index_name(&schema.name, index)),
                self.columns(index)
            ));
        }
        if let Some(pk) = schema.effective_primary_key() {
            parts.push(format!("PRIMARY KEY ({})", self.columns(&pk)));
        }
        vec![format!(
            "CREATE TABLE {} (\n  {}\n) ENGINE={}",
            self.quote_identifier(&schema.name),
            parts.join(",\n  "),
            schema.engine_name()
        )]
    }

    fn table_exists_sql(&self, table: &str) -> String {
        format!(
            "SELECT 1 FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = {}",
            self.quote(&Value::from(table))
        )
    }

    fn columns_sql(&self, table: &str) -> String {
        format!("DESCRIBE {}", self.quote_identifier(table))
    }

    fn indexes_sql(&self, table: &str) -> String {
        format!("SHOW INDEXES IN {}", self.quote_identifier(table))
    }

    fn parse_live_table(&self, table: &str, columns: &[Record], indexes: &[Record]) -> LiveTable {
        let fields = columns
            .iter()
            .filter_map(|row| {
                let name = text_column(row, "Field")?;
                let (sql_type, size) = parse_column_type(&text_column(row, "Type")?);
                let mut field = FieldDescriptor::new(name, sql_type);
                field.size = size;
                field.auto_increment = text_column(row, "Extra")
                    .is_some_and(|extra| extra.to_ascii_lowercase().contains("auto_increment"));
                field.default = row
                    .get("Default")
                    .filter(|v| !v.is_null())
                    .map(|v| DefaultValue::Literal(v.clone()));
                Some(field)
            })
            .collect();

        let grouped = group_index_columns(indexes.iter().filter_map(|row| {
            Some((
                text_column(row, "Key_name")?,
                text_column(row, "Column_name")?,
            ))
        }));

        let mut primary_key = None;
        let mut live_indexes = Vec::new();
        for (key, cols) in grouped {
            if key == "PRIMARY" {
                primary_key = Some(ColumnList::new(cols));
            } else {
                live_indexes.push(LiveIndex::new(key, ColumnList::new(cols)));
            }
        }

        LiveTable {
            name: table.to_string(),
            fields,
            primary_key,
            indexes: live_indexes,
        }
    }

    fn generate_sql(&self, table: &str, operation: &DiffOperation) -> Vec<String> {
        match operation {
            DiffOperation::AddField { field, primary_key } => {
                let mut clause = format!("ADD {}", self.column_definition(field));
                if *primary_key {
                    clause.push_str(&format!(
                        ", ADD PRIMARY KEY ({})",
                        self.quote_identifier(&field.name)
                    ));
                }
                let mut statements = vec![self.alter(table, &clause)];
                statements.extend(self.backfill_sql(table, field));
                statements
            }

            DiffOperation::DropField { name } => {
                vec![self.alter(table, &format!("DROP COLUMN {}", self.quote_identifier(name)))]
            }

            DiffOperation::RenameOrRetypeField { from, to } => vec![self.alter(
                table,
                &format!(
                    "CHANGE {} {}",
                    self.quote_identifier(&from.name),
                    self.column_definition(to)
                ),
            )],

            DiffOperation::DropPrimaryKey => vec![self.alter(table, "DROP PRIMARY KEY")],

            DiffOperation::AddPrimaryKey { columns } => vec![self.alter(
                table,
                &format!("ADD PRIMARY KEY ({})", self.columns(columns)),
            )],

            DiffOperation::DropIndex { name, .. } => vec![self.alter(
                table,
                &format!("DROP INDEX {}", self.quote_identifier(name)),
            )],

            DiffOperation::AddIndex { columns } => vec![self.alter(
                table,
                &format!(
                    "ADD INDEX {} ({})",
                    self.quote_identifier(&self.index_name(table, columns)),
                    self.columns(columns)
                ),
            )],
        }
    }

    fn settings_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (`key` varchar(16) NOT NULL PRIMARY KEY, `value` varchar(16)) ENGINE=InnoDB",
            self.quote_identifier(SETTINGS_TABLE)
        )
    }
}
