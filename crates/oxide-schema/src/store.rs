//! Example-driven record access.
//!
//! Every operation names a registered schema and takes an example
//! [`Record`]; predicates come from [`where_clause::build`]. Each call
//! issues its statements independently and propagates store errors
//! unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::hooks::SchemaEvent;
use crate::registry::Catalog;
use crate::schema::SchemaDefinition;
use crate::value::{Record, Value};
use crate::where_clause;

/// Default page size for [`Catalog::list`].
pub const DEFAULT_PAGE_SIZE: u64 = 25;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("ASC"),
            Self::Desc => f.write_str("DESC"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(format!("invalid sort direction: {other}")),
        }
    }
}

/// Pagination for [`Catalog::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListParams {
    /// Offset of the first row.
    pub start: u64,
    /// Page size.
    pub limit: u64,
    /// Sort field; the primary key when absent.
    pub sort: Option<String>,
    /// Sort direction.
    pub dir: SortDirection,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            start: 0,
            limit: DEFAULT_PAGE_SIZE,
            sort: None,
            dir: SortDirection::Asc,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// Matching rows, ignoring pagination.
    pub count: u64,
    /// Rows of the requested page.
    pub list: Vec<Record>,
}

/// Per-row enrichment applied by [`Catalog::list`].
pub type RowFn<'a> = &'a (dyn Fn(&mut Record) + Send + Sync);

impl Catalog {
    /// Returns a record with every stored field set to its default,
    /// overlaid with the example.
    pub fn new_record(&self, name: &str, example: &Record) -> Result<Record> {
        let schema = self.get_schema(name)?;
        let mut record: Record = schema
            .stored_fields()
            .map(|f| (f.name.clone(), f.default_value()))
            .collect();
        for (key, value) in example {
            record.insert(key.clone(), value.clone());
        }
        Ok(record)
    }

    /// Removes server-only fields from a record.
    pub fn clean(&self, name: &str, mut record: Record) -> Result<Record> {
        let schema = self.get_schema(name)?;
        for field in schema.fields.iter().filter(|f| f.flags.server_only) {
            record.shift_remove(&field.name);
        }
        Ok(record)
    }

    /// Builds the predicates an example selects.
    pub fn where_clause(&self, name: &str, example: &Record) -> Result<Vec<String>> {
        let schema = self.get_schema(name)?;
        Ok(where_clause::build(self.dialect(), schema, example))
    }

    /// Counts the rows matching an example.
    pub async fn count(&self, name: &str, example: &Record) -> Result<u64> {
        let schema = self.get_schema(name)?;
        let predicates = where_clause::build(self.dialect(), schema, example);
        self.count_where(schema, &predicates).await
    }

    /// Returns every row matching an example.
    pub async fn find(&self, name: &str, example: &Record) -> Result<Vec<Record>> {
        let schema = self.get_schema(name)?;
        let predicates = where_clause::build(self.dialect(), schema, example);
        let sql = format!(
            "SELECT * FROM {}{}",
            self.dialect().quote_identifier(&schema.name),
            where_clause::render(&predicates)
        );
        self.load(schema, &sql).await
    }

    /// Returns the first row matching an example, or an empty record.
    pub async fn find_one(&self, name: &str, example: &Record) -> Result<Record> {
        Ok(self
            .find(name, example)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// Returns one page of the rows matching an example, with the total count.
    ///
    /// The sort field must be a stored field of the schema.
    pub async fn list(
        &self,
        name: &str,
        example: &Record,
        params: &ListParams,
        row_fn: Option<RowFn<'_>>,
    ) -> Result<Page> {
        let schema = self.get_schema(name)?;
        let dialect = self.dialect();
        let predicates = where_clause::build(dialect, schema, example);
        let count = self.count_where(schema, &predicates).await?;

        let sort: Vec<String> = match &params.sort {
            Some(field) => {
                if !schema.stored_fields().any(|f| &f.name == field) {
                    return Err(SchemaError::UnknownField {
                        schema: schema.name.clone(),
                        field: field.clone(),
                    });
                }
                vec![field.clone()]
            }
            None => schema
                .effective_primary_key()
                .map(|pk| pk.columns().to_vec())
                .unwrap_or_default(),
        };

        let mut sql = format!(
            "SELECT * FROM {}{}",
            dialect.quote_identifier(&schema.name),
            where_clause::render(&predicates)
        );
        if !sort.is_empty() {
            let order: Vec<String> = sort
                .iter()
                .map(|column| format!("{} {}", dialect.qualify(&schema.name, column), params.dir))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }
        sql.push(' ');
        sql.push_str(&dialect.limit_clause(params.start, params.limit));

        let mut list = self.load(schema, &sql).await?;
        if let Some(row_fn) = row_fn {
            list.iter_mut().for_each(row_fn);
        }
        Ok(Page { count, list })
    }

    /// Writes a record, replacing any existing row with the same primary key.
    ///
    /// The example is the complete desired row: fields it omits are written
    /// with their defaults. A missing single-column key is filled from the
    /// store's generated id.
    pub async fn put_one(&self, name: &str, example: &Record) -> Result<Record> {
        let schema = self.get_schema(name)?;
        let mut record = self.new_record(name, example)?;
        if let Some(hook) = &schema.hooks.on_put {
            hook.on_put(&mut record);
        }

        let row: Record = schema
            .stored_fields()
            .filter_map(|field| {
                let value = record.get(&field.name)?;
                let value = if field.auto_increment && !value.is_truthy() {
                    Value::Null
                } else {
                    value.clone()
                };
                Some((field.name.clone(), value))
            })
            .collect();
        let outcome = self
            .executor()
            .exec(&self.dialect().upsert_sql(&schema.name, &row))
            .await?;

        // SQLite reports a rowid for every insert; only a generated key is taken.
        let generated = schema
            .single_primary_key()
            .filter(|pk| schema.get_field(pk).is_some_and(|f| f.auto_increment));
        if let Some(pk) = generated {
            let missing = !record.get(&pk).is_some_and(Value::is_truthy);
            if let (true, Some(id)) = (missing, outcome.last_insert_id) {
                record.insert(pk, Value::Int(id));
            }
        }
        if let Some(hook) = &schema.hooks.on_load {
            hook.on_load(&mut record);
        }
        Ok(record)
    }

    /// Deletes the rows matching an example and returns how many were deleted.
    ///
    /// An example that selects nothing is rejected with
    /// [`SchemaError::InvalidExample`] instead of deleting every row. A
    /// `remove` event fires for each matching row first.
    pub async fn remove(&self, name: &str, example: &Record) -> Result<u64> {
        let schema = self.get_schema(name)?;
        let dialect = self.dialect();
        let predicates = where_clause::build(dialect, schema, example);
        if predicates.is_empty() {
            return Err(SchemaError::InvalidExample(schema.name.clone()));
        }

        let rows = self.find(name, example).await?;
        for row in &rows {
            self.fire(&SchemaEvent::Remove { schema, row });
        }

        let sql = format!(
            "DELETE FROM {}{}",
            dialect.quote_identifier(&schema.name),
            where_clause::render(&predicates)
        );
        Ok(self.executor().exec(&sql).await?.rows_affected)
    }

    async fn count_where(&self, schema: &SchemaDefinition, predicates: &[String]) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {}{}",
            self.dialect().quote_identifier(&schema.name),
            where_clause::render(predicates)
        );
        let rows = self.executor().query(&sql).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0))
    }

    async fn load(&self, schema: &SchemaDefinition, sql: &str) -> Result<Vec<Record>> {
        let mut rows = self.executor().query(sql).await?;
        if let Some(hook) = &schema.hooks.on_load {
            for row in &mut rows {
                hook.on_load(row);
            }
        }
        Ok(rows)
    }
}
