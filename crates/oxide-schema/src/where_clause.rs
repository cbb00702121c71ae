//! Example-driven WHERE clause construction.
//!
//! An example is a [`Record`] whose present fields become predicates:
//!
//! - a [`Value::Raw`] expression is used verbatim, with the first
//!   occurrence of the field name qualified by the table name
//! - a string containing `%` becomes `LIKE`
//! - a non-empty list becomes `IN (...)`; an empty list adds no predicate
//! - anything else becomes `=`
//!
//! Reserved, client-only and no-query fields are ignored, as are example
//! keys that name no field. The caller joins the predicates with `AND`.

use crate::dialect::Dialect;
use crate::schema::SchemaDefinition;
use crate::value::{Record, Value};

/// Builds the predicate list for an example.
#[must_use]
pub fn build(dialect: &dyn Dialect, schema: &SchemaDefinition, example: &Record) -> Vec<String> {
    schema
        .fields
        .iter()
        .filter(|field| field.is_queryable())
        .filter_map(|field| {
            let value = example.get(&field.name)?;
            let column = dialect.qualify(&schema.name, &field.name);
            match value {
                Value::Raw(expr) => Some(expr.replacen(&field.name, &column, 1)),
                Value::Text(s) if s.contains('%') => {
                    Some(format!("{column} LIKE {}", dialect.quote(value)))
                }
                Value::List(items) if items.is_empty() => None,
                Value::List(_) => Some(format!("{column} IN ({})", dialect.quote(value))),
                _ => Some(format!("{column} = {}", dialect.quote(value))),
            }
        })
        .collect()
}

/// Renders predicates as a ` WHERE ...` suffix, or nothing when empty.
#[must_use]
pub fn render(predicates: &[String]) -> String {
    if predicates.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicates.join(" AND "))
    }
}
