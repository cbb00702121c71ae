#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use oxide_schema::prelude::*;
use oxide_schema::record;
use sqlx::sqlite::SqlitePoolOptions;

// =============================================================================
// Recording MySQL executor
// =============================================================================

/// Canned introspection rows for one table.
#[derive(Debug, Clone, Default)]
pub struct CannedTable {
    pub columns: Vec<Record>,
    pub indexes: Vec<Record>,
}

/// Executor that records every statement and answers introspection queries
/// from canned `DESCRIBE` / `SHOW INDEXES` rows.
#[derive(Debug, Default)]
pub struct MockExecutor {
    dialect: MySqlDialect,
    tables: Mutex<HashMap<String, CannedTable>>,
    rows: Mutex<Vec<Record>>,
    failures: Mutex<Vec<String>>,
    log: Mutex<Vec<String>>,
    insert_id: Mutex<Option<i64>>,
}

impl MockExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the table exist with the given columns and indexes.
    pub fn table(&self, name: &str, columns: Vec<Record>, indexes: Vec<Record>) {
        self.tables
            .lock()
            .unwrap()
            .insert(name.to_string(), CannedTable { columns, indexes });
    }

    /// Rows returned by any other query.
    pub fn rows(&self, rows: Vec<Record>) {
        *self.rows.lock().unwrap() = rows;
    }

    /// Every statement containing `fragment` fails.
    pub fn fail_on(&self, fragment: &str) {
        self.failures.lock().unwrap().push(fragment.to_string());
    }

    /// Id reported by the next statements.
    pub fn insert_id(&self, id: i64) {
        *self.insert_id.lock().unwrap() = Some(id);
    }

    /// Every query and statement issued so far.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Statements (not queries) issued so far.
    pub fn statements(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|sql| {
                !sql.starts_with("SELECT")
                    && !sql.starts_with("DESCRIBE")
                    && !sql.starts_with("SHOW")
            })
            .collect()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    fn answer(&self, sql: &str) -> Vec<Record> {
        let tables = self.tables.lock().unwrap();
        if sql.starts_with("SELECT 1 FROM information_schema.tables") {
            let exists = tables.keys().any(|name| sql.ends_with(&format!("'{name}'")));
            return if exists { vec![record! { "1" => 1 }] } else { Vec::new() };
        }
        for (name, table) in tables.iter() {
            if sql == format!("DESCRIBE `{name}`") {
                return table.columns.clone();
            }
            if sql == format!("SHOW INDEXES IN `{name}`") {
                return table.indexes.clone();
            }
        }
        self.rows.lock().unwrap().clone()
    }
}

impl SqlExecutor for MockExecutor {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, oxide_schema::Result<Vec<Record>>> {
        Box::pin(async move {
            self.log.lock().unwrap().push(sql.to_string());
            Ok(self.answer(sql))
        })
    }

    fn exec<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, oxide_schema::Result<ExecOutcome>> {
        Box::pin(async move {
            self.log.lock().unwrap().push(sql.to_string());
            let failing = self
                .failures
                .lock()
                .unwrap()
                .iter()
                .any(|fragment| sql.contains(fragment.as_str()));
            if failing {
                return Err(SchemaError::Store(sqlx::Error::Protocol(format!(
                    "scripted failure: {sql}"
                ))));
            }
            Ok(ExecOutcome {
                rows_affected: 1,
                last_insert_id: *self.insert_id.lock().unwrap(),
            })
        })
    }
}

/// A `DESCRIBE` row.
pub fn describe(field: &str, sql_type: &str, extra: &str) -> Record {
    record! {
        "Field" => field,
        "Type" => sql_type,
        "Null" => "YES",
        "Key" => "",
        "Default" => Value::Null,
        "Extra" => extra,
    }
}

/// A `SHOW INDEXES` row.
pub fn index(key_name: &str, column: &str) -> Record {
    record! { "Key_name" => key_name, "Column_name" => column }
}

pub fn mysql_catalog(executor: &Arc<MockExecutor>) -> Catalog {
    let executor: Arc<dyn SqlExecutor> = executor.clone();
    Catalog::new(executor)
}

// =============================================================================
// SQLite
// =============================================================================

pub async fn sqlite_catalog() -> Catalog {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create pool");
    Catalog::new(Arc::new(SqlxExecutor::sqlite(pool)))
}

// =============================================================================
// Schemas and hooks
// =============================================================================

pub fn widgets() -> SchemaDefinition {
    SchemaDefinition::new("Widgets")
        .field(FieldDescriptor::new("id", SqlType::Int).auto_increment())
        .field(FieldDescriptor::varchar("name", 32).default(""))
        .field(FieldDescriptor::new("qty", SqlType::Int).default(0))
        .primary_key("id")
}

/// Start hook counting its runs.
#[derive(Debug, Clone, Default)]
pub struct CountingHook {
    pub runs: Arc<AtomicUsize>,
}

impl CountingHook {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl StartHook for CountingHook {
    fn run<'a>(&'a self, _catalog: &'a Catalog) -> BoxFuture<'a, oxide_schema::Result<()>> {
        Box::pin(async move {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Records event kinds (and the table they concern) in firing order.
pub fn record_events(catalog: &mut Catalog) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in [
        EventKind::Ready,
        EventKind::BeforeChange,
        EventKind::AfterChange,
        EventKind::Remove,
    ] {
        let seen = Arc::clone(&seen);
        catalog.on(kind, move |event| {
            let entry = match event {
                SchemaEvent::Ready => "ready".to_string(),
                SchemaEvent::BeforeChange { schema } => format!("beforeChange {}", schema.name),
                SchemaEvent::AfterChange { schema, applied } => {
                    format!("afterChange {} {applied}", schema.name)
                }
                SchemaEvent::Remove { schema, row } => {
                    format!("remove {} {}", schema.name, row.get("id").cloned().unwrap_or(Value::Null))
                }
            };
            seen.lock().unwrap().push(entry);
        });
    }
    seen
}
