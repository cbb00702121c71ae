//! The schema catalog.
//!
//! A [`Catalog`] owns every registered [`SchemaDefinition`], the executor
//! used to reach the store, the event bus and the queue of start hooks.
//! Registering a schema materializes its table: missing tables are created,
//! existing ones are reconciled against the declaration.
//!
//! Registration happens once at process start, through `&mut Catalog`;
//! after [`Catalog::start`] the catalog is only read and can be shared.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::dialect::{Dialect, SETTINGS_TABLE};
use crate::error::{Result, SchemaError};
use crate::executor::SqlExecutor;
use crate::hooks::{EventBus, EventKind, SchemaEvent, SchemaHooks, StartHook};
use crate::plan::DiffPlan;
use crate::reconcile::{self, SyncOutcome};
use crate::schema::{LiveTable, SchemaDefinition};
use crate::value::Value;

/// Version written by [`Catalog::init`] when the store has none.
pub const INITIAL_VERSION: &str = "v1";

#[derive(Debug)]
struct Entry {
    definition: SchemaDefinition,
    materialized: bool,
}

/// Registered schemas and the store they are materialized in.
pub struct Catalog {
    executor: Arc<dyn SqlExecutor>,
    schemas: IndexMap<String, Entry>,
    events: EventBus,
    start_hooks: Vec<Arc<dyn StartHook>>,
    last_version: OnceCell<String>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("dialect", &self.dialect().name())
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .field("events", &self.events)
            .field("start_hooks", &self.start_hooks.len())
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Creates an empty catalog over an executor.
    #[must_use]
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            executor,
            schemas: IndexMap::new(),
            events: EventBus::new(),
            start_hooks: Vec::new(),
            last_version: OnceCell::new(),
        }
    }

    /// Returns the store's dialect.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.executor.dialect()
    }

    /// Returns the executor.
    #[must_use]
    pub fn executor(&self) -> &dyn SqlExecutor {
        self.executor.as_ref()
    }

    /// Registers a schema and materializes its table.
    ///
    /// Store failures while creating or reconciling are logged and reported
    /// in the returned [`SyncOutcome`]; only an invalid declaration is an error.
    pub async fn add(&mut self, schema: SchemaDefinition) -> Result<SyncOutcome> {
        schema.validate()?;
        let name = schema.name.clone();
        self.schemas.insert(
            name.clone(),
            Entry {
                definition: schema,
                materialized: true,
            },
        );
        Ok(self.sync(&name).await)
    }

    /// Registers an abstract schema. No table is created for it.
    pub fn define(&mut self, schema: SchemaDefinition) -> Result<()> {
        schema.validate()?;
        self.schemas.insert(
            schema.name.clone(),
            Entry {
                definition: schema,
                materialized: false,
            },
        );
        Ok(())
    }

    /// Registers `child` as an extension of `base`.
    ///
    /// The child gets the base fields first, then its own; it inherits the
    /// base primary key, and its indexes are appended to the base indexes
    /// when both declare some.
    pub async fn extend(&mut self, base: &str, mut child: SchemaDefinition) -> Result<SyncOutcome> {
        let base = self.get_schema(base)?;
        child.fields = base
            .fields
            .iter()
            .cloned()
            .chain(std::mem::take(&mut child.fields))
            .collect();
        child.primary_key.clone_from(&base.primary_key);
        if !child.indexes.is_empty() && !base.indexes.is_empty() {
            child.indexes = base
                .indexes
                .iter()
                .cloned()
                .chain(std::mem::take(&mut child.indexes))
                .collect();
        }
        self.add(child).await
    }

    /// Gets a registered schema by name.
    pub fn get_schema(&self, name: &str) -> Result<&SchemaDefinition> {
        self.schemas
            .get(name)
            .map(|entry| &entry.definition)
            .ok_or_else(|| SchemaError::SchemaNotFound(name.to_string()))
    }

    /// Returns the hooks of a registered schema for modification.
    pub fn hooks_mut(&mut self, name: &str) -> Result<&mut SchemaHooks> {
        self.schemas
            .get_mut(name)
            .map(|entry| &mut entry.definition.hooks)
            .ok_or_else(|| SchemaError::SchemaNotFound(name.to_string()))
    }

    /// Iterates over registered schemas in registration order.
    pub fn schemas(&self) -> impl Iterator<Item = &SchemaDefinition> {
        self.schemas.values().map(|entry| &entry.definition)
    }

    /// Subscribes to catalog events.
    pub fn on(&mut self, kind: EventKind, handler: impl Fn(&SchemaEvent<'_>) + Send + Sync + 'static) {
        self.events.on(kind, handler);
    }

    pub(crate) fn fire(&self, event: &SchemaEvent<'_>) {
        self.events.fire(event);
    }

    /// Registers a hook to run at [`Catalog::start`].
    pub fn on_start(&mut self, hook: impl StartHook + 'static) {
        self.start_hooks.push(Arc::new(hook));
    }

    /// Runs every queued hook once, in order, then fires `ready`.
    ///
    /// onCreate and onChange hooks are queued as tables are created and
    /// altered, so they run after the whole catalog has converged.
    pub async fn start(&mut self) -> Result<()> {
        let hooks = std::mem::take(&mut self.start_hooks);
        info!(hooks = hooks.len(), "Running start hooks");
        let catalog: &Self = self;
        for hook in hooks {
            hook.run(catalog).await?;
        }
        catalog.fire(&SchemaEvent::Ready);
        Ok(())
    }

    /// Returns whether a table exists in the store.
    pub async fn exists(&self, table: &str) -> Result<bool> {
        let rows = self
            .executor
            .query(&self.dialect().table_exists_sql(table))
            .await?;
        Ok(!rows.is_empty())
    }

    /// Describes a table as it currently is in the store.
    ///
    /// Returns [`SchemaError::TableAbsent`] if there is no such table.
    pub async fn introspect(&self, table: &str) -> Result<LiveTable> {
        if !self.exists(table).await? {
            return Err(SchemaError::TableAbsent(table.to_string()));
        }
        let dialect = self.dialect();
        let columns = self.executor.query(&dialect.columns_sql(table)).await?;
        let indexes = self.executor.query(&dialect.indexes_sql(table)).await?;
        Ok(dialect.parse_live_table(table, &columns, &indexes))
    }

    /// Creates the table for a registered schema, optionally dropping it first.
    ///
    /// Queues the schema's onCreate hook on success.
    pub async fn create(&mut self, name: &str, drop_first: bool) -> Result<()> {
        let schema = self.get_schema(name)?.clone();
        let dialect = self.dialect();
        let mut statements = Vec::new();
        if drop_first {
            statements.push(dialect.drop_table_sql(&schema.name));
        }
        statements.extend(dialect.create_table_sql(&schema));

        for sql in &statements {
            if let Err(e) = self.executor.exec(sql).await {
                error!(
                    table = %schema.name,
                    sql = %sql,
                    error = %e,
                    chain = %error_chain(&e),
                    "Failed to create table"
                );
                return Err(e);
            }
        }

        info!(table = %schema.name, "Created table");
        if let Some(hook) = &schema.hooks.on_create {
            self.start_hooks.push(Arc::clone(hook));
        }
        Ok(())
    }

    /// Computes the plan that would converge a table, without applying it.
    pub async fn plan(&self, name: &str) -> Result<DiffPlan> {
        let schema = self.get_schema(name)?;
        let live = self.introspect(&schema.name).await?;
        Ok(reconcile::diff(schema, &live))
    }

    /// Reconciles one registered schema's table with the store.
    pub async fn reconcile(&mut self, name: &str) -> Result<SyncOutcome> {
        self.get_schema(name)?;
        Ok(self.sync(name).await)
    }

    /// Reconciles every materialized schema, in registration order.
    ///
    /// A failing table does not stop the sweep.
    pub async fn reconcile_all(&mut self) -> Vec<(String, SyncOutcome)> {
        let names: Vec<String> = self
            .schemas
            .iter()
            .filter(|(_, entry)| entry.materialized)
            .map(|(name, _)| name.clone())
            .collect();
        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            let outcome = self.sync(&name).await;
            outcomes.push((name, outcome));
        }
        outcomes
    }

    async fn sync(&mut self, name: &str) -> SyncOutcome {
        match self.introspect(name).await {
            Ok(live) => self.apply(name, &live).await,
            Err(SchemaError::TableAbsent(_)) => match self.create(name, false).await {
                Ok(()) => SyncOutcome::Created,
                Err(error) => SyncOutcome::Failed { applied: 0, error },
            },
            Err(error) => {
                error!(table = %name, error = %error, chain = %error_chain(&error), "Failed to introspect table");
                SyncOutcome::Failed { applied: 0, error }
            }
        }
    }

    async fn apply(&mut self, name: &str, live: &LiveTable) -> SyncOutcome {
        let Ok(schema) = self.get_schema(name).cloned() else {
            return SyncOutcome::Failed {
                applied: 0,
                error: SchemaError::SchemaNotFound(name.to_string()),
            };
        };
        let plan = reconcile::diff(&schema, live);
        if plan.is_empty() {
            debug!(table = %name, "Table is up to date");
            return SyncOutcome::Unchanged;
        }

        let executor = Arc::clone(&self.executor);
        let dialect = executor.dialect();
        let mut started = false;
        let mut applied = 0;
        for operation in &plan {
            let mut executed = false;
            for sql in dialect.generate_sql(&plan.table, operation) {
                if sql.starts_with("--") {
                    warn!(table = %name, comment = %sql, "Skipping comment (unsupported operation)");
                    continue;
                }
                if !started {
                    started = true;
                    self.fire(&SchemaEvent::BeforeChange { schema: &schema });
                    if let Some(hook) = &schema.hooks.on_change {
                        self.start_hooks.push(Arc::clone(hook));
                    }
                }
                if let Err(error) = executor.exec(&sql).await {
                    error!(
                        table = %name,
                        sql = %sql,
                        error = %error,
                        chain = %error_chain(&error),
                        "Reconciliation aborted for table"
                    );
                    return SyncOutcome::Failed { applied, error };
                }
                executed = true;
            }
            if executed {
                applied += 1;
            }
        }

        if applied > 0 {
            self.fire(&SchemaEvent::AfterChange {
                schema: &schema,
                applied,
            });
        }
        info!(table = %name, planned = plan.len(), applied, "Reconciled table");
        SyncOutcome::Reconciled {
            planned: plan.len(),
            applied,
        }
    }

    /// Creates the version marker table and records the initial version.
    ///
    /// Only the first call touches the store; later calls return the
    /// version observed then.
    pub async fn init(&self) -> Result<&str> {
        self.last_version
            .get_or_try_init(|| async {
                self.executor
                    .exec(&self.dialect().settings_table_sql())
                    .await?;
                if let Some(version) = self.read_version().await? {
                    return Ok(version);
                }
                self.write_version(INITIAL_VERSION).await?;
                info!(version = INITIAL_VERSION, "Generated schema settings");
                Ok::<_, SchemaError>(INITIAL_VERSION.to_string())
            })
            .await
            .map(String::as_str)
    }

    /// Returns the version observed when the catalog was initialized.
    pub async fn last_version(&self) -> Result<String> {
        self.init().await.map(str::to_string)
    }

    /// Reads the current version from the store.
    pub async fn current_version(&self) -> Result<Option<String>> {
        self.init().await?;
        self.read_version().await
    }

    /// Stores a new version.
    pub async fn set_version(&self, version: &str) -> Result<()> {
        self.init().await?;
        self.write_version(version).await
    }

    async fn read_version(&self) -> Result<Option<String>> {
        let dialect = self.dialect();
        let sql = format!(
            "SELECT {value} FROM {table} WHERE {key} = {version}",
            value = dialect.quote_identifier("value"),
            table = dialect.quote_identifier(SETTINGS_TABLE),
            key = dialect.quote_identifier("key"),
            version = dialect.quote(&Value::from("version")),
        );
        let rows = self.executor.query(&sql).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("value"))
            .and_then(Value::as_text)
            .map(|v| v.into_owned())
            .filter(|v| !v.is_empty()))
    }

    async fn write_version(&self, version: &str) -> Result<()> {
        let row = crate::record! { "key" => "version", "value" => version };
        self.executor
            .exec(&self.dialect().upsert_sql(SETTINGS_TABLE, &row))
            .await?;
        Ok(())
    }
}

/// Loads schema declarations from a JSON file holding an array of schemas.
pub fn load_declarations(path: impl AsRef<Path>) -> Result<Vec<SchemaDefinition>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain.join(": ")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_declarations() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"name": "Widgets", "fields": [
                    {{"name": "id", "type": "int", "autoIncrement": true}},
                    {{"name": "name", "type": "varchar", "size": 32}}
                ], "indexes": ["name"]}}
            ]"#
        )
        .unwrap();

        let schemas = load_declarations(file.path()).unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "Widgets");
        assert_eq!(schemas[0].single_primary_key(), Some("id".to_string()));
    }

    #[test]
    fn test_load_declarations_missing_file() {
        assert!(matches!(
            load_declarations("/nonexistent/schemas.json"),
            Err(SchemaError::Io(_))
        ));
    }
}
