//! Declarative table schemas with live reconciliation and example-driven CRUD.
//!
//! `oxide-schema` lets an application declare its tables abstractly (fields,
//! types, sizes, primary key, indexes, lifecycle hooks) and then:
//! - converges the live table to the declaration with generated DDL
//! - reads and writes records through examples, objects whose present
//!   fields become WHERE predicates
//!
//! # Architecture
//!
//! - **Catalog** - Registers schemas, creates or reconciles their tables,
//!   queues start hooks and owns the version marker
//! - **Reconcile** - Diffs a declaration against a live table into an
//!   ordered plan of column, key and index operations
//! - **Where clause** - Turns an example into predicates
//! - **Store** - `find`, `find_one`, `count`, `list`, `put_one`, `remove`
//! - **Executor** - Pooled query/exec primitives over sqlx
//! - **Dialect** - MySQL and SQLite statement text and introspection
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use oxide_schema::prelude::*;
//! use oxide_schema::record;
//!
//! # async fn run() -> oxide_schema::Result<()> {
//! let executor = SqlxExecutor::connect(&StoreConfig::new("mysql://localhost/app")).await?;
//! let mut catalog = Catalog::new(Arc::new(executor));
//!
//! catalog
//!     .add(
//!         SchemaDefinition::new("Widgets")
//!             .field(FieldDescriptor::new("id", SqlType::Int).auto_increment())
//!             .field(FieldDescriptor::varchar("name", 32).default(""))
//!             .field(FieldDescriptor::new("qty", SqlType::Int).default(0))
//!             .primary_key("id"),
//!     )
//!     .await?;
//! catalog.start().await?;
//!
//! let bolt = catalog.put_one("Widgets", &record! { "name" => "bolt" }).await?;
//! let found = catalog.find("Widgets", &record! { "name" => "b%" }).await?;
//! catalog.remove("Widgets", &record! { "id" => bolt["id"].clone() }).await?;
//! # let _ = found;
//! # Ok(())
//! # }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Create or reconcile every table declared in a file
//! oxide-schema sync schemas.json
//!
//! # Show the statements without running them
//! oxide-schema sync schemas.json --dry-run
//!
//! # Describe a live table
//! oxide-schema inspect Widgets
//! ```

pub mod dialect;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod plan;
pub mod reconcile;
pub mod registry;
pub mod schema;
pub mod store;
pub mod value;
pub mod where_clause;

pub use error::{Result, SchemaError};
pub use hooks::{BoxFuture, StartHook};
pub use registry::Catalog;
pub use schema::{FieldDescriptor, SchemaDefinition, SqlType};
pub use value::{Record, Value};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{Dialect, MySqlDialect, SqliteDialect};
    pub use crate::error::{Result, SchemaError};
    pub use crate::executor::{ExecOutcome, PoolRegistry, SqlExecutor, SqlxExecutor, StoreConfig};
    pub use crate::hooks::{BoxFuture, EventKind, OnLoad, OnPut, SchemaEvent, StartHook};
    pub use crate::plan::{DiffOperation, DiffPlan};
    pub use crate::reconcile::{diff, SyncOutcome};
    pub use crate::registry::{load_declarations, Catalog};
    pub use crate::schema::{
        ColumnList, DefaultValue, FieldDescriptor, FieldFlags, LiveIndex, LiveTable,
        SchemaDefinition, SqlType,
    };
    pub use crate::store::{ListParams, Page, SortDirection};
    pub use crate::value::{quote, EscapeStyle, Record, Value};
}
