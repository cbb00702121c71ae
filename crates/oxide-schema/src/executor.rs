//! SQL executor.
//!
//! The catalog and record store talk to the database only through the
//! [`SqlExecutor`] trait: run a query and get decoded [`Record`]s back, or
//! run a statement and get its affected row count and generated id. Each call
//! borrows one pooled connection for exactly one statement.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Column, ColumnIndex, Decode, Row, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::dialect::{Dialect, MySqlDialect, SqliteDialect};
use crate::error::Result;
use crate::hooks::BoxFuture;
use crate::value::{Record, Value};

/// Pooled connections expire after this long.
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(15 * 60 * 60);

/// Default pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Result of a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows affected.
    pub rows_affected: u64,
    /// Identifier generated by this statement, if any.
    pub last_insert_id: Option<i64>,
}

/// Query and statement primitives the engine is built on.
pub trait SqlExecutor: Send + Sync {
    /// Dialect used to render statements for this store.
    fn dialect(&self) -> &dyn Dialect;

    /// Runs a query and returns its rows.
    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<Record>>>;

    /// Runs a statement.
    fn exec<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<ExecOutcome>>;
}

/// Connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Connection URL (`mysql://...` or `sqlite:...`).
    pub url: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Connections older than this are closed and reopened.
    pub max_lifetime: Duration,
    /// Probe each connection before handing it out.
    pub test_before_acquire: bool,
}

impl StoreConfig {
    /// Creates a config with default pool settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            test_before_acquire: true,
        }
    }

    /// Sets the pool size.
    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Returns true if the URL names a MySQL (or MariaDB) server.
    #[must_use]
    pub fn is_mysql(&self) -> bool {
        self.url.starts_with("mysql:") || self.url.starts_with("mariadb:")
    }
}

/// [`SqlExecutor`] over an sqlx pool.
#[derive(Debug, Clone)]
pub enum SqlxExecutor {
    /// MySQL pool.
    MySql {
        /// Connection pool.
        pool: MySqlPool,
        /// Dialect.
        dialect: MySqlDialect,
    },
    /// SQLite pool.
    Sqlite {
        /// Connection pool.
        pool: SqlitePool,
        /// Dialect.
        dialect: SqliteDialect,
    },
}

impl SqlxExecutor {
    /// Opens a pool for the configured URL.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        debug!(url = %config.url, max_connections = config.max_connections, "Opening pool");
        if config.is_mysql() {
            let pool = MySqlPoolOptions::new()
                .max_connections(config.max_connections)
                .max_lifetime(config.max_lifetime)
                .test_before_acquire(config.test_before_acquire)
                .connect(&config.url)
                .await?;
            Ok(Self::mysql(pool))
        } else {
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .max_lifetime(config.max_lifetime)
                .test_before_acquire(config.test_before_acquire)
                .connect(&config.url)
                .await?;
            Ok(Self::sqlite(pool))
        }
    }

    /// Wraps an existing MySQL pool.
    #[must_use]
    pub fn mysql(pool: MySqlPool) -> Self {
        Self::MySql {
            pool,
            dialect: MySqlDialect::new(),
        }
    }

    /// Wraps an existing SQLite pool.
    #[must_use]
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self::Sqlite {
            pool,
            dialect: SqliteDialect::new(),
        }
    }
}

impl SqlExecutor for SqlxExecutor {
    fn dialect(&self) -> &dyn Dialect {
        match self {
            Self::MySql { dialect, .. } => dialect,
            Self::Sqlite { dialect, .. } => dialect,
        }
    }

    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<Record>>> {
        Box::pin(async move {
            debug!(sql = %sql, "Executing query");
            let records = match self {
                Self::MySql { pool, .. } => sqlx::raw_sql(sql)
                    .fetch_all(pool)
                    .await?
                    .iter()
                    .map(decode_row)
                    .collect(),
                Self::Sqlite { pool, .. } => sqlx::raw_sql(sql)
                    .fetch_all(pool)
                    .await?
                    .iter()
                    .map(decode_row)
                    .collect(),
            };
            Ok(records)
        })
    }

    fn exec<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<ExecOutcome>> {
        Box::pin(async move {
            debug!(sql = %sql, "Executing SQL");
            let outcome = match self {
                Self::MySql { pool, .. } => {
                    let result = sqlx::raw_sql(sql).execute(pool).await?;
                    ExecOutcome {
                        rows_affected: result.rows_affected(),
                        last_insert_id: i64::try_from(result.last_insert_id())
                            .ok()
                            .filter(|id| *id != 0),
                    }
                }
                Self::Sqlite { pool, .. } => {
                    let result = sqlx::raw_sql(sql).execute(pool).await?;
                    ExecOutcome {
                        rows_affected: result.rows_affected(),
                        last_insert_id: Some(result.last_insert_rowid()).filter(|id| *id != 0),
                    }
                }
            };
            Ok(outcome)
        })
    }
}

/// Pools keyed by connection URL.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    executors: Mutex<HashMap<String, Arc<SqlxExecutor>>>,
}

impl PoolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the executor for the config's URL, opening its pool on first use.
    pub async fn get(&self, config: &StoreConfig) -> Result<Arc<SqlxExecutor>> {
        let mut executors = self.executors.lock().await;
        if let Some(executor) = executors.get(&config.url) {
            return Ok(Arc::clone(executor));
        }
        let executor = Arc::new(SqlxExecutor::connect(config).await?);
        executors.insert(config.url.clone(), Arc::clone(&executor));
        Ok(executor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Null,
    Bool,
    Integer,
    Float,
    Decimal,
    Binary,
    Text,
    Date,
    Time,
    DateTime,
    Unknown,
}

fn classify(type_name: &str) -> ColumnKind {
    let upper = type_name.to_ascii_uppercase();
    let base = upper.split([' ', '(']).next().unwrap_or_default();
    match base {
        "NULL" => ColumnKind::Null,
        "BOOLEAN" | "BOOL" | "BIT" => ColumnKind::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "INT2" | "INT4"
        | "INT8" | "YEAR" => ColumnKind::Integer,
        "FLOAT" | "DOUBLE" | "REAL" => ColumnKind::Float,
        "DECIMAL" | "NUMERIC" => ColumnKind::Decimal,
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            ColumnKind::Binary
        }
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET"
        | "JSON" => ColumnKind::Text,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
        _ => ColumnKind::Unknown,
    }
}

/// Decodes a row into a record keyed by column label.
///
/// Dates and times become integers: seconds since the Unix epoch for dates
/// and timestamps, seconds since midnight for times.
fn decode_row<'r, R>(row: &'r R) -> Record
where
    R: Row,
    usize: ColumnIndex<R>,
    bool: Decode<'r, R::Database>,
    i64: Decode<'r, R::Database>,
    f64: Decode<'r, R::Database>,
    String: Decode<'r, R::Database>,
    Vec<u8>: Decode<'r, R::Database>,
    NaiveDate: Decode<'r, R::Database>,
    NaiveTime: Decode<'r, R::Database>,
    NaiveDateTime: Decode<'r, R::Database>,
{
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| (column.name().to_string(), decode_column(row, i)))
        .collect()
}

fn decode_column<'r, R>(row: &'r R, i: usize) -> Value
where
    R: Row,
    usize: ColumnIndex<R>,
    bool: Decode<'r, R::Database>,
    i64: Decode<'r, R::Database>,
    f64: Decode<'r, R::Database>,
    String: Decode<'r, R::Database>,
    Vec<u8>: Decode<'r, R::Database>,
    NaiveDate: Decode<'r, R::Database>,
    NaiveTime: Decode<'r, R::Database>,
    NaiveDateTime: Decode<'r, R::Database>,
{
    let kind = match row.try_get_raw(i) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => {
            let type_name = raw.type_info().name().to_string();
            let kind = classify(&type_name);
            if kind == ColumnKind::Unknown {
                warn!(column = i, type_name = %type_name, "Unrecognized column type, decoding as text");
            }
            kind
        }
        Err(_) => return Value::Null,
    };

    let decoded = match kind {
        ColumnKind::Null => Some(Value::Null),
        ColumnKind::Bool => row
            .try_get_unchecked::<bool, _>(i)
            .map(Value::Bool)
            .or_else(|_| row.try_get_unchecked::<i64, _>(i).map(|v| Value::Bool(v != 0)))
            .ok(),
        ColumnKind::Integer => row.try_get_unchecked::<i64, _>(i).map(Value::Int).ok(),
        ColumnKind::Float => row.try_get_unchecked::<f64, _>(i).map(Value::Float).ok(),
        ColumnKind::Decimal => row
            .try_get_unchecked::<String, _>(i)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .or_else(|| row.try_get_unchecked::<f64, _>(i).ok())
            .map(Value::Float),
        ColumnKind::Binary => row.try_get_unchecked::<Vec<u8>, _>(i).map(Value::Bytes).ok(),
        ColumnKind::Date => row
            .try_get_unchecked::<NaiveDate, _>(i)
            .ok()
            .map(|d| Value::Int(d.and_time(NaiveTime::MIN).and_utc().timestamp())),
        ColumnKind::Time => row
            .try_get_unchecked::<NaiveTime, _>(i)
            .ok()
            .map(|t| Value::Int(i64::from(t.num_seconds_from_midnight()))),
        ColumnKind::DateTime => row
            .try_get_unchecked::<NaiveDateTime, _>(i)
            .ok()
            .map(|dt| Value::Int(dt.and_utc().timestamp())),
        ColumnKind::Text | ColumnKind::Unknown => None,
    };

    decoded
        .or_else(|| row.try_get_unchecked::<String, _>(i).map(Value::Text).ok())
        .or_else(|| row.try_get_unchecked::<Vec<u8>, _>(i).map(Value::Bytes).ok())
        .unwrap_or(Value::Null)
}
