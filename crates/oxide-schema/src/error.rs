//! Error types for schema registration, reconciliation and record access.

/// Errors that can occur while working with schemas and their tables.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A schema name could not be resolved in the catalog.
    #[error("No such schema {0}")]
    SchemaNotFound(String),

    /// The table backing a schema does not exist in the store.
    ///
    /// Introspection returns this to signal "create instead of reconcile".
    #[error("Table '{0}' does not exist")]
    TableAbsent(String),

    /// An example produced no predicates where at least one is required.
    #[error("Invalid example provided to remove from '{0}'")]
    InvalidExample(String),

    /// A field name that is not part of the schema.
    #[error("Unknown field '{field}' in schema '{schema}'")]
    UnknownField {
        /// Schema name.
        schema: String,
        /// The offending field name.
        field: String,
    },

    /// A declaration lists the same field twice.
    #[error("Field '{field}' declared more than once in schema '{schema}'")]
    DuplicateField {
        /// Schema name.
        schema: String,
        /// The duplicated field name.
        field: String,
    },

    /// A field declaration is not usable.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Field name.
        field: String,
        /// Why the declaration was rejected.
        reason: String,
    },

    /// Any failure reported by the underlying store.
    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),

    /// IO error (reading declaration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A start hook reported a failure.
    #[error("Start hook failed: {0}")]
    Hook(String),
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
