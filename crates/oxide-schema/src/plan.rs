//! Diff plans.
//!
//! A [`DiffPlan`] is the ordered list of operations that converges one live
//! table to its declaration. Plans are computed by
//! [`reconcile::diff`](crate::reconcile::diff), applied once and discarded.

use serde::Serialize;

use crate::dialect::Dialect;
use crate::schema::{ColumnList, FieldDescriptor};

/// A single schema change against an existing table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DiffOperation {
    /// Add a column and backfill existing rows with its default.
    AddField {
        /// The declared field.
        field: FieldDescriptor,
        /// Add the primary key on this column in the same statement.
        primary_key: bool,
    },
    /// Drop a column.
    DropField {
        /// Live column name.
        name: String,
    },
    /// Rename and/or retype a column in one statement.
    RenameOrRetypeField {
        /// Live column.
        from: FieldDescriptor,
        /// Declared field.
        to: FieldDescriptor,
    },
    /// Drop the primary key.
    DropPrimaryKey,
    /// Add a primary key.
    AddPrimaryKey {
        /// Key columns.
        columns: ColumnList,
    },
    /// Drop an index by the name it has in the store.
    DropIndex {
        /// Index name as introspected.
        name: String,
        /// Indexed columns, after any renames in the same plan.
        columns: ColumnList,
    },
    /// Add an index named after its columns.
    AddIndex {
        /// Indexed columns.
        columns: ColumnList,
    },
}

impl DiffOperation {
    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::AddField { field, .. } => format!("Add field '{}'", field.name),
            Self::DropField { name } => format!("Drop field '{name}'"),
            Self::RenameOrRetypeField { from, to } if from.name == to.name => {
                format!("Retype field '{}' as {}", to.name, to.sql_type)
            }
            Self::RenameOrRetypeField { from, to } => {
                format!("Rename field '{}' to '{}'", from.name, to.name)
            }
            Self::DropPrimaryKey => "Drop primary key".to_string(),
            Self::AddPrimaryKey { columns } => format!("Add primary key ({columns})"),
            Self::DropIndex { name, columns } => format!("Drop index {name} ({columns})"),
            Self::AddIndex { columns } => format!("Add index ({columns})"),
        }
    }

    /// Returns whether this operation touches a column definition.
    #[must_use]
    pub fn is_field_operation(&self) -> bool {
        matches!(
            self,
            Self::AddField { .. } | Self::DropField { .. } | Self::RenameOrRetypeField { .. }
        )
    }
}

/// Ordered operations converging one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffPlan {
    /// Table name.
    pub table: String,
    /// Operations, in the order they must be applied.
    pub operations: Vec<DiffOperation>,
}

impl DiffPlan {
    /// Creates an empty plan for a table.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            operations: Vec::new(),
        }
    }

    /// Appends an operation.
    pub fn push(&mut self, operation: DiffOperation) {
        self.operations.push(operation);
    }

    /// Returns true if the table already matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Iterates over the operations in order.
    pub fn iter(&self) -> impl Iterator<Item = &DiffOperation> {
        self.operations.iter()
    }

    /// Renders every statement of the plan, in order.
    #[must_use]
    pub fn sql(&self, dialect: &dyn Dialect) -> Vec<String> {
        self.operations
            .iter()
            .flat_map(|op| dialect.generate_sql(&self.table, op))
            .collect()
    }
}

impl<'a> IntoIterator for &'a DiffPlan {
    type Item = &'a DiffOperation;
    type IntoIter = std::slice::Iter<'a, DiffOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}
