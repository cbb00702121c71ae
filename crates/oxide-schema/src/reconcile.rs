//! Reconciliation of a declared schema against a live table.
//!
//! [`diff`] compares a [`SchemaDefinition`] with a fresh [`LiveTable`] and
//! returns the ordered [`DiffPlan`] that converges the table:
//!
//! 1. same-name pass: columns present on both sides are retyped when their
//!    types differ
//! 2. rename pass: each remaining declared field takes the first remaining
//!    live column of an equal type, in the store's column order
//! 3. drop pass: live columns left over are dropped
//! 4. add pass: declared fields left over are added and backfilled
//! 5. primary key, then indexes
//!
//! Applying the plan is done by [`Catalog`](crate::Catalog), one statement at
//! a time with no enclosing transaction.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};

use crate::error::SchemaError;
use crate::plan::{DiffOperation, DiffPlan};
use crate::schema::{ColumnList, FieldDescriptor, LiveTable, SchemaDefinition};

/// Result of registering or reconciling one table.
#[derive(Debug)]
pub enum SyncOutcome {
    /// The table did not exist and was created.
    Created,
    /// The table already matched its declaration.
    Unchanged,
    /// The table was altered.
    Reconciled {
        /// Operations in the plan.
        planned: usize,
        /// Operations applied.
        applied: usize,
    },
    /// A statement failed; the remaining operations for this table were skipped.
    Failed {
        /// Operations applied before the failure.
        applied: usize,
        /// The failure.
        error: SchemaError,
    },
}

impl SyncOutcome {
    /// Returns true if the table could not be converged.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the number of operations applied.
    #[must_use]
    pub fn applied(&self) -> usize {
        match self {
            Self::Reconciled { applied, .. } | Self::Failed { applied, .. } => *applied,
            Self::Created | Self::Unchanged => 0,
        }
    }
}

/// Computes the operations converging `live` to `schema`.
#[must_use]
pub fn diff(schema: &SchemaDefinition, live: &LiveTable) -> DiffPlan {
    let mut plan = DiffPlan::new(&schema.name);

    let mut src: IndexMap<&str, &FieldDescriptor> = schema
        .stored_fields()
        .map(|f| (f.name.as_str(), f))
        .collect();
    let mut dst: IndexMap<&str, &FieldDescriptor> = live
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f))
        .collect();

    // Live column name -> declared name, for key and index translation.
    let mut renamed: HashMap<&str, &str> = HashMap::new();
    let mut dropped: HashSet<&str> = HashSet::new();

    let common: Vec<&str> = src
        .keys()
        .copied()
        .filter(|name| dst.contains_key(name))
        .collect();
    for name in common {
        if let (Some(to), Some(from)) = (src.shift_remove(name), dst.shift_remove(name)) {
            if !to.type_eq(from) {
                plan.push(DiffOperation::RenameOrRetypeField {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }
    }

    let unmatched: Vec<&FieldDescriptor> = src.values().copied().collect();
    for to in unmatched {
        let candidate = dst
            .iter()
            .find(|(_, from)| to.type_eq(from))
            .map(|(name, from)| (*name, *from));
        if let Some((name, from)) = candidate {
            plan.push(DiffOperation::RenameOrRetypeField {
                from: from.clone(),
                to: to.clone(),
            });
            renamed.insert(name, to.name.as_str());
            dst.shift_remove(name);
            src.shift_remove(to.name.as_str());
        }
    }

    for name in dst.keys() {
        plan.push(DiffOperation::DropField {
            name: (*name).to_string(),
        });
        dropped.insert(*name);
    }

    let translate = |columns: &ColumnList| -> Option<ColumnList> {
        let kept: Vec<String> = columns
            .columns()
            .iter()
            .filter(|c| !dropped.contains(c.as_str()))
            .map(|c| renamed.get(c.as_str()).map_or_else(|| c.clone(), |n| (*n).to_string()))
            .collect();
        (!kept.is_empty()).then(|| ColumnList::new(kept))
    };

    let declared_pk = schema.effective_primary_key();
    let mut live_pk = live.primary_key.as_ref().and_then(&translate);

    for field in src.values() {
        let inline_key = field.auto_increment
            && live_pk.is_none()
            && declared_pk.as_ref().and_then(ColumnList::single) == Some(field.name.as_str());
        plan.push(DiffOperation::AddField {
            field: (*field).clone(),
            primary_key: inline_key,
        });
        if inline_key {
            live_pk = Some(ColumnList::new(vec![field.name.clone()]));
        }
    }

    match (declared_pk, live_pk) {
        (None, Some(_)) => plan.push(DiffOperation::DropPrimaryKey),
        (Some(columns), None) => plan.push(DiffOperation::AddPrimaryKey { columns }),
        (Some(columns), Some(current)) if columns != current => {
            plan.push(DiffOperation::DropPrimaryKey);
            plan.push(DiffOperation::AddPrimaryKey { columns });
        }
        _ => {}
    }

    // Keyed by columns after renames. Renaming a column keeps the index and
    // its name, so a later drop must use the introspected name.
    let mut live_indexes: IndexMap<ColumnList, &str> = IndexMap::new();
    let mut duplicates = Vec::new();
    for index in &live.indexes {
        let Some(current) = translate(&index.columns) else {
            continue;
        };
        if live_indexes.contains_key(&current) {
            duplicates.push((current, index.name.as_str()));
        } else {
            live_indexes.insert(current, index.name.as_str());
        }
    }
    let declared: IndexSet<&ColumnList> = schema.indexes.iter().collect();

    let stale = live_indexes
        .iter()
        .filter(|(current, _)| !declared.contains(*current))
        .map(|(current, name)| (current.clone(), *name));
    for (columns, name) in stale.chain(duplicates) {
        plan.push(DiffOperation::DropIndex {
            name: name.to_string(),
            columns,
        });
    }
    for index in declared {
        if !live_indexes.contains_key(index) {
            plan.push(DiffOperation::AddIndex {
                columns: index.clone(),
            });
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LiveIndex, SqlType};

    fn live(fields: Vec<FieldDescriptor>) -> LiveTable {
        LiveTable {
            name: "Widgets".to_string(),
            fields,
            primary_key: None,
            indexes: Vec::new(),
        }
    }

    fn id() -> FieldDescriptor {
        FieldDescriptor::new("id", SqlType::Int).auto_increment()
    }

    #[test]
    fn test_matching_table_yields_empty_plan() {
        let schema = SchemaDefinition::new("Widgets")
            .field(id())
            .field(FieldDescriptor::varchar("name", 32))
            .index("name");
        let mut table = live(vec![id(), FieldDescriptor::varchar("name", 32)]);
        table.primary_key = Some(ColumnList::parse("id"));
        table.indexes = vec![LiveIndex::new("name", "name")];

        assert!(diff(&schema, &table).is_empty());
    }

    #[test]
    fn test_retype_same_name() {
        let schema = SchemaDefinition::new("Widgets").field(FieldDescriptor::varchar("name", 64));
        let plan = diff(&schema, &live(vec![FieldDescriptor::varchar("name", 32)]));

        assert_eq!(
            plan.operations,
            vec![DiffOperation::RenameOrRetypeField {
                from: FieldDescriptor::varchar("name", 32),
                to: FieldDescriptor::varchar("name", 64),
            }]
        );
    }

    #[test]
    fn test_pure_rename() {
        let schema = SchemaDefinition::new("Widgets")
            .field(FieldDescriptor::new("qty", SqlType::Int))
            .field(FieldDescriptor::varchar("label", 32));
        let plan = diff(
            &schema,
            &live(vec![
                FieldDescriptor::new("qty", SqlType::Int),
                FieldDescriptor::varchar("title", 32),
            ]),
        );

        assert_eq!(plan.len(), 1);
        assert!(matches!(
            &plan.operations[0],
            DiffOperation::RenameOrRetypeField { from, to } if from.name == "title" && to.name == "label"
        ));
    }

    #[test]
    fn test_ambiguous_rename_takes_first_live_column() {
        let schema = SchemaDefinition::new("Widgets").field(FieldDescriptor::varchar("label", 32));
        let plan = diff(
            &schema,
            &live(vec![
                FieldDescriptor::varchar("b", 32),
                FieldDescriptor::varchar("a", 32),
            ]),
        );

        assert_eq!(
            plan.operations,
            vec![
                DiffOperation::RenameOrRetypeField {
                    from: FieldDescriptor::varchar("b", 32),
                    to: FieldDescriptor::varchar("label", 32),
                },
                DiffOperation::DropField {
                    name: "a".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_drop_then_add_in_order() {
        let schema = SchemaDefinition::new("Widgets")
            .field(FieldDescriptor::new("qty", SqlType::Int))
            .field(FieldDescriptor::new("notes", SqlType::Text))
            .field(FieldDescriptor::new("scratch", SqlType::Text).client_only());
        let plan = diff(&schema, &live(vec![FieldDescriptor::new("blob", SqlType::Blob)]));

        let descriptions: Vec<String> = plan.iter().map(DiffOperation::description).collect();
        assert_eq!(
            descriptions,
            vec!["Drop field 'blob'", "Add field 'qty'", "Add field 'notes'"]
        );
    }

    #[test]
    fn test_added_auto_increment_key_is_inline() {
        let schema = SchemaDefinition::new("Widgets")
            .field(id())
            .field(FieldDescriptor::varchar("name", 32));
        let plan = diff(&schema, &live(vec![FieldDescriptor::varchar("name", 32)]));

        assert_eq!(
            plan.operations,
            vec![DiffOperation::AddField {
                field: id(),
                primary_key: true,
            }]
        );
    }

    #[test]
    fn test_primary_key_outcomes() {
        let fields = vec![
            FieldDescriptor::new("a", SqlType::Int),
            FieldDescriptor::new("b", SqlType::Int),
        ];
        let mut schema = SchemaDefinition::new("Widgets");
        schema.fields = fields.clone();

        // drop only
        let mut table = live(fields.clone());
        table.primary_key = Some(ColumnList::parse("a"));
        assert_eq!(diff(&schema, &table).operations, vec![DiffOperation::DropPrimaryKey]);

        // add only
        let declared = schema.clone().primary_key("a,b");
        assert_eq!(
            diff(&declared, &live(fields.clone())).operations,
            vec![DiffOperation::AddPrimaryKey {
                columns: ColumnList::parse("a,b")
            }]
        );

        // replace, as two statements
        assert_eq!(
            diff(&declared, &table).operations,
            vec![
                DiffOperation::DropPrimaryKey,
                DiffOperation::AddPrimaryKey {
                    columns: ColumnList::parse("a,b")
                },
            ]
        );

        // neither
        assert!(diff(&schema, &live(fields)).is_empty());
    }

    #[test]
    fn test_renamed_key_column_is_not_rekeyed() {
        let schema = SchemaDefinition::new("Widgets")
            .field(FieldDescriptor::varchar("code", 16))
            .primary_key("code");
        let mut table = live(vec![FieldDescriptor::varchar("sku", 16)]);
        table.primary_key = Some(ColumnList::parse("sku"));

        let plan = diff(&schema, &table);
        assert_eq!(plan.len(), 1);
        assert!(plan.operations[0].is_field_operation());
    }

    #[test]
    fn test_indexes_dropped_then_added() {
        let schema = SchemaDefinition::new("Widgets")
            .field(FieldDescriptor::varchar("a", 8))
            .field(FieldDescriptor::new("b", SqlType::Int))
            .index("a")
            .index("a,b");
        let mut table = live(vec![
            FieldDescriptor::varchar("a", 8),
            FieldDescriptor::new("b", SqlType::Int),
        ]);
        table.indexes = vec![LiveIndex::new("b", "b"), LiveIndex::new("a", "a")];

        assert_eq!(
            diff(&schema, &table).operations,
            vec![
                DiffOperation::DropIndex {
                    name: "b".to_string(),
                    columns: ColumnList::parse("b")
                },
                DiffOperation::AddIndex {
                    columns: ColumnList::parse("a,b")
                },
            ]
        );
    }

    #[test]
    fn test_index_on_renamed_column_keeps_its_name() {
        // The store already renamed the column; the index still has its old name.
        let mut table = live(vec![FieldDescriptor::varchar("label", 32)]);
        table.indexes = vec![LiveIndex::new("Widgets_name", "label")];

        let kept = SchemaDefinition::new("Widgets")
            .field(FieldDescriptor::varchar("label", 32))
            .index("label");
        assert!(diff(&kept, &table).is_empty());

        let removed = SchemaDefinition::new("Widgets").field(FieldDescriptor::varchar("label", 32));
        assert_eq!(
            diff(&removed, &table).operations,
            vec![DiffOperation::DropIndex {
                name: "Widgets_name".to_string(),
                columns: ColumnList::parse("label"),
            }]
        );
    }

    #[test]
    fn test_index_follows_rename_in_same_plan() {
        let schema = SchemaDefinition::new("Widgets").field(FieldDescriptor::varchar("label", 32));
        let mut table = live(vec![FieldDescriptor::varchar("name", 32)]);
        table.indexes = vec![LiveIndex::new("Widgets_name", "name")];

        assert_eq!(
            diff(&schema, &table).operations,
            vec![
                DiffOperation::RenameOrRetypeField {
                    from: FieldDescriptor::varchar("name", 32),
                    to: FieldDescriptor::varchar("label", 32),
                },
                DiffOperation::DropIndex {
                    name: "Widgets_name".to_string(),
                    columns: ColumnList::parse("label"),
                },
            ]
        );
    }
}
