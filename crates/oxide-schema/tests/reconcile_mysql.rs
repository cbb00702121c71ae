//! Reconciliation against a MySQL store, observed through the statements
//! a recording executor receives.

mod common;

use common::*;
use oxide_schema::prelude::*;
use oxide_schema::record;

fn widgets_live(executor: &MockExecutor) {
    executor.table(
        "Widgets",
        vec![
            describe("id", "int(11)", "auto_increment"),
            describe("title", "varchar(32)", ""),
        ],
        vec![index("PRIMARY", "id")],
    );
}

// =============================================================================
// Create vs reconcile
// =============================================================================

#[tokio::test]
async fn test_absent_table_is_created() {
    let executor = MockExecutor::new();
    let mut catalog = mysql_catalog(&executor);
    let hook = CountingHook::default();

    let outcome = catalog
        .add(widgets().index("name").on_create(hook.clone()))
        .await
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::Created));
    assert_eq!(
        executor.statements(),
        vec![
            "CREATE TABLE `Widgets` (\n  `id` int AUTO_INCREMENT,\n  `name` varchar(32),\n  `qty` int,\n  INDEX `name` (`name`),\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB"
        ]
    );

    // onCreate waits for start.
    assert_eq!(hook.runs(), 0);
    catalog.start().await.unwrap();
    assert_eq!(hook.runs(), 1);
}

#[tokio::test]
async fn test_existing_table_is_reconciled_in_order() {
    let executor = MockExecutor::new();
    widgets_live(&executor);
    let mut catalog = mysql_catalog(&executor);
    let events = record_events(&mut catalog);

    let outcome = catalog.add(widgets().index("name")).await.unwrap();

    assert!(matches!(
        outcome,
        SyncOutcome::Reconciled {
            planned: 3,
            applied: 3
        }
    ));
    assert_eq!(
        executor.statements(),
        vec![
            "ALTER TABLE `Widgets` CHANGE `title` `name` varchar(32)",
            "ALTER TABLE `Widgets` ADD `qty` int",
            "UPDATE `Widgets` SET `qty` = '0'",
            "ALTER TABLE `Widgets` ADD INDEX `name` (`name`)",
        ]
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec!["beforeChange Widgets", "afterChange Widgets 3"]
    );
}

#[tokio::test]
async fn test_matching_table_is_unchanged() {
    let executor = MockExecutor::new();
    executor.table(
        "Widgets",
        vec![
            describe("id", "int(11)", "auto_increment"),
            describe("name", "varchar(32)", ""),
            describe("qty", "int(11)", ""),
        ],
        vec![index("PRIMARY", "id")],
    );
    let mut catalog = mysql_catalog(&executor);
    let events = record_events(&mut catalog);
    let hook = CountingHook::default();

    let outcome = catalog.add(widgets().on_change(hook.clone())).await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Unchanged));
    assert!(executor.statements().is_empty());
    assert!(events.lock().unwrap().is_empty());

    catalog.start().await.unwrap();
    assert_eq!(hook.runs(), 0);
}

#[tokio::test]
async fn test_retype_primary_key_replacement_and_index_drop() {
    let executor = MockExecutor::new();
    executor.table(
        "Orders",
        vec![
            describe("orderId", "int(11)", ""),
            describe("lineNo", "int(11)", ""),
            describe("note", "varchar(32)", ""),
        ],
        vec![
            index("PRIMARY", "orderId"),
            index("note_lineNo", "note"),
            index("note_lineNo", "lineNo"),
        ],
    );
    let mut catalog = mysql_catalog(&executor);

    let orders = SchemaDefinition::new("Orders")
        .field(FieldDescriptor::new("orderId", SqlType::Int))
        .field(FieldDescriptor::new("lineNo", SqlType::Int))
        .field(FieldDescriptor::new("note", SqlType::Text))
        .primary_key("orderId,lineNo");
    catalog.add(orders).await.unwrap();

    assert_eq!(
        executor.statements(),
        vec![
            "ALTER TABLE `Orders` CHANGE `note` `note` text",
            "ALTER TABLE `Orders` DROP PRIMARY KEY",
            "ALTER TABLE `Orders` ADD PRIMARY KEY (`orderId`, `lineNo`)",
            "ALTER TABLE `Orders` DROP INDEX `note_lineNo`",
        ]
    );
}

#[tokio::test]
async fn test_index_on_renamed_column_dropped_by_key_name() {
    let executor = MockExecutor::new();
    // `name` was renamed to `title` by an earlier pass; its index kept the key name.
    executor.table(
        "Widgets",
        vec![
            describe("id", "int(11)", "auto_increment"),
            describe("title", "varchar(32)", ""),
        ],
        vec![index("PRIMARY", "id"), index("name", "title")],
    );
    let mut catalog = mysql_catalog(&executor);

    let schema = SchemaDefinition::new("Widgets")
        .field(FieldDescriptor::new("id", SqlType::Int).auto_increment())
        .field(FieldDescriptor::varchar("title", 32))
        .primary_key("id");
    let outcome = catalog.add(schema).await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Reconciled { applied: 1, .. }));
    assert_eq!(
        executor.statements(),
        vec!["ALTER TABLE `Widgets` DROP INDEX `name`"]
    );
}

// =============================================================================
// Failure semantics
// =============================================================================

#[tokio::test]
async fn test_failure_aborts_table_but_not_sweep() {
    let executor = MockExecutor::new();
    widgets_live(&executor);
    executor.table(
        "Gadgets",
        vec![describe("code", "varchar(8)", "")],
        Vec::new(),
    );
    executor.fail_on("ADD `qty`");
    let mut catalog = mysql_catalog(&executor);
    let events = record_events(&mut catalog);
    let widgets_hook = CountingHook::default();
    let gadgets_hook = CountingHook::default();

    let first = catalog
        .add(widgets().index("name").on_change(widgets_hook.clone()))
        .await
        .unwrap();
    let second = catalog
        .add(
            SchemaDefinition::new("Gadgets")
                .field(FieldDescriptor::varchar("code", 8))
                .field(FieldDescriptor::new("weight", SqlType::Double))
                .on_change(gadgets_hook.clone()),
        )
        .await
        .unwrap();

    match first {
        SyncOutcome::Failed { applied, error } => {
            assert_eq!(applied, 1);
            assert!(matches!(error, SchemaError::Store(_)));
        }
        other => panic!("Expected failure, got {other:?}"),
    }
    assert!(matches!(second, SyncOutcome::Reconciled { applied: 1, .. }));

    let statements = executor.statements();
    // The index on Widgets was never attempted.
    assert!(!statements.iter().any(|s| s.contains("ADD INDEX")));
    assert!(statements.contains(&"ALTER TABLE `Gadgets` ADD `weight` double".to_string()));

    // A failed table gets no afterChange.
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "beforeChange Widgets",
            "beforeChange Gadgets",
            "afterChange Gadgets 1",
        ]
    );

    // onChange hooks run once, after the whole sweep.
    assert_eq!(widgets_hook.runs() + gadgets_hook.runs(), 0);
    catalog.start().await.unwrap();
    assert_eq!(widgets_hook.runs(), 1);
    assert_eq!(gadgets_hook.runs(), 1);
    assert_eq!(events.lock().unwrap().last().map(String::as_str), Some("ready"));
}

#[tokio::test]
async fn test_failed_create_is_reported() {
    let executor = MockExecutor::new();
    executor.fail_on("CREATE TABLE");
    let mut catalog = mysql_catalog(&executor);

    let outcome = catalog.add(widgets()).await.unwrap();
    assert!(outcome.is_failed());
}

// =============================================================================
// Registry
// =============================================================================

#[tokio::test]
async fn test_extend_puts_base_fields_first() {
    let executor = MockExecutor::new();
    let mut catalog = mysql_catalog(&executor);

    catalog
        .define(
            SchemaDefinition::new("Audited")
                .field(FieldDescriptor::new("id", SqlType::Int).auto_increment())
                .field(FieldDescriptor::new("created", SqlType::Int))
                .primary_key("id")
                .index("created"),
        )
        .unwrap();
    assert!(executor.log().is_empty());

    catalog
        .extend(
            "Audited",
            SchemaDefinition::new("Notes")
                .field(FieldDescriptor::new("body", SqlType::Text))
                .index("body"),
        )
        .await
        .unwrap();

    let notes = catalog.get_schema("Notes").unwrap();
    let names: Vec<&str> = notes.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "created", "body"]);
    assert_eq!(notes.primary_key, Some(ColumnList::parse("id")));
    assert_eq!(
        notes.indexes,
        vec![ColumnList::parse("created"), ColumnList::parse("body")]
    );
}

#[tokio::test]
async fn test_unknown_schema() {
    let executor = MockExecutor::new();
    let catalog = mysql_catalog(&executor);

    assert!(matches!(
        catalog.get_schema("Nope"),
        Err(SchemaError::SchemaNotFound(name)) if name == "Nope"
    ));
    assert!(matches!(
        catalog.find("Nope", &record! {}).await,
        Err(SchemaError::SchemaNotFound(_))
    ));
}

#[tokio::test]
async fn test_invalid_declaration_is_rejected() {
    let executor = MockExecutor::new();
    let mut catalog = mysql_catalog(&executor);

    let result = catalog
        .add(SchemaDefinition::new("Bad").field(FieldDescriptor::new("s", SqlType::Varchar)))
        .await;
    assert!(matches!(result, Err(SchemaError::InvalidField { .. })));
    assert!(executor.log().is_empty());
}

// =============================================================================
// Record store on MySQL
// =============================================================================

#[tokio::test]
async fn test_remove_without_predicates_issues_no_delete() {
    let executor = MockExecutor::new();
    widgets_live(&executor);
    let mut catalog = mysql_catalog(&executor);
    catalog.add(widgets()).await.unwrap();
    executor.clear_log();

    for example in [record! {}, record! { "unknown" => 1 }, record! { "id" => Value::List(vec![]) }] {
        assert!(matches!(
            catalog.remove("Widgets", &example).await,
            Err(SchemaError::InvalidExample(_))
        ));
    }
    assert!(executor.log().is_empty());
}

#[tokio::test]
async fn test_remove_fires_per_row_then_deletes() {
    let executor = MockExecutor::new();
    widgets_live(&executor);
    let mut catalog = mysql_catalog(&executor);
    catalog.add(widgets()).await.unwrap();
    let events = record_events(&mut catalog);
    executor.clear_log();
    executor.rows(vec![
        record! { "id" => 1, "name" => "bolt", "qty" => 0 },
        record! { "id" => 2, "name" => "bracket", "qty" => 0 },
    ]);

    let removed = catalog
        .remove("Widgets", &record! { "name" => "b%" })
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(
        executor.log(),
        vec![
            "SELECT * FROM `Widgets` WHERE `Widgets`.`name` LIKE 'b%'",
            "DELETE FROM `Widgets` WHERE `Widgets`.`name` LIKE 'b%'",
        ]
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec!["remove Widgets 1", "remove Widgets 2"]
    );
}

#[tokio::test]
async fn test_put_one_takes_generated_id() {
    let executor = MockExecutor::new();
    widgets_live(&executor);
    let mut catalog = mysql_catalog(&executor);
    catalog.add(widgets()).await.unwrap();
    executor.clear_log();
    executor.insert_id(42);

    let saved = catalog
        .put_one("Widgets", &record! { "name" => "O'Brien" })
        .await
        .unwrap();

    assert_eq!(saved, record! { "id" => 42, "name" => "O'Brien", "qty" => 0 });
    assert_eq!(
        executor.log(),
        vec![r"REPLACE INTO `Widgets` (`id`, `name`, `qty`) VALUES (NULL, 'O\'Brien', '0')"]
    );
}

#[tokio::test]
async fn test_put_one_keeps_supplied_id() {
    let executor = MockExecutor::new();
    widgets_live(&executor);
    let mut catalog = mysql_catalog(&executor);
    catalog.add(widgets()).await.unwrap();
    executor.clear_log();
    executor.insert_id(99);

    let saved = catalog
        .put_one("Widgets", &record! { "id" => 7, "qty" => 3 })
        .await
        .unwrap();

    assert_eq!(saved["id"], Value::Int(7));
    assert_eq!(
        executor.log(),
        vec!["REPLACE INTO `Widgets` (`id`, `name`, `qty`) VALUES ('7', '', '3')"]
    );
}

#[tokio::test]
async fn test_list_query_shape() {
    let executor = MockExecutor::new();
    widgets_live(&executor);
    let mut catalog = mysql_catalog(&executor);
    catalog.add(widgets()).await.unwrap();
    executor.clear_log();
    executor.rows(vec![record! { "count" => 0 }]);

    let params = ListParams {
        start: 50,
        limit: 25,
        sort: Some("qty".to_string()),
        dir: SortDirection::Desc,
    };
    catalog
        .list("Widgets", &record! { "qty" => [1, 2] }, &params, None)
        .await
        .unwrap();

    assert_eq!(
        executor.log(),
        vec![
            "SELECT COUNT(*) AS count FROM `Widgets` WHERE `Widgets`.`qty` IN ('1','2')",
            "SELECT * FROM `Widgets` WHERE `Widgets`.`qty` IN ('1','2') ORDER BY `Widgets`.`qty` DESC LIMIT 50, 25",
        ]
    );

    let bad = ListParams {
        sort: Some("qty; DROP TABLE Widgets".to_string()),
        ..ListParams::default()
    };
    assert!(matches!(
        catalog.list("Widgets", &record! {}, &bad, None).await,
        Err(SchemaError::UnknownField { .. })
    ));
}
