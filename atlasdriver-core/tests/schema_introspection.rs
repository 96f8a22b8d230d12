//! Schema introspection through the driver façade.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use atlasdriver_core::Result;
use atlasdriver_core::error::AtlasDriverError;
use atlasdriver_core::models::{ColumnDescriptor, GenericType, SchemaColumn, TableName};
use common::{MockBackend, driver, pool_options};

fn column(name: &str, type_name: &str, attributes: &[&str]) -> SchemaColumn {
    SchemaColumn {
        name: name.to_string(),
        type_name: type_name.to_string(),
        attributes: attributes.iter().map(|a| a.to_string()).collect(),
    }
}

#[tokio::test]
async fn test_tables_schema_nests_catalog_table_columns() -> Result<()> {
    let backend = MockBackend::new();
    backend.add_table("sales", "t1", &[("c2", "string", false), ("c1", "int", true)]);
    backend.add_table("sales", "t2", &[("c3", "double", false)]);
    let driver = driver(&backend, pool_options(1));

    let schema = driver.tables_schema().await?;

    assert_eq!(schema.len(), 1);
    let tables = &schema["sales"];
    assert_eq!(
        tables["t1"],
        vec![
            column("c1", "int", &["primaryKey"]),
            column("c2", "string", &[]),
        ]
    );
    assert_eq!(tables["t2"], vec![column("c3", "double", &[])]);

    // One table listing plus one column listing per table, on one connection.
    assert_eq!(backend.column_lookups.lock().unwrap().len(), 2);
    assert_eq!(backend.created(), 1);
    assert_eq!(driver.pool_status().borrowed, 0);
    Ok(())
}

#[tokio::test]
async fn test_tables_schema_failure_releases_connection() {
    let backend = MockBackend::new();
    backend.add_table("sales", "t1", &[("c1", "int", true)]);
    backend.add_table("sales", "t2", &[("c3", "double", false)]);
    *backend.fail_columns_for.lock().unwrap() = Some("t2".to_string());
    let driver = driver(&backend, pool_options(1));

    let error = driver.tables_schema().await.unwrap_err();
    assert!(matches!(error, AtlasDriverError::Introspection { .. }));
    assert_eq!(error.backend_message(), "schema not set");

    let status = driver.pool_status();
    assert_eq!(status.borrowed, 0);
    assert_eq!(status.idle, 1);
}

#[tokio::test]
async fn test_table_column_types_qualified_and_unqualified() -> Result<()> {
    let backend = MockBackend::new();
    backend.add_table("sales", "orders", &[("_id", "objectId", true), ("total", "decimal", false)]);
    let driver = driver(&backend, pool_options(1));

    let expected = vec![
        ColumnDescriptor {
            name: "_id".to_string(),
            generic_type: GenericType::Text,
        },
        ColumnDescriptor {
            name: "total".to_string(),
            generic_type: GenericType::Decimal,
        },
    ];
    assert_eq!(driver.table_column_types("archive.orders").await?, expected);
    assert_eq!(driver.table_column_types("orders").await?, expected);

    let lookups = backend.column_lookups.lock().unwrap().clone();
    assert_eq!(
        lookups,
        vec![
            (Some("archive".to_string()), "orders".to_string()),
            (Some("sales".to_string()), "orders".to_string()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_tables_query_lists_names_of_one_database() -> Result<()> {
    let backend = MockBackend::new();
    backend.add_table("sales", "orders", &[]);
    backend.add_table("sales", "customers", &[]);
    backend.add_table("hr", "staff", &[]);
    let driver = driver(&backend, pool_options(1));

    let tables = driver.tables_query("sales").await?;
    assert_eq!(
        tables,
        vec![
            TableName {
                table_name: "orders".to_string()
            },
            TableName {
                table_name: "customers".to_string()
            },
        ]
    );
    assert!(driver.tables_query("inventory").await?.is_empty());
    Ok(())
}
