//! azure_trino connector tests against a scripted Trino transport.

use pretty_assertions::assert_eq;
use query_runners::credentials::StaticTokenProvider;
use query_runners::runner::{
    run_query, CallerIdentity, CanonicalResult, CanonicalType, QueryRunner, Registry, RunOutcome,
};
use query_runners::trino::{AzureTrinoFactory, MockTransport, TrinoError};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn registry_with(transport: &Arc<MockTransport>) -> Registry {
    let mut registry = Registry::new();
    registry.register(AzureTrinoFactory::with_backend(
        transport.clone(),
        Arc::new(StaticTokenProvider::new("test-token")),
    ));
    registry
}

fn settings() -> Map<String, Value> {
    json!({"host": "cluster.example.com", "catalog": "hive", "schema": "sales"})
        .as_object()
        .cloned()
        .unwrap()
}

fn runner(transport: &Arc<MockTransport>) -> Box<dyn QueryRunner> {
    registry_with(transport)
        .create("azure_trino", &settings())
        .unwrap()
}

#[tokio::test]
async fn test_result_spread_over_pages() {
    let transport = Arc::new(
        MockTransport::new()
            .then(json!({
                "id": "q1",
                "nextUri": "https://cluster.example.com/v1/statement/q1/1",
                "stats": {"state": "QUEUED"}
            }))
            .then(json!({
                "id": "q1",
                "nextUri": "https://cluster.example.com/v1/statement/q1/2",
                "columns": [
                    {"name": "day", "type": "date"},
                    {"name": "n", "type": "bigint"},
                    {"name": "n", "type": "double"}
                ],
                "data": [["2024-01-01", 3, 1.5]],
                "stats": {"state": "RUNNING"}
            }))
            .then(json!({
                "id": "q1",
                "data": [["2024-01-02", 4, 2.5]],
                "stats": {"state": "FINISHED"}
            })),
    );
    let runner = runner(&transport);

    let outcome = run_query(runner.as_ref(), "SELECT * FROM visits", None, &CancellationToken::new())
        .await
        .unwrap();
    let result = CanonicalResult::from_json(outcome.data.as_deref().unwrap()).unwrap();

    let names: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["day", "n", "n2"]);
    let types: Vec<CanonicalType> = result.columns.iter().map(|c| c.column_type).collect();
    assert_eq!(
        types,
        vec![CanonicalType::Date, CanonicalType::Integer, CanonicalType::Float]
    );

    assert_eq!(result.rows.len(), 2);
    for row in &result.rows {
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(keys, names);
    }
    assert_eq!(result.rows[1]["n2"], json!(2.5));
    assert_eq!(transport.fetched().len(), 2);
}

#[tokio::test]
async fn test_wire_shape() {
    let transport = Arc::new(MockTransport::new().then(json!({
        "id": "q1",
        "columns": [
            {"name": "ok", "type": "boolean"},
            {"name": "where", "type": "ipaddress"}
        ],
        "data": [[true, "10.0.0.1"]]
    })));
    let runner = runner(&transport);

    let outcome = run_query(runner.as_ref(), "SELECT 1", None, &CancellationToken::new())
        .await
        .unwrap();
    let payload: Value = serde_json::from_str(outcome.data.as_deref().unwrap()).unwrap();

    assert_eq!(
        payload,
        json!({
            "columns": [
                {"name": "ok", "type": "boolean"},
                {"name": "where", "type": null}
            ],
            "rows": [{"ok": true, "where": "10.0.0.1"}]
        })
    );
}

#[tokio::test]
async fn test_rejected_token_is_auth_error() {
    let transport = Arc::new(MockTransport::new().then_fail(TrinoError::Http {
        status: 401,
        body: "Unauthorized".into(),
    }));
    let runner = runner(&transport);

    let outcome = run_query(runner.as_ref(), "SELECT 1", None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.error.unwrap().starts_with("Authentication error"));
}

#[tokio::test]
async fn test_unstructured_error_is_unspecified() {
    let transport = Arc::new(MockTransport::new().then(json!({
        "id": "q1",
        "error": "worker crashed"
    })));
    let runner = runner(&transport);

    let outcome = run_query(runner.as_ref(), "SELECT 1", None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        RunOutcome::failure("Unspecified DatabaseError: worker crashed")
    );
}

#[tokio::test]
async fn test_identity_reaches_backend() {
    let transport = Arc::new(MockTransport::new().then(json!({"id": "q1", "columns": [], "data": []})));
    let runner = runner(&transport);
    let caller = CallerIdentity::new("Grace Hopper", "grace@example.com");

    run_query(runner.as_ref(), "SELECT 1", Some(&caller), &CancellationToken::new())
        .await
        .unwrap();

    let (user, sql) = transport.submitted().remove(0);
    assert_eq!(user, "grace@example.com");
    assert!(sql.starts_with("/* {\"name\":\"Grace Hopper\",\"email\":\"grace@example.com\"} */\n"));
    assert!(sql.ends_with("SELECT 1"));
}

#[tokio::test]
async fn test_schema_excludes_system_schemas() {
    let transport = Arc::new(MockTransport::new().then(json!({
        "id": "q1",
        "columns": [
            {"name": "table_schema", "type": "varchar"},
            {"name": "table_name", "type": "varchar"},
            {"name": "column_name", "type": "varchar"}
        ],
        "data": [
            ["sales", "orders", "id"],
            ["pg_catalog", "pg_class", "oid"],
            ["sales", "customers", "id"],
            ["sales", "orders", "total"]
        ]
    })));
    let runner = runner(&transport);

    let schema = runner.get_schema(&CancellationToken::new()).await.unwrap();

    let names: Vec<&str> = schema.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["sales.orders", "sales.customers"]);
    assert_eq!(schema[0].columns, vec!["id", "total"]);
}
