//! Registry and scheduler-facing contract tests.
//!
//! Exercises the path a scheduler takes: config file, registry lookup,
//! runner creation, execution on its own task and cancellation.

use query_runners::config::Config;
use query_runners::runner::mock::MockBehavior;
use query_runners::runner::{
    run_query, CallerIdentity, Cancelled, CanonicalResult, MockRunnerFactory, QueryRunner, Registry,
    RunOutcome,
};
use query_runners::RunnerError;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn raw(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_builtin_connectors_are_listed() {
    let registry = Registry::with_builtin();

    let all: Vec<&str> = registry.list_all().iter().map(|info| info.type_name).collect();
    assert_eq!(all, vec!["azure_trino", "pg"]);
    assert!(registry.is_enabled("pg"));
}

#[test]
fn test_unknown_type_is_not_found() {
    let registry = Registry::with_builtin();
    let err = registry.create("oracle", &Map::new()).err().unwrap();
    assert_eq!(err, RunnerError::not_found("oracle"));
}

#[test]
fn test_create_validates_before_building() {
    let registry = Registry::with_builtin();

    let err = registry
        .create("pg", &raw(json!({"host": "localhost"})))
        .err()
        .unwrap();
    assert!(matches!(err, RunnerError::Configuration(_)));

    let err = registry
        .create("azure_trino", &raw(json!({"host": "", "use_msi": true})))
        .err()
        .unwrap();
    assert!(matches!(err, RunnerError::Configuration(_)));
}

#[test]
fn test_configuration_errors_do_not_leak_secrets() {
    let registry = Registry::with_builtin();

    let err = registry
        .create("pg", &raw(json!({"password": "hunter2", "port": "not a number"})))
        .err()
        .unwrap();
    assert!(!err.to_string().contains("hunter2"));
}

#[tokio::test]
async fn test_source_from_config_file_runs() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[sources.scratch]
type = "echo"
endpoint = "memory"
"#
    )
    .unwrap();

    let config = Config::load_from_file(file.path()).unwrap();
    let source = config.get_source("scratch").unwrap();

    let mut registry = Registry::new();
    registry.register(MockRunnerFactory::new("echo"));
    let runner = registry
        .create(&source.source_type, &source.resolved_settings().unwrap())
        .unwrap();

    let caller = CallerIdentity::new("Ada", "ada@example.com");
    let outcome = tokio_test::assert_ok!(
        run_query(runner.as_ref(), "SELECT 1", Some(&caller), &CancellationToken::new()).await
    );

    let result = CanonicalResult::from_json(outcome.data.as_deref().unwrap()).unwrap();
    assert_eq!(
        result.rows[0]["query"],
        json!("/* {\"name\":\"Ada\",\"email\":\"ada@example.com\"} */\nSELECT 1")
    );
}

#[tokio::test]
async fn test_failures_become_outcomes() {
    let mut registry = Registry::new();
    registry.register(
        MockRunnerFactory::new("flaky")
            .with_behavior(MockBehavior::Fail(RunnerError::auth("token expired"))),
    );
    let runner = registry
        .create("flaky", &raw(json!({"endpoint": "x"})))
        .unwrap();

    let outcome = tokio_test::assert_ok!(
        run_query(runner.as_ref(), "SELECT 1", None, &CancellationToken::new()).await
    );
    assert_eq!(outcome, RunOutcome::failure("Authentication error: token expired"));
}

#[tokio::test]
async fn test_cancellation_from_scheduler_task() {
    let mut registry = Registry::new();
    registry.register(MockRunnerFactory::new("slow").with_behavior(MockBehavior::Hang));
    let runner: Arc<dyn QueryRunner> = registry
        .create("slow", &raw(json!({"endpoint": "x"})))
        .unwrap()
        .into();

    let cancel = CancellationToken::new();
    let task = {
        let runner = Arc::clone(&runner);
        let cancel = cancel.clone();
        tokio::spawn(async move { run_query(runner.as_ref(), "SELECT 1", None, &cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let joined = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(joined, Err(Cancelled));
}

#[test]
fn test_disabled_connector_is_hidden_but_known() {
    let mut registry = Registry::with_builtin();
    registry.register(MockRunnerFactory::new("legacy").disabled());

    assert_eq!(registry.list_enabled(), vec!["azure_trino", "pg"]);
    assert!(registry.get("legacy").is_ok());

    assert!(registry
        .create("legacy", &raw(json!({"endpoint": "x"})))
        .is_err());
}
