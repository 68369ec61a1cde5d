//! Mock query runner for testing.
//!
//! Provides an in-memory connector whose behaviour is scripted up front, so the
//! registry and scheduler paths can be exercised without a backend.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::types::{self, NativeColumn, TypeMapping};
use super::{
    tag_query, CallerIdentity, CanonicalResult, CanonicalType, ConfigurationSchema,
    ConnectorConfig, QueryRunner, RunnerFactory, SchemaEntry, SettingDescriptor,
};
use crate::error::{Result, RunnerError};

const MOCK_TYPES: TypeMapping = TypeMapping::new(&[
    ("text", CanonicalType::String),
    ("int", CanonicalType::Integer),
]);

/// What the mock runner does when asked to execute.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Echo the (tagged) query text back as a single-row result.
    Echo,
    /// Fail with the given error.
    Fail(RunnerError),
    /// Block until cancelled.
    Hang,
}

/// A query runner that returns predefined results.
#[derive(Debug)]
pub struct MockQueryRunner {
    behavior: MockBehavior,
    schema: Vec<SchemaEntry>,
    cancel_requests: Arc<AtomicUsize>,
}

impl MockQueryRunner {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            schema: Vec::new(),
            cancel_requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_schema(mut self, schema: Vec<SchemaEntry>) -> Self {
        self.schema = schema;
        self
    }

    /// Number of backend cancel requests issued so far.
    pub fn cancel_requests(&self) -> usize {
        self.cancel_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryRunner for MockQueryRunner {
    fn type_name(&self) -> &'static str {
        "mock"
    }

    async fn execute(
        &self,
        query: &str,
        caller: Option<&CallerIdentity>,
        cancel: &CancellationToken,
    ) -> Result<CanonicalResult> {
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        match &self.behavior {
            MockBehavior::Echo => Ok(types::normalize(
                &[
                    NativeColumn::new("query", "text"),
                    NativeColumn::new("length", "int"),
                ],
                vec![vec![json!(tag_query(query, caller)), json!(query.len())]],
                &MOCK_TYPES,
            )),
            MockBehavior::Fail(err) => Err(err.clone()),
            MockBehavior::Hang => {
                cancel.cancelled().await;
                self.cancel_requests.fetch_add(1, Ordering::SeqCst);
                Err(RunnerError::Cancelled)
            }
        }
    }

    async fn get_schema(&self, cancel: &CancellationToken) -> Result<Vec<SchemaEntry>> {
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }
        Ok(self.schema.clone())
    }
}

/// Factory for [`MockQueryRunner`] under an arbitrary type name.
#[derive(Debug, Clone)]
pub struct MockRunnerFactory {
    type_name: &'static str,
    enabled: bool,
    behavior: MockBehavior,
    probes: Arc<AtomicUsize>,
}

impl MockRunnerFactory {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            enabled: true,
            behavior: MockBehavior::Echo,
            probes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes the capability probe fail.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Counter incremented each time the probe runs.
    pub fn probe_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.probes)
    }
}

impl RunnerFactory for MockRunnerFactory {
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn name(&self) -> &'static str {
        "Mock"
    }

    fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.enabled
    }

    fn configuration_schema(&self) -> ConfigurationSchema {
        ConfigurationSchema::new(vec![
            SettingDescriptor::string("endpoint", "Endpoint").required(),
            SettingDescriptor::string("token", "Token").secret(),
        ])
    }

    fn create(&self, _config: ConnectorConfig) -> Result<Box<dyn QueryRunner>> {
        Ok(Box::new(MockQueryRunner::new(self.behavior.clone())))
    }
}
