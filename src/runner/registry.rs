//! Runner registry.
//!
//! Maps connector type names to factories. Built once at start-up and handed
//! to whatever schedules executions; nothing here is global.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::{QueryRunner, RunnerFactory};
use crate::error::{Result, RunnerError};

struct Entry {
    factory: Arc<dyn RunnerFactory>,
    enabled: bool,
}

/// Summary of a registered connector type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerInfo {
    pub type_name: &'static str,
    pub name: &'static str,
    pub enabled: bool,
}

/// Catalog of connector implementations keyed by type name.
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<&'static str, Entry>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every connector shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(crate::trino::AzureTrinoFactory::new());
        registry.register(crate::postgres::PostgresFactory);
        registry
    }

    /// Registers a factory, replacing any previous one with the same type name.
    ///
    /// The factory's capability probe runs here, once.
    pub fn register<F>(&mut self, factory: F)
    where
        F: RunnerFactory + 'static,
    {
        let factory: Arc<dyn RunnerFactory> = Arc::new(factory);
        let type_name = factory.type_name();
        let enabled = factory.probe();

        if enabled {
            info!("Registered query runner: {}", type_name);
        } else {
            warn!("Registered query runner {} (disabled: probe failed)", type_name);
        }

        if self
            .entries
            .insert(type_name, Entry { factory, enabled })
            .is_some()
        {
            info!("Replaced previous registration for {}", type_name);
        }
    }

    /// Returns the factory for `type_name`.
    pub fn get(&self, type_name: &str) -> Result<Arc<dyn RunnerFactory>> {
        self.entries
            .get(type_name)
            .map(|e| Arc::clone(&e.factory))
            .ok_or_else(|| RunnerError::not_found(type_name))
    }

    /// Returns whether `type_name` is registered and its probe succeeded.
    pub fn is_enabled(&self, type_name: &str) -> bool {
        self.entries.get(type_name).is_some_and(|e| e.enabled)
    }

    /// Type names of enabled connectors, sorted.
    pub fn list_enabled(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.enabled)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Every registered connector, enabled or not, sorted by type name.
    pub fn list_all(&self) -> Vec<RunnerInfo> {
        self.entries
            .values()
            .map(|e| RunnerInfo {
                type_name: e.factory.type_name(),
                name: e.factory.name(),
                enabled: e.enabled,
            })
            .collect()
    }

    /// Validates raw settings and builds a runner of the given type.
    ///
    /// Disabled connectors are rejected with a configuration error.
    pub fn create(&self, type_name: &str, raw: &Map<String, Value>) -> Result<Box<dyn QueryRunner>> {
        let factory = self.get(type_name)?;
        if !self.is_enabled(type_name) {
            return Err(RunnerError::config(format!(
                "Query runner '{type_name}' is not available in this deployment"
            )));
        }

        let config = factory.configuration_schema().validate(raw)?;
        factory.create(config)
    }
}
