//! Integration tests for query-runners.

pub mod organization_test;
pub mod postgres_test;
pub mod registry_test;
pub mod trino_runner_test;
