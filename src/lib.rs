//! Pluggable query runners.
//!
//! One contract over heterogeneous query engines: each connector declares its
//! configuration schema, introspects schemas, executes queries on behalf of a
//! caller and normalizes results into a canonical columnar shape.

pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod organization;
pub mod postgres;
pub mod runner;
pub mod trino;

pub use error::{Result, RunnerError};
