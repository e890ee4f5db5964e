//! Core provisioning engine: manifest parsing, dependency resolution,
//! durable registry, and the provision/teardown orchestrators.

pub mod error;
pub mod eventlog;
pub mod parser;
pub mod provisioner;
pub mod registry;
pub mod resolver;
pub mod teardown;
pub mod types;

pub use error::{Error, Result};
pub use types::{Manifest, ProvisionReport, ResourceKind, ResourceSpec, TeardownReport};
