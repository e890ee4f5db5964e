//! Armar — minimal, idempotent infrastructure provisioner.
//!
//! Declares cloud resources in a YAML manifest, creates them in dependency
//! order through a provider adapter, and records every resource in a durable
//! registry so repeated runs converge instead of duplicating and teardown
//! works without the original manifest.

pub mod cli;
pub mod core;
pub mod provider;
