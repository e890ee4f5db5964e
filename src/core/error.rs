//! Crate-level error taxonomy.

use crate::provider::ProviderFailure;
use thiserror::Error;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the provisioning core.
///
/// Provider failures that are recovered (AlreadyExists, NotFound-on-delete)
/// or retried (RateLimited, TransientNetwork) never escape as `Error`; only
/// exhausted or non-retryable failures do, attached to the offending entry.
#[derive(Debug, Error)]
pub enum Error {
    /// The depends_on graph is not a DAG. Detected before any provider call.
    #[error("dependency cycle detected involving: {0}")]
    DependencyCycle(String),

    #[error("resource '{resource}' depends on unknown resource '{dependency}'")]
    UnknownDependency { resource: String, dependency: String },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("provider error on '{logical_name}': {source}")]
    Provider {
        logical_name: String,
        source: ProviderFailure,
    },

    #[error("{0} resource(s) failed")]
    BatchFailed(u32),
}
