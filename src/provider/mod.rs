//! Provider boundary — the only network-facing interface.
//!
//! The core requests create/find/delete by resource kind with opaque
//! parameters and receives a provider id or a typed failure. Cloud SDK
//! specifics, credentials, and region live entirely behind this trait.

pub mod memory;

use crate::core::types::ResourceKind;
use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;

/// Cloud-assigned identifier (ARN, resource id, queue URL, ...).
pub type ProviderId = String;

/// Typed failure from a provider operation.
///
/// `AlreadyExists` on create is not fatal — the provisioner recovers by
/// resolving the existing resource through `find_existing`. `NotFound` on
/// delete is treated as success during teardown.
#[derive(Debug, Clone, Error)]
pub enum ProviderFailure {
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("resource not found")]
    NotFound,

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("validation rejected: {0}")]
    Validation(String),
}

impl ProviderFailure {
    /// Whether the caller should back off and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::TransientNetwork(_))
    }
}

/// A create call with all templates resolved — dependency provider ids are
/// already substituted into `parameters` by the provisioner.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub kind: ResourceKind,
    /// Natural/physical name
    pub name: String,
    pub parameters: IndexMap<String, serde_yaml_ng::Value>,
}

/// Capability interface over a cloud SDK, one operation family per kind.
///
/// No operation is assumed idempotent by the provider itself; idempotency is
/// reconstructed at the provisioner/registry layer. Implementations own their
/// credentials and region configuration.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Create a resource, returning its provider id.
    async fn create(&self, request: &CreateRequest) -> Result<ProviderId, ProviderFailure>;

    /// Look up a resource by its natural name, for adopt-instead-of-create.
    async fn find_existing(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ProviderId>, ProviderFailure>;

    /// Delete a resource by provider id.
    async fn delete(&self, kind: ResourceKind, provider_id: &str) -> Result<(), ProviderFailure>;
}
