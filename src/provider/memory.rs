//! In-memory reference adapter.
//!
//! Backs local dry runs and the test suite. Mints provider ids from the kind
//! prefix and a counter, and supports scripted failure injection so retry and
//! partial-failure paths can be exercised deterministically.

use super::{CreateRequest, ProviderAdapter, ProviderFailure, ProviderId};
use crate::core::types::ResourceKind;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    /// idempotency key -> provider id
    records: HashMap<String, ProviderId>,
    /// provider id -> idempotency key (for delete)
    by_id: HashMap<ProviderId, String>,
    counter: u64,
    create_calls: u32,
    delete_calls: u32,
    created_order: Vec<String>,
    created_requests: Vec<CreateRequest>,
    deleted_order: Vec<String>,
    /// Scripted failures consumed front-to-back per idempotency key
    create_failures: HashMap<String, VecDeque<ProviderFailure>>,
    delete_failures: HashMap<String, VecDeque<ProviderFailure>>,
}

/// Reference in-memory provider.
#[derive(Default)]
pub struct MemoryProvider {
    inner: Mutex<Inner>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next create call on `kind/name`.
    pub fn fail_create(&self, kind: ResourceKind, name: &str, failure: ProviderFailure) {
        let mut inner = self.inner.lock().expect("memory provider lock poisoned");
        inner
            .create_failures
            .entry(key(kind, name))
            .or_default()
            .push_back(failure);
    }

    /// Queue a failure for the next delete call on `kind/name`.
    pub fn fail_delete(&self, kind: ResourceKind, name: &str, failure: ProviderFailure) {
        let mut inner = self.inner.lock().expect("memory provider lock poisoned");
        inner
            .delete_failures
            .entry(key(kind, name))
            .or_default()
            .push_back(failure);
    }

    /// Pre-seed a resource, as if it existed in the account already.
    pub fn seed(&self, kind: ResourceKind, name: &str) -> ProviderId {
        let mut inner = self.inner.lock().expect("memory provider lock poisoned");
        let id = mint_id(&mut inner, kind);
        let k = key(kind, name);
        inner.records.insert(k.clone(), id.clone());
        inner.by_id.insert(id.clone(), k);
        id
    }

    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        let inner = self.inner.lock().expect("memory provider lock poisoned");
        inner.records.contains_key(&key(kind, name))
    }

    pub fn resource_count(&self) -> usize {
        let inner = self.inner.lock().expect("memory provider lock poisoned");
        inner.records.len()
    }

    pub fn create_calls(&self) -> u32 {
        let inner = self.inner.lock().expect("memory provider lock poisoned");
        inner.create_calls
    }

    pub fn delete_calls(&self) -> u32 {
        let inner = self.inner.lock().expect("memory provider lock poisoned");
        inner.delete_calls
    }

    /// Idempotency keys in the order they were successfully created.
    pub fn created_order(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("memory provider lock poisoned");
        inner.created_order.clone()
    }

    /// Every request that resulted in a successful create, in order.
    pub fn created_requests(&self) -> Vec<CreateRequest> {
        let inner = self.inner.lock().expect("memory provider lock poisoned");
        inner.created_requests.clone()
    }

    /// Idempotency keys in the order they were successfully deleted.
    pub fn deleted_order(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("memory provider lock poisoned");
        inner.deleted_order.clone()
    }
}

fn key(kind: ResourceKind, name: &str) -> String {
    format!("{}/{}", kind, name)
}

fn mint_id(inner: &mut Inner, kind: ResourceKind) -> ProviderId {
    inner.counter += 1;
    format!("{}-{:08x}", kind.id_prefix(), inner.counter)
}

fn pop_failure(
    queue: &mut HashMap<String, VecDeque<ProviderFailure>>,
    k: &str,
) -> Option<ProviderFailure> {
    queue.get_mut(k).and_then(VecDeque::pop_front)
}

#[async_trait]
impl ProviderAdapter for MemoryProvider {
    async fn create(&self, request: &CreateRequest) -> Result<ProviderId, ProviderFailure> {
        let mut inner = self.inner.lock().expect("memory provider lock poisoned");
        inner.create_calls += 1;

        let k = key(request.kind, &request.name);
        if let Some(failure) = pop_failure(&mut inner.create_failures, &k) {
            return Err(failure);
        }
        if inner.records.contains_key(&k) {
            return Err(ProviderFailure::AlreadyExists(k));
        }

        let id = mint_id(&mut inner, request.kind);
        inner.records.insert(k.clone(), id.clone());
        inner.by_id.insert(id.clone(), k.clone());
        inner.created_order.push(k);
        inner.created_requests.push(request.clone());
        Ok(id)
    }

    async fn find_existing(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ProviderId>, ProviderFailure> {
        let inner = self.inner.lock().expect("memory provider lock poisoned");
        Ok(inner.records.get(&key(kind, name)).cloned())
    }

    async fn delete(&self, kind: ResourceKind, provider_id: &str) -> Result<(), ProviderFailure> {
        let mut inner = self.inner.lock().expect("memory provider lock poisoned");
        inner.delete_calls += 1;

        let k = match inner.by_id.get(provider_id) {
            Some(k) => k.clone(),
            None => return Err(ProviderFailure::NotFound),
        };
        if let Some(failure) = pop_failure(&mut inner.delete_failures, &k) {
            return Err(failure);
        }

        let _ = kind; // the key already encodes the kind
        inner.records.remove(&k);
        inner.by_id.remove(provider_id);
        inner.deleted_order.push(k);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn request(kind: ResourceKind, name: &str) -> CreateRequest {
        CreateRequest {
            kind,
            name: name.to_string(),
            parameters: IndexMap::new(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_prefixed_id() {
        let provider = MemoryProvider::new();
        let id = provider
            .create(&request(ResourceKind::Vpc, "net"))
            .await
            .unwrap();
        assert!(id.starts_with("vpc-"));
        assert!(provider.contains(ResourceKind::Vpc, "net"));
    }

    #[tokio::test]
    async fn test_create_twice_is_already_exists() {
        let provider = MemoryProvider::new();
        provider
            .create(&request(ResourceKind::Bucket, "data"))
            .await
            .unwrap();
        let err = provider
            .create(&request(ResourceKind::Bucket, "data"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderFailure::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_find_existing() {
        let provider = MemoryProvider::new();
        assert!(provider
            .find_existing(ResourceKind::Queue, "jobs")
            .await
            .unwrap()
            .is_none());
        let id = provider.seed(ResourceKind::Queue, "jobs");
        assert_eq!(
            provider
                .find_existing(ResourceKind::Queue, "jobs")
                .await
                .unwrap(),
            Some(id)
        );
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let provider = MemoryProvider::new();
        let err = provider
            .delete(ResourceKind::Vpc, "vpc-ffffffff")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderFailure::NotFound));
    }

    #[tokio::test]
    async fn test_delete_removes_resource() {
        let provider = MemoryProvider::new();
        let id = provider
            .create(&request(ResourceKind::Table, "users"))
            .await
            .unwrap();
        provider.delete(ResourceKind::Table, &id).await.unwrap();
        assert!(!provider.contains(ResourceKind::Table, "users"));
        assert_eq!(provider.deleted_order(), vec!["table/users"]);
    }

    #[tokio::test]
    async fn test_failure_injection_consumed_in_order() {
        let provider = MemoryProvider::new();
        provider.fail_create(
            ResourceKind::Vpc,
            "net",
            ProviderFailure::RateLimited("slow down".into()),
        );

        let err = provider
            .create(&request(ResourceKind::Vpc, "net"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderFailure::RateLimited(_)));

        // Queue drained — next call succeeds
        provider
            .create(&request(ResourceKind::Vpc, "net"))
            .await
            .unwrap();
        assert_eq!(provider.create_calls(), 2);
    }
}
