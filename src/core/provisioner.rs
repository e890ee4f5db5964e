//! Provisioning orchestration — create resources in dependency order.
//!
//! Per resource: Pending -> Resolving -> Creating -> Created, or adoption via
//! idempotency lookup, or Failed. The registry is consulted before every
//! provider call and updated (with a flush) before and after each creation,
//! so a crash never loses an in-flight resource. Creation failures after
//! retry exhaustion abort the batch: partially-created infrastructure stays
//! in the registry for operator inspection, never silently rolled back.

use super::error::{Error, Result};
use super::eventlog::{self, RunEvent};
use super::registry::Registry;
use super::resolver;
use super::types::{
    EntryState, Manifest, ProvisionReport, RegistryEntry, ResourceSpec, RunPolicy,
};
use crate::provider::{CreateRequest, ProviderAdapter, ProviderFailure};
use indexmap::IndexMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for a provisioning run.
pub struct ProvisionConfig<'a> {
    pub manifest: &'a Manifest,
    pub state_dir: &'a Path,
    /// Report what would happen without touching the provider or registry.
    pub dry_run: bool,
}

/// Backoff delay before the next attempt: base * 2^(attempt-1).
pub(crate) fn backoff_delay(policy: &RunPolicy, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    Duration::from_millis(policy.base_delay_ms.saturating_mul(1u64 << shift))
}

/// Invoke a provider operation with a per-call timeout, retrying retryable
/// failures with exponential backoff up to the policy's attempt bound.
/// Returns the value and the number of attempts spent.
pub(crate) async fn call_with_backoff<T, F, Fut>(
    policy: &RunPolicy,
    operation: &str,
    mut op: F,
) -> std::result::Result<(T, u32), ProviderFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ProviderFailure>>,
{
    let timeout = Duration::from_secs(policy.op_timeout_secs);
    let mut attempt = 1u32;
    loop {
        let outcome = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderFailure::TransientNetwork(format!(
                "{} timed out after {}s",
                operation, policy.op_timeout_secs
            ))),
        };

        match outcome {
            Ok(value) => return Ok((value, attempt)),
            Err(failure) if failure.is_retryable() && attempt < policy.max_attempts => {
                let delay = backoff_delay(policy, attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "retryable provider failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(failure) => return Err(failure),
        }
    }
}

/// Outcome of processing one descriptor.
enum StepOutcome {
    Created,
    SkippedExisting,
    Failed(String),
}

/// Provision every resource in the manifest, in topological order.
///
/// The order is computed before any provider call; a cycle fails the whole
/// batch up front. Returns the batch report; the report's `failed`/`first_error`
/// fields carry per-entry failures, while `Err` is reserved for pre-flight
/// and registry problems.
pub async fn provision(
    cfg: &ProvisionConfig<'_>,
    adapter: &dyn ProviderAdapter,
    registry: &mut Registry,
) -> Result<ProvisionReport> {
    let order = resolver::execution_order(cfg.manifest)?;

    if cfg.dry_run {
        return Ok(dry_run_report(&order, registry));
    }

    let run_id = eventlog::generate_run_id();
    log_event(
        cfg.state_dir,
        RunEvent::ProvisionStarted {
            run_id: run_id.clone(),
            manifest: cfg.manifest.name.clone(),
        },
    );

    let mut report = ProvisionReport::default();

    for logical_name in &order {
        let spec = match cfg.manifest.resources.get(logical_name) {
            Some(s) => s,
            None => continue,
        };

        // Idempotent re-run: already created under this logical name.
        if matches!(
            registry.lookup(logical_name).map(|e| e.state),
            Some(EntryState::Created)
        ) {
            debug!(%logical_name, "already created, skipping");
            report.skipped_existing += 1;
            continue;
        }

        match provision_one(cfg, adapter, registry, logical_name, spec).await? {
            StepOutcome::Created => report.created += 1,
            StepOutcome::SkippedExisting => report.skipped_existing += 1,
            StepOutcome::Failed(error) => {
                report.failed += 1;
                report.first_error = Some(error);
                // Fail fast: dependents cannot proceed without a provider id.
                break;
            }
        }
    }

    log_event(
        cfg.state_dir,
        RunEvent::ProvisionCompleted {
            run_id,
            created: report.created,
            skipped_existing: report.skipped_existing,
            failed: report.failed,
        },
    );

    Ok(report)
}

/// Resolve-or-create a single resource.
async fn provision_one(
    cfg: &ProvisionConfig<'_>,
    adapter: &dyn ProviderAdapter,
    registry: &mut Registry,
    logical_name: &str,
    spec: &ResourceSpec,
) -> Result<StepOutcome> {
    let policy = &cfg.manifest.policy;

    // Resolving: the registry may know this resource under another logical
    // name from a previous manifest revision.
    let registry_hit = registry
        .lookup_by_idempotency_key(spec.kind, &spec.name)
        .filter(|e| e.state == EntryState::Created)
        .and_then(|e| e.provider_id.clone());
    if let Some(provider_id) = registry_hit {
        adopt(cfg, registry, logical_name, spec, provider_id)?;
        return Ok(StepOutcome::SkippedExisting);
    }

    // Resolving: the resource may exist in the account without being ours
    // (check-before-create).
    let found = call_with_backoff(policy, "find_existing", || {
        adapter.find_existing(spec.kind, &spec.name)
    })
    .await;
    match found {
        Ok((Some(provider_id), _)) => {
            adopt(cfg, registry, logical_name, spec, provider_id)?;
            return Ok(StepOutcome::SkippedExisting);
        }
        Ok((None, _)) => {}
        Err(failure) => return mark_failed(cfg, registry, logical_name, spec, failure),
    }

    // Creating: substitute dependency provider ids, then call out.
    let refs = dependency_refs(registry, logical_name, spec)?;
    let parameters = resolver::resolve_parameters(spec, &cfg.manifest.params, &refs)?;

    // Record Requested before the call so an interrupted run is visible.
    registry.record(new_entry(registry, logical_name, spec, EntryState::Requested, None))?;

    let request = CreateRequest {
        kind: spec.kind,
        name: spec.name.clone(),
        parameters,
    };
    match call_with_backoff(policy, "create", || adapter.create(&request)).await {
        Ok((provider_id, attempts)) => {
            registry.record(new_entry(
                registry,
                logical_name,
                spec,
                EntryState::Created,
                Some(provider_id.clone()),
            ))?;
            log_event(
                cfg.state_dir,
                RunEvent::ResourceCreated {
                    logical_name: logical_name.to_string(),
                    provider_id,
                    attempts,
                },
            );
            Ok(StepOutcome::Created)
        }
        Err(ProviderFailure::AlreadyExists(_)) => {
            // Raced or stale view: resolve the existing resource instead.
            match call_with_backoff(policy, "find_existing", || {
                adapter.find_existing(spec.kind, &spec.name)
            })
            .await
            {
                Ok((Some(provider_id), _)) => {
                    adopt(cfg, registry, logical_name, spec, provider_id)?;
                    Ok(StepOutcome::SkippedExisting)
                }
                Ok((None, _)) => {
                    let failure = ProviderFailure::Validation(format!(
                        "provider reported '{}' as existing but it cannot be found",
                        spec.idempotency_key()
                    ));
                    mark_failed(cfg, registry, logical_name, spec, failure)
                }
                Err(failure) => mark_failed(cfg, registry, logical_name, spec, failure),
            }
        }
        Err(failure) => mark_failed(cfg, registry, logical_name, spec, failure),
    }
}

/// Record an adopted resource as Created without a create call.
fn adopt(
    cfg: &ProvisionConfig<'_>,
    registry: &mut Registry,
    logical_name: &str,
    spec: &ResourceSpec,
    provider_id: String,
) -> Result<()> {
    debug!(logical_name, %provider_id, "adopting existing resource");
    registry.record(new_entry(
        registry,
        logical_name,
        spec,
        EntryState::Created,
        Some(provider_id.clone()),
    ))?;
    log_event(
        cfg.state_dir,
        RunEvent::ResourceAdopted {
            logical_name: logical_name.to_string(),
            provider_id,
        },
    );
    Ok(())
}

/// Record a failed resource and report the step outcome.
fn mark_failed(
    cfg: &ProvisionConfig<'_>,
    registry: &mut Registry,
    logical_name: &str,
    spec: &ResourceSpec,
    failure: ProviderFailure,
) -> Result<StepOutcome> {
    let error = Error::Provider {
        logical_name: logical_name.to_string(),
        source: failure,
    }
    .to_string();

    let mut entry = new_entry(registry, logical_name, spec, EntryState::Failed, None);
    entry.last_error = Some(error.clone());
    registry.record(entry)?;

    log_event(
        cfg.state_dir,
        RunEvent::ResourceFailed {
            logical_name: logical_name.to_string(),
            error: error.clone(),
        },
    );
    Ok(StepOutcome::Failed(error))
}

/// Provider ids of this resource's dependencies. Topological ordering plus
/// fail-fast guarantees every dependency is Created by the time we get here.
fn dependency_refs(
    registry: &Registry,
    logical_name: &str,
    spec: &ResourceSpec,
) -> Result<IndexMap<String, String>> {
    let mut refs = IndexMap::with_capacity(spec.depends_on.len());
    for dep in &spec.depends_on {
        let provider_id = registry
            .lookup(dep)
            .and_then(|e| e.provider_id.clone())
            .ok_or_else(|| {
                Error::Registry(format!(
                    "dependency '{}' of '{}' has no provider id",
                    dep, logical_name
                ))
            })?;
        refs.insert(dep.clone(), provider_id);
    }
    Ok(refs)
}

/// Build an entry, keeping the original created_at across state transitions.
fn new_entry(
    registry: &Registry,
    logical_name: &str,
    spec: &ResourceSpec,
    state: EntryState,
    provider_id: Option<String>,
) -> RegistryEntry {
    let created_at = registry
        .lookup(logical_name)
        .map(|e| e.created_at.clone())
        .unwrap_or_else(eventlog::now_rfc3339);
    RegistryEntry {
        logical_name: logical_name.to_string(),
        kind: spec.kind,
        name: spec.name.clone(),
        provider_id,
        state,
        depends_on: spec.depends_on.clone(),
        created_at,
        last_error: None,
    }
}

fn dry_run_report(order: &[String], registry: &Registry) -> ProvisionReport {
    let mut report = ProvisionReport::default();
    for logical_name in order {
        let created = matches!(
            registry.lookup(logical_name).map(|e| e.state),
            Some(EntryState::Created)
        );
        if created {
            report.skipped_existing += 1;
        } else {
            report.created += 1;
        }
    }
    report
}

fn log_event(state_dir: &Path, event: RunEvent) {
    if let Err(e) = eventlog::append_event(state_dir, event) {
        warn!(error = %e, "cannot append audit event");
    }
}
