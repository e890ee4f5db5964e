//! Teardown orchestration — delete registered resources in reverse
//! dependency order.
//!
//! Works entirely from the registry, so a teardown succeeds even when the
//! manifest has been edited or lost since provisioning. Unlike provisioning,
//! teardown keeps going after a failed delete: everything that can come down
//! does, and the survivors stay in the registry for a retry.

use super::error::Result;
use super::eventlog::{self, RunEvent};
use super::provisioner::call_with_backoff;
use super::registry::Registry;
use super::resolver;
use super::types::{EntryState, RegistryEntry, RunPolicy, TeardownReport};
use crate::provider::{ProviderAdapter, ProviderFailure};
use std::path::Path;
use tracing::{debug, warn};

/// Configuration for a teardown run.
pub struct TeardownConfig<'a> {
    pub state_dir: &'a Path,
    pub policy: &'a RunPolicy,
    /// Report what would be deleted without touching anything.
    pub dry_run: bool,
}

/// Delete every registered resource, dependents before dependencies.
pub async fn teardown(
    cfg: &TeardownConfig<'_>,
    adapter: &dyn ProviderAdapter,
    registry: &mut Registry,
) -> Result<TeardownReport> {
    let order = deletion_order(registry)?;

    if cfg.dry_run {
        let deleted = order
            .iter()
            .filter(|n| {
                registry
                    .lookup(n)
                    .is_some_and(|e| e.provider_id.is_some())
            })
            .count() as u32;
        return Ok(TeardownReport {
            deleted,
            ..Default::default()
        });
    }

    let run_id = eventlog::generate_run_id();
    log_event(cfg.state_dir, RunEvent::TeardownStarted { run_id: run_id.clone() });

    let mut report = TeardownReport::default();

    for logical_name in &order {
        let entry = match registry.lookup(logical_name) {
            Some(e) => e.clone(),
            None => continue,
        };

        if entry.state == EntryState::Deleted {
            // Tombstone from an interrupted run; nothing left to do.
            registry.remove(logical_name)?;
            report.skipped += 1;
            continue;
        }

        let Some(provider_id) = entry.provider_id.clone() else {
            // Requested/Failed before the provider ever assigned an id;
            // nothing exists to delete.
            debug!(%logical_name, "no provider id, dropping entry");
            registry.remove(logical_name)?;
            report.skipped += 1;
            continue;
        };

        registry.record(with_state(&entry, EntryState::DeletionRequested, None))?;

        let deleted = call_with_backoff(cfg.policy, "delete", || {
            adapter.delete(entry.kind, &provider_id)
        })
        .await;

        match deleted {
            Ok(_) | Err(ProviderFailure::NotFound) => {
                // NotFound means someone beat us to it; the goal state holds.
                registry.remove(logical_name)?;
                report.deleted += 1;
                log_event(
                    cfg.state_dir,
                    RunEvent::ResourceDeleted {
                        logical_name: logical_name.clone(),
                        provider_id,
                    },
                );
            }
            Err(failure) => {
                let error = failure.to_string();
                warn!(%logical_name, %error, "delete failed, continuing");
                registry.record(with_state(&entry, EntryState::Failed, Some(error.clone())))?;
                report.failed.push((logical_name.clone(), error.clone()));
                log_event(
                    cfg.state_dir,
                    RunEvent::ResourceDeleteFailed {
                        logical_name: logical_name.clone(),
                        error,
                    },
                );
            }
        }
    }

    log_event(
        cfg.state_dir,
        RunEvent::TeardownCompleted {
            run_id,
            deleted: report.deleted,
            skipped: report.skipped,
            failed: report.failed.len() as u32,
        },
    );

    Ok(report)
}

/// Reverse-topological order over the registry's own dependency edges.
/// Edges to entries no longer present are dropped so a partially torn-down
/// registry still orders cleanly.
fn deletion_order(registry: &Registry) -> Result<Vec<String>> {
    let nodes: Vec<(String, Vec<String>)> = registry
        .all()
        .map(|entry| {
            let deps = entry
                .depends_on
                .iter()
                .filter(|dep| registry.lookup(dep).is_some())
                .cloned()
                .collect();
            (entry.logical_name.clone(), deps)
        })
        .collect();

    let mut order = resolver::topo_sort(&nodes)?;
    order.reverse();
    Ok(order)
}

fn with_state(entry: &RegistryEntry, state: EntryState, last_error: Option<String>) -> RegistryEntry {
    let mut updated = entry.clone();
    updated.state = state;
    updated.last_error = last_error;
    updated
}

fn log_event(state_dir: &Path, event: RunEvent) {
    if let Err(e) = eventlog::append_event(state_dir, event) {
        warn!(error = %e, "cannot append audit event");
    }
}
