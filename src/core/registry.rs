//! Persisted resource registry — the single source of truth for what exists.
//!
//! Entries live in a single JSON file that is rewritten atomically (temp file
//! + rename) on every record/remove, so a crash mid-write never corrupts
//! prior state. Insertion order is preserved for audit output and as the
//! teardown ordering fallback. An index over idempotency keys backs
//! `lookup_by_idempotency_key` without scanning.

use super::error::{Error, Result};
use super::types::{RegistryEntry, ResourceKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const SCHEMA_VERSION: &str = "1.0";

/// On-disk layout: an ordered sequence of entries.
#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    schema: String,
    resources: Vec<RegistryEntry>,
}

/// Durable ledger of created resources, keyed by logical name.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    entries: IndexMap<String, RegistryEntry>,
    /// idempotency key -> logical name
    by_key: HashMap<String, String>,
}

impl Registry {
    /// Default file name within a state directory.
    pub fn file_path(state_dir: &Path) -> PathBuf {
        state_dir.join("registry.json")
    }

    /// Open a registry file, starting empty if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let mut registry = Self {
            path: path.to_path_buf(),
            entries: IndexMap::new(),
            by_key: HashMap::new(),
        };
        if !path.exists() {
            return Ok(registry);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Registry(format!("cannot read {}: {}", path.display(), e)))?;
        let file: RegistryFile = serde_json::from_str(&content)
            .map_err(|e| Error::Registry(format!("invalid registry {}: {}", path.display(), e)))?;

        for entry in file.resources {
            registry
                .by_key
                .insert(entry.idempotency_key(), entry.logical_name.clone());
            registry.entries.insert(entry.logical_name.clone(), entry);
        }
        Ok(registry)
    }

    pub fn lookup(&self, logical_name: &str) -> Option<&RegistryEntry> {
        self.entries.get(logical_name)
    }

    /// Find an entry by its natural key (kind + physical name), regardless of
    /// the logical name it was recorded under.
    pub fn lookup_by_idempotency_key(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Option<&RegistryEntry> {
        let key = format!("{}/{}", kind, name);
        self.by_key
            .get(&key)
            .and_then(|logical| self.entries.get(logical))
    }

    /// Upsert an entry and flush to disk. The in-memory update and the
    /// write-out form one critical section under `&mut self`.
    pub fn record(&mut self, entry: RegistryEntry) -> Result<()> {
        if let Some(previous) = self.entries.get(&entry.logical_name) {
            if previous.idempotency_key() != entry.idempotency_key() {
                self.by_key.remove(&previous.idempotency_key());
            }
        }
        self.by_key
            .insert(entry.idempotency_key(), entry.logical_name.clone());
        self.entries.insert(entry.logical_name.clone(), entry);
        self.flush()
    }

    /// Remove an entry. Called only after confirmed deletion.
    pub fn remove(&mut self, logical_name: &str) -> Result<()> {
        // shift_remove keeps the insertion order of the survivors
        if let Some(entry) = self.entries.shift_remove(logical_name) {
            self.by_key.remove(&entry.idempotency_key());
            self.flush()?;
        }
        Ok(())
    }

    /// All entries in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomic write-replace: serialize to a temp file, then rename over the
    /// registry so the file is always valid JSON.
    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Registry(format!("cannot create dir {}: {}", parent.display(), e))
            })?;
        }

        let file = RegistryFile {
            schema: SCHEMA_VERSION.to_string(),
            resources: self.entries.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::Registry(format!("serialize error: {}", e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)
            .map_err(|e| Error::Registry(format!("cannot write {}: {}", tmp_path.display(), e)))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            Error::Registry(format!(
                "cannot rename {} -> {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}
