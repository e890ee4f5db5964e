//! Manifest parsing and structural validation.
//!
//! Validation runs before any provider call:
//! - version must be "1.0", names must be non-empty
//! - depends_on references must exist and not self-reference
//! - idempotency keys (kind + physical name) must be unique
//! - {{ref.X}} templates must point at declared dependencies

use super::error::{Error, Result};
use super::types::Manifest;
use std::collections::HashMap;
use std::path::Path;

/// Validation error, one structural problem per entry.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse an armar.yaml file from disk.
pub fn parse_manifest_file(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Manifest(format!("failed to read {}: {}", path.display(), e)))?;
    parse_manifest(&content)
}

/// Parse an armar.yaml from a string.
pub fn parse_manifest(yaml: &str) -> Result<Manifest> {
    serde_yaml_ng::from_str(yaml).map_err(|e| Error::Manifest(format!("YAML parse error: {}", e)))
}

/// Validate a parsed manifest. Returns a list of errors (empty = valid).
pub fn validate_manifest(manifest: &Manifest) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    if manifest.version != "1.0" {
        push(format!(
            "version must be \"1.0\", got \"{}\"",
            manifest.version
        ));
    }
    if manifest.name.is_empty() {
        push("name must not be empty".to_string());
    }

    let mut seen_keys: HashMap<String, &str> = HashMap::new();

    for (id, spec) in &manifest.resources {
        if spec.name.is_empty() {
            push(format!("resource '{}' has an empty name", id));
        }

        // Idempotency keys must be unique, or two logical resources would
        // resolve to the same cloud resource.
        let key = spec.idempotency_key();
        if let Some(first) = seen_keys.insert(key.clone(), id) {
            push(format!(
                "resources '{}' and '{}' share idempotency key '{}'",
                first, id, key
            ));
        }

        for dep in &spec.depends_on {
            if !manifest.resources.contains_key(dep) {
                push(format!(
                    "resource '{}' depends on unknown resource '{}'",
                    id, dep
                ));
            }
            if dep == id {
                push(format!("resource '{}' depends on itself", id));
            }
        }

        // Every {{ref.X}} must name a declared dependency, so the
        // provisioner is guaranteed to have X's provider id when it
        // resolves this resource's parameters.
        for value in spec.parameters.values() {
            for referenced in collect_refs(value) {
                if !spec.depends_on.iter().any(|d| *d == referenced) {
                    push(format!(
                        "resource '{}' references '{{{{ref.{}}}}}' but does not depend on '{}'",
                        id, referenced, referenced
                    ));
                }
            }
        }
    }

    errors
}

/// Collect logical names referenced as `{{ref.X}}` anywhere in a value.
fn collect_refs(value: &serde_yaml_ng::Value) -> Vec<String> {
    use serde_yaml_ng::Value;
    match value {
        Value::String(s) => refs_in_str(s),
        Value::Sequence(items) => items.iter().flat_map(collect_refs).collect(),
        Value::Mapping(map) => map.values().flat_map(collect_refs).collect(),
        _ => Vec::new(),
    }
}

fn refs_in_str(s: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = s;
    while let Some(open) = rest.find("{{") {
        rest = &rest[open + 2..];
        let Some(close) = rest.find("}}") else { break };
        let var = rest[..close].trim();
        if let Some(logical) = var.strip_prefix("ref.") {
            found.push(logical.to_string());
        }
        rest = &rest[close + 2..];
    }
    found
}
