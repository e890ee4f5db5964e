//! Append-only JSONL audit log for provisioning and teardown runs.
//!
//! Lives next to the registry so an operator inspecting a partial failure
//! sees both the ledger and the sequence of events that produced it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Audit event, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    ProvisionStarted {
        run_id: String,
        manifest: String,
    },
    ResourceCreated {
        logical_name: String,
        provider_id: String,
        attempts: u32,
    },
    ResourceAdopted {
        logical_name: String,
        provider_id: String,
    },
    ResourceFailed {
        logical_name: String,
        error: String,
    },
    ProvisionCompleted {
        run_id: String,
        created: u32,
        skipped_existing: u32,
        failed: u32,
    },
    TeardownStarted {
        run_id: String,
    },
    ResourceDeleted {
        logical_name: String,
        provider_id: String,
    },
    ResourceDeleteFailed {
        logical_name: String,
        error: String,
    },
    TeardownCompleted {
        run_id: String,
        deleted: u32,
        skipped: u32,
        failed: u32,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// RFC 3339 timestamp in UTC.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Generate a run id.
pub fn generate_run_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u128;
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Derive the event log path within a state directory.
pub fn event_log_path(state_dir: &Path) -> PathBuf {
    state_dir.join("events.jsonl")
}

/// Append an event to the state directory's event log.
pub fn append_event(state_dir: &Path, event: RunEvent) -> Result<(), String> {
    let path = event_log_path(state_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("cannot create state dir: {}", e))?;
    }

    let te = TimestampedEvent {
        ts: now_rfc3339(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;
    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_rfc3339() {
        let ts = now_rfc3339();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }

    #[test]
    fn test_generate_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("r-"));
        assert!(id.len() > 4);
    }

    #[test]
    fn test_event_log_path() {
        let p = event_log_path(Path::new("/state"));
        assert_eq!(p, PathBuf::from("/state/events.jsonl"));
    }

    #[test]
    fn test_append_event() {
        let dir = tempfile::tempdir().unwrap();
        append_event(
            dir.path(),
            RunEvent::ProvisionStarted {
                run_id: "r-abc".to_string(),
                manifest: "web-stack".to_string(),
            },
        )
        .unwrap();

        let content = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert!(content.contains("\"event\":\"provision_started\""));
        assert!(content.contains("r-abc"));
    }

    #[test]
    fn test_append_multiple_lines() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            append_event(
                dir.path(),
                RunEvent::ResourceCreated {
                    logical_name: format!("r{}", i),
                    provider_id: format!("vpc-{:08x}", i),
                    attempts: 1,
                },
            )
            .unwrap();
        }
        let content = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 3);
        // Every line parses on its own
        for line in content.lines() {
            let _: TimestampedEvent = serde_json::from_str(line).unwrap();
        }
    }
}
