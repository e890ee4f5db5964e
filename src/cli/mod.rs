//! CLI subcommands — init, validate, provision, teardown, status.

use crate::core::error::{Error, Result};
use crate::core::registry::Registry;
use crate::core::types::{EntryState, Manifest};
use crate::core::{parser, provisioner, resolver, teardown};
use crate::provider::memory::MemoryProvider;
use crate::provider::ProviderAdapter;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new armar project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate armar.yaml without connecting to a provider
    Validate {
        /// Path to armar.yaml
        #[arg(short, long, default_value = "armar.yaml")]
        file: PathBuf,
    },

    /// Create every declared resource, in dependency order
    Provision {
        /// Path to armar.yaml
        #[arg(short, long, default_value = "armar.yaml")]
        file: PathBuf,

        /// Show what would be created without calling the provider
        #[arg(long)]
        dry_run: bool,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Delete every registered resource, in reverse dependency order
    Teardown {
        /// Path to armar.yaml (read for the retry policy only)
        #[arg(short, long, default_value = "armar.yaml")]
        file: PathBuf,

        /// Show what would be deleted without calling the provider
        #[arg(long)]
        dry_run: bool,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Show registered resources and their states
    Status {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },
}

/// Dispatch a CLI command. The adapter backs provider calls for the
/// commands that make them.
pub async fn dispatch(cmd: Commands, adapter: &dyn ProviderAdapter) -> Result<()> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Provision {
            file,
            dry_run,
            state_dir,
        } => cmd_provision(&file, &state_dir, adapter, dry_run).await,
        Commands::Teardown {
            file,
            dry_run,
            state_dir,
        } => cmd_teardown(&file, &state_dir, adapter, dry_run).await,
        Commands::Status { state_dir } => cmd_status(&state_dir),
    }
}

/// Reference adapter for local runs.
pub fn default_adapter() -> MemoryProvider {
    MemoryProvider::new()
}

fn cmd_init(path: &Path) -> Result<()> {
    let manifest_path = path.join("armar.yaml");
    if manifest_path.exists() {
        return Err(Error::Manifest(format!(
            "{} already exists",
            manifest_path.display()
        )));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir)
        .map_err(|e| Error::Manifest(format!("cannot create state dir: {}", e)))?;

    let template = r#"version: "1.0"
name: my-infrastructure
description: "Managed by armar"

params: {}

resources: {}

policy:
  max_attempts: 5
  base_delay_ms: 200
  op_timeout_secs: 30
"#;
    std::fs::write(&manifest_path, template)
        .map_err(|e| Error::Manifest(format!("cannot write {}: {}", manifest_path.display(), e)))?;

    println!("Initialized armar project at {}", path.display());
    println!("  Created: {}", manifest_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<()> {
    let manifest = parser::parse_manifest_file(file)?;
    let errors = parser::validate_manifest(&manifest);

    if errors.is_empty() {
        println!(
            "OK: {} ({} resources)",
            manifest.name,
            manifest.resources.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(Error::Manifest(format!(
            "{} validation error(s)",
            errors.len()
        )))
    }
}

/// Parse and validate a manifest file, printing errors if invalid.
fn parse_and_validate(file: &Path) -> Result<Manifest> {
    let manifest = parser::parse_manifest_file(file)?;
    let errors = parser::validate_manifest(&manifest);
    if errors.is_empty() {
        return Ok(manifest);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(Error::Manifest("validation failed".to_string()))
}

async fn cmd_provision(
    file: &Path,
    state_dir: &Path,
    adapter: &dyn ProviderAdapter,
    dry_run: bool,
) -> Result<()> {
    let manifest = parse_and_validate(file)?;
    let mut registry = Registry::open(&Registry::file_path(state_dir))?;

    let cfg = provisioner::ProvisionConfig {
        manifest: &manifest,
        state_dir,
        dry_run,
    };
    let report = provisioner::provision(&cfg, adapter, &mut registry).await?;

    if dry_run {
        let order = resolver::execution_order(&manifest)?;
        println!("Plan for {} ({} resources):", manifest.name, order.len());
        for logical_name in &order {
            let symbol = if registry
                .lookup(logical_name)
                .is_some_and(|e| e.state == EntryState::Created)
            {
                " "
            } else {
                "+"
            };
            println!("  {} {}", symbol, logical_name);
        }
        println!();
        println!(
            "Plan: {} to create, {} existing.",
            report.created, report.skipped_existing
        );
        println!("Dry run — no changes applied.");
        return Ok(());
    }

    println!();
    if report.failed > 0 {
        println!(
            "Provision completed with errors: {} created, {} existing, {} FAILED",
            report.created, report.skipped_existing, report.failed
        );
        if let Some(error) = &report.first_error {
            eprintln!("  ERROR: {}", error);
        }
        return Err(Error::BatchFailed(report.failed));
    }

    println!(
        "Provision complete: {} created, {} existing.",
        report.created, report.skipped_existing
    );
    Ok(())
}

async fn cmd_teardown(
    file: &Path,
    state_dir: &Path,
    adapter: &dyn ProviderAdapter,
    dry_run: bool,
) -> Result<()> {
    // The deletion order comes from the registry; the manifest only
    // contributes the retry policy, and may legitimately be absent.
    let policy = match parser::parse_manifest_file(file) {
        Ok(manifest) => manifest.policy,
        Err(_) => Default::default(),
    };

    let mut registry = Registry::open(&Registry::file_path(state_dir))?;
    if registry.is_empty() {
        println!("Nothing to tear down.");
        return Ok(());
    }

    let cfg = teardown::TeardownConfig {
        state_dir,
        policy: &policy,
        dry_run,
    };
    let report = teardown::teardown(&cfg, adapter, &mut registry).await?;

    if dry_run {
        println!("Plan: {} to delete.", report.deleted);
        println!("Dry run — no changes applied.");
        return Ok(());
    }

    println!();
    if !report.failed.is_empty() {
        println!(
            "Teardown completed with errors: {} deleted, {} skipped, {} FAILED",
            report.deleted,
            report.skipped,
            report.failed.len()
        );
        for (logical_name, error) in &report.failed {
            eprintln!("  ERROR: {}: {}", logical_name, error);
        }
        return Err(Error::BatchFailed(report.failed.len() as u32));
    }

    println!(
        "Teardown complete: {} deleted, {} skipped.",
        report.deleted, report.skipped
    );
    Ok(())
}

fn cmd_status(state_dir: &Path) -> Result<()> {
    let registry = Registry::open(&Registry::file_path(state_dir))?;

    if registry.is_empty() {
        println!("No resources registered. Run `armar provision` first.");
        return Ok(());
    }

    println!("Registered resources: {}", registry.len());
    for entry in registry.all() {
        let provider_id = entry.provider_id.as_deref().unwrap_or("-");
        println!(
            "  {}: {} [{}] {} ({})",
            entry.logical_name, entry.state, entry.kind, provider_id, entry.created_at
        );
        if let Some(error) = &entry.last_error {
            println!("    last error: {}", error);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_MANIFEST: &str = r#"
version: "1.0"
name: test
resources:
  v1:
    kind: vpc
    name: net-vpc
  s1:
    kind: subnet
    name: public-a
    parameters:
      vpc_id: "{{ref.v1}}"
    depends_on: [v1]
policy:
  base_delay_ms: 1
"#;

    fn write_manifest(dir: &Path) -> PathBuf {
        let file = dir.join("armar.yaml");
        std::fs::write(&file, SMALL_MANIFEST).unwrap();
        file
    }

    #[test]
    fn test_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("test-project");
        std::fs::create_dir_all(&sub).unwrap();
        cmd_init(&sub).unwrap();
        assert!(sub.join("armar.yaml").exists());
        assert!(sub.join("state").is_dir());
    }

    #[test]
    fn test_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("armar.yaml"), "exists").unwrap();
        let result = cmd_init(dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_init_template_validates() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        cmd_validate(&dir.path().join("armar.yaml")).unwrap();
    }

    #[test]
    fn test_validate_valid() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_manifest(dir.path());
        cmd_validate(&file).unwrap();
    }

    #[test]
    fn test_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("armar.yaml");
        std::fs::write(
            &file,
            r#"
version: "2.0"
name: ""
resources: {}
"#,
        )
        .unwrap();
        let result = cmd_validate(&file);
        assert!(result.is_err());
    }

    #[test]
    fn test_status_empty() {
        let dir = tempfile::tempdir().unwrap();
        cmd_status(dir.path()).unwrap();
    }

    #[tokio::test]
    async fn test_provision_then_status_then_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_manifest(dir.path());
        let state = dir.path().join("state");
        let adapter = MemoryProvider::new();

        cmd_provision(&file, &state, &adapter, false).await.unwrap();
        assert_eq!(adapter.resource_count(), 2);
        assert!(Registry::file_path(&state).exists());

        cmd_status(&state).unwrap();

        cmd_teardown(&file, &state, &adapter, false).await.unwrap();
        assert_eq!(adapter.resource_count(), 0);
    }

    #[tokio::test]
    async fn test_provision_dry_run_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_manifest(dir.path());
        let state = dir.path().join("state");
        let adapter = MemoryProvider::new();

        cmd_provision(&file, &state, &adapter, true).await.unwrap();
        assert_eq!(adapter.resource_count(), 0);
        assert!(!Registry::file_path(&state).exists());
    }

    #[tokio::test]
    async fn test_provision_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("armar.yaml");
        std::fs::write(
            &file,
            r#"
version: "1.0"
name: bad
resources:
  a:
    kind: bucket
    name: b
    depends_on: [missing]
"#,
        )
        .unwrap();
        let adapter = MemoryProvider::new();
        let result = cmd_provision(&file, &dir.path().join("state"), &adapter, false).await;
        assert!(result.is_err());
        assert_eq!(adapter.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_provision_failure_is_an_error() {
        use crate::core::types::ResourceKind;
        use crate::provider::ProviderFailure;

        let dir = tempfile::tempdir().unwrap();
        let file = write_manifest(dir.path());
        let state = dir.path().join("state");
        let adapter = MemoryProvider::new();
        adapter.fail_create(
            ResourceKind::Vpc,
            "net-vpc",
            ProviderFailure::PermissionDenied("denied".into()),
        );

        let result = cmd_provision(&file, &state, &adapter, false).await;
        assert!(matches!(result, Err(Error::BatchFailed(1))));
    }

    #[tokio::test]
    async fn test_teardown_without_manifest_uses_registry() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_manifest(dir.path());
        let state = dir.path().join("state");
        let adapter = MemoryProvider::new();

        cmd_provision(&file, &state, &adapter, false).await.unwrap();
        std::fs::remove_file(&file).unwrap();

        cmd_teardown(&file, &state, &adapter, false).await.unwrap();
        assert_eq!(adapter.resource_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_empty_state_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_manifest(dir.path());
        let adapter = MemoryProvider::new();
        cmd_teardown(&file, &dir.path().join("state"), &adapter, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_provision() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_manifest(dir.path());
        let adapter = MemoryProvider::new();
        dispatch(
            Commands::Provision {
                file,
                dry_run: false,
                state_dir: dir.path().join("state"),
            },
            &adapter,
        )
        .await
        .unwrap();
        assert_eq!(adapter.resource_count(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_validate() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_manifest(dir.path());
        let adapter = MemoryProvider::new();
        dispatch(Commands::Validate { file }, &adapter).await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_status() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = MemoryProvider::new();
        dispatch(
            Commands::Status {
                state_dir: dir.path().to_path_buf(),
            },
            &adapter,
        )
        .await
        .unwrap();
    }
}
