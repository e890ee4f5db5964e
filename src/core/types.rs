//! Manifest schema and registry record types.
//!
//! The manifest (armar.yaml) declares the desired set of cloud resources with
//! their dependencies. The registry records what was actually created. All
//! types derive Serialize/Deserialize for YAML/JSON roundtripping.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Top-level armar.yaml
// ============================================================================

/// Root manifest — the desired set of cloud resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Human-readable batch name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Global parameters (templatable via {{params.key}})
    #[serde(default)]
    pub params: HashMap<String, serde_yaml_ng::Value>,

    /// Resource declarations keyed by logical name (order-preserving)
    pub resources: IndexMap<String, ResourceSpec>,

    /// Retry/timeout policy for provider calls
    #[serde(default)]
    pub policy: RunPolicy,
}

// ============================================================================
// Resources
// ============================================================================

/// A single declared cloud resource.
///
/// The logical name (the manifest map key) identifies the resource within
/// this tool; `name` is the natural identifier the cloud provider sees
/// (bucket name, role name, ...) and feeds the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Resource kind
    pub kind: ResourceKind,

    /// Natural/physical name (e.g. bucket name, role name)
    pub name: String,

    /// Provider-specific creation arguments, opaque to the core.
    /// String values may reference {{params.key}} or {{ref.logical_name}}.
    #[serde(default)]
    pub parameters: IndexMap<String, serde_yaml_ng::Value>,

    /// Logical names that must be created first
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ResourceSpec {
    /// Natural key used to detect pre-existing resources: kind + physical name.
    pub fn idempotency_key(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

/// Resource kind enum. Link steps between two resources (e.g. attaching an
/// internet gateway to a VPC) are modeled as an `Attachment` depending on
/// both ends, so the dependency graph stays acyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Role,
    InstanceProfile,
    Policy,
    SecurityGroup,
    Vpc,
    Subnet,
    InternetGateway,
    RouteTable,
    Attachment,
    Table,
    Bucket,
    Queue,
    Function,
    LoadBalancer,
    AutoScalingGroup,
    LaunchConfig,
    TargetGroup,
}

impl ResourceKind {
    /// Short prefix used when minting provider ids in the reference adapter.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::InstanceProfile => "profile",
            Self::Policy => "policy",
            Self::SecurityGroup => "sg",
            Self::Vpc => "vpc",
            Self::Subnet => "subnet",
            Self::InternetGateway => "igw",
            Self::RouteTable => "rtb",
            Self::Attachment => "attach",
            Self::Table => "table",
            Self::Bucket => "bucket",
            Self::Queue => "queue",
            Self::Function => "fn",
            Self::LoadBalancer => "elb",
            Self::AutoScalingGroup => "asg",
            Self::LaunchConfig => "lc",
            Self::TargetGroup => "tg",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Role => "role",
            Self::InstanceProfile => "instance_profile",
            Self::Policy => "policy",
            Self::SecurityGroup => "security_group",
            Self::Vpc => "vpc",
            Self::Subnet => "subnet",
            Self::InternetGateway => "internet_gateway",
            Self::RouteTable => "route_table",
            Self::Attachment => "attachment",
            Self::Table => "table",
            Self::Bucket => "bucket",
            Self::Queue => "queue",
            Self::Function => "function",
            Self::LoadBalancer => "load_balancer",
            Self::AutoScalingGroup => "auto_scaling_group",
            Self::LaunchConfig => "launch_config",
            Self::TargetGroup => "target_group",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Retry and timeout policy for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPolicy {
    /// Bounded attempt count for retryable failures
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds (doubles per attempt)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Per-call timeout in seconds
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            op_timeout_secs: default_op_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_op_timeout_secs() -> u64 {
    30
}

// ============================================================================
// Registry records
// ============================================================================

/// Lifecycle state of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Requested,
    Created,
    DeletionRequested,
    Deleted,
    Failed,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "REQUESTED"),
            Self::Created => write!(f, "CREATED"),
            Self::DeletionRequested => write!(f, "DELETION-REQUESTED"),
            Self::Deleted => write!(f, "DELETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One ledger record: a logical resource and what the provider said about it.
///
/// `depends_on` is persisted so teardown can recover the dependency graph
/// without the original manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Logical name (registry key)
    pub logical_name: String,

    /// Resource kind
    pub kind: ResourceKind,

    /// Natural/physical name
    pub name: String,

    /// Cloud-assigned identifier, once known
    #[serde(default)]
    pub provider_id: Option<String>,

    /// Lifecycle state
    pub state: EntryState,

    /// Dependency edges, copied from the manifest at record time
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// RFC 3339 timestamp of first record
    pub created_at: String,

    /// Human-readable message from the last failure, if any
    #[serde(default)]
    pub last_error: Option<String>,
}

impl RegistryEntry {
    /// Natural key: kind + physical name.
    pub fn idempotency_key(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

// ============================================================================
// Batch reports
// ============================================================================

/// Result of a provisioning run.
#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    pub created: u32,
    pub skipped_existing: u32,
    pub failed: u32,
    /// First fatal error, if the batch aborted
    pub first_error: Option<String>,
}

/// Result of a teardown run.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    pub deleted: u32,
    pub skipped: u32,
    /// Every deletion that failed: (logical name, error message)
    pub failed: Vec<(String, String)>,
}

// ============================================================================
// Tests
// ============================================================================
