//! Core data models for the capacity estimator

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource keys used in allocatable and container resource maps
pub mod resources {
    pub const CPU: &str = "cpu";
    pub const MEMORY: &str = "memory";
    pub const PODS: &str = "pods";
}

/// A node as returned by the cluster's node listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Raw allocatable quantities keyed by resource name
    pub allocatable: BTreeMap<String, String>,
    pub conditions: Vec<NodeCondition>,
}

/// A single node health signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

impl NodeCondition {
    pub fn new(condition_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: status.into(),
        }
    }
}

/// Identifies a pod scheduled on a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

impl PodRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Declared resources of one container, as raw quantity strings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerResources {
    pub name: String,
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

/// Full resource detail of a pod
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodResources {
    pub containers: Vec<ContainerResources>,
}

/// Allocatable capacity of a healthy node, normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapacitySnapshot {
    pub name: String,
    pub allocatable_cpu_millicores: u64,
    pub allocatable_memory_bytes: i64,
    /// Platform pod ceiling, independent of resources
    pub allocatable_pods: u32,
}

/// Summed requests and limits of one pod or of all pods on a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodResourceUsage {
    pub cpu_request_millicores: u64,
    pub cpu_limit_millicores: u64,
    pub memory_request_bytes: i64,
    pub memory_limit_bytes: i64,
}

impl std::ops::Add for PodResourceUsage {
    type Output = PodResourceUsage;

    fn add(self, rhs: PodResourceUsage) -> PodResourceUsage {
        PodResourceUsage {
            cpu_request_millicores: self
                .cpu_request_millicores
                .saturating_add(rhs.cpu_request_millicores),
            cpu_limit_millicores: self
                .cpu_limit_millicores
                .saturating_add(rhs.cpu_limit_millicores),
            memory_request_bytes: self
                .memory_request_bytes
                .saturating_add(rhs.memory_request_bytes),
            memory_limit_bytes: self
                .memory_limit_bytes
                .saturating_add(rhs.memory_limit_bytes),
        }
    }
}

impl std::ops::AddAssign for PodResourceUsage {
    fn add_assign(&mut self, rhs: PodResourceUsage) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for PodResourceUsage {
    fn sum<I: Iterator<Item = PodResourceUsage>>(iter: I) -> Self {
        iter.fold(PodResourceUsage::default(), |acc, usage| acc + usage)
    }
}

/// A pod that was listed on a node but not counted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedPod {
    pub pod: PodRef,
    pub reason: String,
}

/// Consumption on one healthy node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUsage {
    pub totals: PodResourceUsage,
    /// Active pods listed on the node, including any later skipped
    pub pod_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedPod>,
}

/// Share of allocatable capacity already claimed on a node, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsagePercentages {
    pub cpu_request: f64,
    pub cpu_limit: f64,
    pub memory_request: f64,
    pub memory_limit: f64,
}

impl UsagePercentages {
    pub fn compute(node: &NodeCapacitySnapshot, usage: &PodResourceUsage) -> Self {
        let cpu = node.allocatable_cpu_millicores as f64;
        let memory = node.allocatable_memory_bytes as f64;
        Self {
            cpu_request: percent(usage.cpu_request_millicores as f64, cpu),
            cpu_limit: percent(usage.cpu_limit_millicores as f64, cpu),
            memory_request: percent(usage.memory_request_bytes as f64, memory),
            memory_limit: percent(usage.memory_limit_bytes as f64, memory),
        }
    }
}

fn percent(used: f64, allocatable: f64) -> f64 {
    if allocatable <= 0.0 {
        0.0
    } else {
        used * 100.0 / allocatable
    }
}

/// Which constraint produced a node's estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitingFactor {
    Cpu,
    Memory,
    Pods,
}

impl std::fmt::Display for LimitingFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitingFactor::Cpu => write!(f, "cpu"),
            LimitingFactor::Memory => write!(f, "memory"),
            LimitingFactor::Pods => write!(f, "pods"),
        }
    }
}

/// Additional replicas that fit on one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEstimate {
    pub node: NodeCapacitySnapshot,
    pub usage: NodeUsage,
    pub percentages: UsagePercentages,
    pub free_cpu_millicores: i64,
    pub free_memory_bytes: i64,
    pub cpu_bound: u64,
    pub memory_bound: u64,
    pub pod_headroom: u64,
    pub replicas: u64,
    pub limited_by: LimitingFactor,
}

/// Why a node was left out of the usable set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Did not match the role filter
    Role,
    /// A monitored condition reported a problem
    Unhealthy { condition: String, status: String },
    /// The required readiness condition is missing
    MissingReady,
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionReason::Role => write!(f, "does not match role filter"),
            ExclusionReason::Unhealthy { condition, status } => {
                write!(f, "{}={}", condition, status)
            }
            ExclusionReason::MissingReady => write!(f, "no Ready condition reported"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedNode {
    pub name: String,
    #[serde(flatten)]
    pub reason: ExclusionReason,
}
