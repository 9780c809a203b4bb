//! Per-node replica estimation
//!
//! The bound uses requests only: the scheduler admits pods on requests,
//! limits only matter at runtime. Division is floor division, so a replica
//! that only partially fits does not count.

use crate::error::EstimateError;
use crate::models::{
    LimitingFactor, NodeCapacitySnapshot, NodeEstimate, NodeUsage, UsagePercentages,
};
use crate::quantity::{try_parse_cpu, try_parse_memory};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Resource specification of the pod to be replicated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPod {
    pub cpu_request_millicores: u64,
    pub cpu_limit_millicores: u64,
    pub memory_request_bytes: i64,
    pub memory_limit_bytes: i64,
}

impl TargetPod {
    /// Build a target from normalized values. Requests must be non-zero.
    pub fn new(
        cpu_request_millicores: u64,
        cpu_limit_millicores: u64,
        memory_request_bytes: i64,
        memory_limit_bytes: i64,
    ) -> Result<Self, EstimateError> {
        if cpu_request_millicores == 0 {
            return Err(EstimateError::ZeroRequest { resource: "cpu" });
        }
        if memory_request_bytes <= 0 {
            return Err(EstimateError::ZeroRequest { resource: "memory" });
        }
        if cpu_limit_millicores < cpu_request_millicores {
            warn!(
                cpu_request_millicores,
                cpu_limit_millicores, "CPU limit is below the CPU request"
            );
        }
        if memory_limit_bytes < memory_request_bytes {
            warn!(
                memory_request_bytes,
                memory_limit_bytes, "Memory limit is below the memory request"
            );
        }

        Ok(Self {
            cpu_request_millicores,
            cpu_limit_millicores,
            memory_request_bytes,
            memory_limit_bytes,
        })
    }

    /// Build a target from user-entered quantity strings
    pub fn parse(
        cpu_request: &str,
        cpu_limit: &str,
        memory_request: &str,
        memory_limit: &str,
    ) -> Result<Self, EstimateError> {
        let invalid = |field: &'static str| {
            move |source| EstimateError::InvalidTarget { field, source }
        };
        Self::new(
            try_parse_cpu(cpu_request).map_err(invalid("cpu request"))?,
            try_parse_cpu(cpu_limit).map_err(invalid("cpu limit"))?,
            try_parse_memory(memory_request).map_err(invalid("memory request"))?,
            try_parse_memory(memory_limit).map_err(invalid("memory limit"))?,
        )
    }
}

/// How many `amount`-sized replicas fit in `free`; zero when nothing is free
fn bound(free: i64, amount: u64) -> u64 {
    if free <= 0 {
        return 0;
    }
    if amount == 0 {
        return u64::MAX;
    }
    free as u64 / amount
}

/// Maximum additional replicas of `target` on one node, never negative.
///
/// The result is `min(cpu_bound, memory_bound)` further clamped to the pod
/// headroom `allocatable_pods - usage.pod_count`.
pub fn estimate_node(
    node: &NodeCapacitySnapshot,
    usage: &NodeUsage,
    target: &TargetPod,
) -> NodeEstimate {
    let totals = &usage.totals;
    let free_cpu = i64::try_from(node.allocatable_cpu_millicores)
        .unwrap_or(i64::MAX)
        .saturating_sub(i64::try_from(totals.cpu_request_millicores).unwrap_or(i64::MAX));
    let free_memory = node
        .allocatable_memory_bytes
        .saturating_sub(totals.memory_request_bytes);

    let cpu_bound = bound(free_cpu, target.cpu_request_millicores);
    let memory_bound = bound(
        free_memory,
        u64::try_from(target.memory_request_bytes).unwrap_or(0),
    );
    let pod_headroom =
        u64::from(node.allocatable_pods).saturating_sub(u64::from(usage.pod_count));

    let (mut replicas, mut limited_by) = if cpu_bound <= memory_bound {
        (cpu_bound, LimitingFactor::Cpu)
    } else {
        (memory_bound, LimitingFactor::Memory)
    };
    if replicas > pod_headroom {
        replicas = pod_headroom;
        limited_by = LimitingFactor::Pods;
    }

    NodeEstimate {
        node: node.clone(),
        usage: usage.clone(),
        percentages: UsagePercentages::compute(node, totals),
        free_cpu_millicores: free_cpu,
        free_memory_bytes: free_memory,
        cpu_bound,
        memory_bound,
        pod_headroom,
        replicas,
        limited_by,
    }
}
