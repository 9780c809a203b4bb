//! Node health classification
//!
//! Decides which nodes are usable for new replicas and normalizes their
//! allocatable resources. A node is either fully usable or excluded;
//! partial degradation is not modeled.

use crate::models::{
    resources, ExcludedNode, ExclusionReason, NodeCapacitySnapshot, NodeCondition, NodeRecord,
};
use crate::quantity::{parse_cpu, parse_memory, parse_pod_count};
use crate::settings::{EstimatorSettings, HealthPolicy, READY_CONDITION};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Health verdict for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeHealth {
    Healthy,
    Unhealthy(ExclusionReason),
}

impl NodeHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, NodeHealth::Healthy)
    }
}

/// Healthy snapshots plus the nodes that were left out
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthFilterOutcome {
    pub healthy: Vec<NodeCapacitySnapshot>,
    pub excluded: Vec<ExcludedNode>,
}

/// Classify a node from its condition list.
///
/// Pressure conditions report "True" while the problem is present, so
/// anything other than "False" is unhealthy. `Ready` is the inverse and
/// must report "True".
pub fn classify(conditions: &[NodeCondition], policy: &HealthPolicy) -> NodeHealth {
    for condition in conditions {
        let monitored_pressure = policy
            .pressure_conditions
            .iter()
            .any(|c| c == &condition.condition_type);

        let healthy = if monitored_pressure {
            condition.status == "False"
        } else if policy.require_ready && condition.condition_type == READY_CONDITION {
            condition.status == "True"
        } else {
            true
        };

        if !healthy {
            return NodeHealth::Unhealthy(ExclusionReason::Unhealthy {
                condition: condition.condition_type.clone(),
                status: condition.status.clone(),
            });
        }
    }

    if policy.require_ready
        && !conditions
            .iter()
            .any(|c| c.condition_type == READY_CONDITION)
    {
        return NodeHealth::Unhealthy(ExclusionReason::MissingReady);
    }

    NodeHealth::Healthy
}

/// Normalize a node's allocatable resources
pub fn snapshot(node: &NodeRecord) -> NodeCapacitySnapshot {
    NodeCapacitySnapshot {
        name: node.name.clone(),
        allocatable_cpu_millicores: allocatable(node, resources::CPU)
            .map(parse_cpu)
            .unwrap_or(0),
        allocatable_memory_bytes: allocatable(node, resources::MEMORY)
            .map(parse_memory)
            .unwrap_or(0),
        allocatable_pods: allocatable(node, resources::PODS)
            .map(parse_pod_count)
            .unwrap_or(0),
    }
}

fn allocatable<'a>(node: &'a NodeRecord, resource: &str) -> Option<&'a str> {
    let value = node.allocatable.get(resource).map(String::as_str);
    if value.is_none() {
        debug!(node = %node.name, resource, "Node reports no allocatable value");
    }
    value
}

/// Split the node list into usable snapshots and excluded nodes
pub fn filter_healthy(nodes: &[NodeRecord], settings: &EstimatorSettings) -> HealthFilterOutcome {
    let mut outcome = HealthFilterOutcome::default();

    for node in nodes {
        if !settings.role_filter.matches(&node.labels) {
            outcome.excluded.push(ExcludedNode {
                name: node.name.clone(),
                reason: ExclusionReason::Role,
            });
            continue;
        }

        match classify(&node.conditions, &settings.health) {
            NodeHealth::Healthy => outcome.healthy.push(snapshot(node)),
            NodeHealth::Unhealthy(reason) => outcome.excluded.push(ExcludedNode {
                name: node.name.clone(),
                reason,
            }),
        }
    }

    outcome
}
