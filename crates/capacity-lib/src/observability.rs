//! Structured run events
//!
//! Every significant step of an estimation run is logged as a `tracing`
//! event with an `event` field and key/value context, so the same run can
//! be read as text or as JSON lines.

use crate::cluster::ClusterError;
use crate::estimator::TargetPod;
use crate::models::{ExcludedNode, NodeEstimate, PodRef};
use tracing::{debug, info, warn};

/// Structured logger for one estimation run
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
}

impl Default for RunLogger {
    fn default() -> Self {
        Self::new(chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string())
    }
}

impl RunLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Log the start of a run
    pub fn log_run_started(&self, target: &TargetPod, requested_replicas: u64) {
        info!(
            event = "run_started",
            run_id = %self.run_id,
            cpu_request_millicores = target.cpu_request_millicores,
            cpu_limit_millicores = target.cpu_limit_millicores,
            memory_request_bytes = target.memory_request_bytes,
            memory_limit_bytes = target.memory_limit_bytes,
            requested_replicas,
            "Estimating cluster capacity"
        );
    }

    /// Log the node listing result
    pub fn log_nodes_listed(&self, total: usize, healthy: usize) {
        info!(
            event = "nodes_listed",
            run_id = %self.run_id,
            total,
            healthy,
            "Listed cluster nodes"
        );
    }

    /// Log a node left out of the usable set
    pub fn log_node_excluded(&self, excluded: &ExcludedNode) {
        warn!(
            event = "node_excluded",
            run_id = %self.run_id,
            node = %excluded.name,
            reason = %excluded.reason,
            "Skipping node"
        );
    }

    /// Log a pod that was listed but could not be counted
    pub fn log_pod_skipped(&self, node: &str, pod: &PodRef, error: &ClusterError) {
        warn!(
            event = "pod_skipped",
            run_id = %self.run_id,
            node = %node,
            namespace = %pod.namespace,
            pod = %pod.name,
            not_found = error.is_not_found(),
            error = %error,
            "Skipping pod"
        );
    }

    /// Log the per-node result
    pub fn log_node_estimated(&self, estimate: &NodeEstimate) {
        debug!(
            event = "node_estimated",
            run_id = %self.run_id,
            node = %estimate.node.name,
            pods = estimate.usage.pod_count,
            cpu_request_millicores = estimate.usage.totals.cpu_request_millicores,
            cpu_limit_millicores = estimate.usage.totals.cpu_limit_millicores,
            memory_request_bytes = estimate.usage.totals.memory_request_bytes,
            memory_limit_bytes = estimate.usage.totals.memory_limit_bytes,
            allocatable_cpu_millicores = estimate.node.allocatable_cpu_millicores,
            allocatable_memory_bytes = estimate.node.allocatable_memory_bytes,
            cpu_bound = estimate.cpu_bound,
            memory_bound = estimate.memory_bound,
            pod_headroom = estimate.pod_headroom,
            replicas = estimate.replicas,
            limited_by = %estimate.limited_by,
            "Estimated node capacity"
        );
    }

    /// Log the cluster-wide outcome
    pub fn log_run_completed(&self, total_replicas: u64, requested_replicas: u64) {
        let schedulable = total_replicas >= requested_replicas;
        if schedulable {
            info!(
                event = "run_completed",
                run_id = %self.run_id,
                total_replicas,
                requested_replicas,
                schedulable,
                "Cluster can schedule the requested replicas"
            );
        } else {
            warn!(
                event = "run_completed",
                run_id = %self.run_id,
                total_replicas,
                requested_replicas,
                schedulable,
                "Cluster cannot schedule the requested replicas"
            );
        }
    }
}
