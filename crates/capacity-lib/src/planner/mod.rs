//! Cluster-wide capacity planning
//!
//! Drives the whole pipeline over one snapshot of the cluster: list nodes,
//! keep the healthy ones, aggregate each node's consumption, estimate each
//! node and sum the estimates.
//!
//! Node aggregation is independent and read-only, so up to
//! `settings.concurrency` nodes are queried at once. Results are always
//! collected in node-list order, so the total and the report do not depend
//! on completion order.

#[cfg(test)]
mod tests;

use crate::cluster::ClusterApi;
use crate::error::EstimateError;
use crate::estimator::{estimate_node, TargetPod};
use crate::health::filter_healthy;
use crate::models::{ExcludedNode, NodeEstimate, NodeUsage};
use crate::observability::RunLogger;
use crate::settings::EstimatorSettings;
use crate::usage::aggregate_usage;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of one estimation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEstimate {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub target: TargetPod,
    pub requested_replicas: u64,
    pub nodes: Vec<NodeEstimate>,
    pub excluded: Vec<ExcludedNode>,
    pub total_replicas: u64,
}

impl ClusterEstimate {
    pub fn can_schedule(&self) -> bool {
        can_schedule(self.total_replicas, self.requested_replicas)
    }

    /// Replicas still missing to reach the request
    pub fn shortfall(&self) -> u64 {
        self.requested_replicas.saturating_sub(self.total_replicas)
    }
}

/// Sum of per-node estimates
pub fn aggregate(estimates: &[NodeEstimate]) -> u64 {
    estimates
        .iter()
        .fold(0u64, |total, estimate| total.saturating_add(estimate.replicas))
}

pub fn can_schedule(total: u64, requested: u64) -> bool {
    total >= requested
}

/// Runs estimates against a cluster
pub struct CapacityPlanner {
    api: Arc<dyn ClusterApi>,
    settings: EstimatorSettings,
    logger: RunLogger,
}

impl CapacityPlanner {
    pub fn new(api: Arc<dyn ClusterApi>, settings: EstimatorSettings) -> Self {
        Self {
            api,
            settings,
            logger: RunLogger::default(),
        }
    }

    pub fn with_logger(mut self, logger: RunLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Estimate how many additional replicas of `target` the cluster can
    /// take. Any listing failure aborts the run; a partial estimate is
    /// never returned.
    pub async fn estimate(
        &self,
        target: &TargetPod,
        requested_replicas: u64,
    ) -> Result<ClusterEstimate, EstimateError> {
        self.logger.log_run_started(target, requested_replicas);

        let nodes = self
            .api
            .list_nodes()
            .await
            .map_err(EstimateError::ListNodes)?;
        let outcome = filter_healthy(&nodes, &self.settings);
        self.logger
            .log_nodes_listed(nodes.len(), outcome.healthy.len());
        for excluded in &outcome.excluded {
            self.logger.log_node_excluded(excluded);
        }

        let api = self.api.as_ref();
        let usages: Vec<NodeUsage> = stream::iter(outcome.healthy.iter())
            .map(|node| aggregate_usage(api, &node.name, &self.settings, &self.logger))
            .buffered(self.settings.concurrency.max(1))
            .try_collect()
            .await?;

        let estimates: Vec<NodeEstimate> = outcome
            .healthy
            .iter()
            .zip(usages.iter())
            .map(|(node, usage)| {
                let estimate = estimate_node(node, usage, target);
                self.logger.log_node_estimated(&estimate);
                estimate
            })
            .collect();

        let total_replicas = aggregate(&estimates);
        self.logger
            .log_run_completed(total_replicas, requested_replicas);

        Ok(ClusterEstimate {
            run_id: self.logger.run_id().to_string(),
            generated_at: Utc::now(),
            target: *target,
            requested_replicas,
            nodes: estimates,
            excluded: outcome.excluded,
            total_replicas,
        })
    }
}
