//! Per-node consumption accounting
//!
//! Sums container requests and limits over every active pod bound to a
//! node. A container that does not declare a resource contributes zero for
//! it; missing limits are never inferred from node capacity.

use crate::cluster::ClusterApi;
use crate::error::EstimateError;
use crate::models::{resources, NodeUsage, PodResourceUsage, PodResources, SkippedPod};
use crate::observability::RunLogger;
use crate::quantity::{parse_cpu, parse_memory};
use crate::settings::{EstimatorSettings, PodFetchPolicy};
use std::collections::BTreeMap;

impl PodResourceUsage {
    /// Sum of requests and limits across a pod's containers
    pub fn from_pod(pod: &PodResources) -> Self {
        pod.containers
            .iter()
            .map(|container| PodResourceUsage {
                cpu_request_millicores: cpu_of(&container.requests),
                cpu_limit_millicores: cpu_of(&container.limits),
                memory_request_bytes: memory_of(&container.requests),
                memory_limit_bytes: memory_of(&container.limits),
            })
            .sum()
    }
}

fn cpu_of(quantities: &BTreeMap<String, String>) -> u64 {
    quantities
        .get(resources::CPU)
        .map(|q| parse_cpu(q))
        .unwrap_or(0)
}

fn memory_of(quantities: &BTreeMap<String, String>) -> i64 {
    quantities
        .get(resources::MEMORY)
        .map(|q| parse_memory(q))
        .unwrap_or(0)
}

/// Aggregate the consumption of all active pods on `node_name`.
///
/// Listing failures abort. A pod that vanished between listing and fetch is
/// skipped; other fetch failures follow `settings.pod_fetch_policy`.
pub async fn aggregate_usage(
    api: &dyn ClusterApi,
    node_name: &str,
    settings: &EstimatorSettings,
    logger: &RunLogger,
) -> Result<NodeUsage, EstimateError> {
    let pods = api
        .list_active_pods(node_name)
        .await
        .map_err(|source| EstimateError::ListPods {
            node: node_name.to_string(),
            source,
        })?;

    let mut usage = NodeUsage {
        pod_count: u32::try_from(pods.len()).unwrap_or(u32::MAX),
        ..NodeUsage::default()
    };

    for pod in pods {
        match api.get_pod(&pod.namespace, &pod.name).await {
            Ok(detail) => {
                usage.totals += PodResourceUsage::from_pod(&detail);
            }
            Err(e)
                if e.is_not_found()
                    || settings.pod_fetch_policy == PodFetchPolicy::SkipAndWarn =>
            {
                logger.log_pod_skipped(node_name, &pod, &e);
                usage.skipped.push(SkippedPod {
                    pod,
                    reason: e.to_string(),
                });
            }
            Err(source) => {
                return Err(EstimateError::FetchPod {
                    node: node_name.to_string(),
                    pod: pod.to_string(),
                    source,
                });
            }
        }
    }

    Ok(usage)
}
