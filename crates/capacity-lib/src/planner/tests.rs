//! Pipeline tests against an in-memory cluster
//!
//! The fake honours the same contract as the kube-backed client: pod
//! listing is filtered by node and active phase, and fetching a pod that
//! is not stored reports not-found.

use super::*;
use crate::cluster::{is_active_phase, ClusterError};
use crate::models::{
    ContainerResources, ExclusionReason, NodeCondition, NodeRecord, PodRef, PodResources,
};
use crate::settings::{NodeRoleFilter, PodFetchPolicy, WORKER_ROLE_LABEL};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

const MIB: i64 = 1024 * 1024;

#[derive(Default)]
struct FakeCluster {
    nodes: Vec<NodeRecord>,
    /// node name -> (pod, phase)
    pods: HashMap<String, Vec<(PodRef, &'static str)>>,
    details: HashMap<PodRef, PodResources>,
    broken_pods: HashSet<PodRef>,
    broken_nodes: HashSet<String>,
    fail_node_listing: bool,
    pod_listings: Mutex<Vec<String>>,
}

impl FakeCluster {
    fn with_node(mut self, node: NodeRecord) -> Self {
        self.nodes.push(node);
        self
    }

    fn with_pod(
        mut self,
        node: &str,
        pod: &str,
        phase: &'static str,
        resources: PodResources,
    ) -> Self {
        let pod_ref = PodRef::new("default", pod);
        self.pods
            .entry(node.to_string())
            .or_default()
            .push((pod_ref.clone(), phase));
        self.details.insert(pod_ref, resources);
        self
    }

    /// Listed on the node but gone by the time it is fetched
    fn with_vanished_pod(mut self, node: &str, pod: &str) -> Self {
        self.pods
            .entry(node.to_string())
            .or_default()
            .push((PodRef::new("default", pod), "Running"));
        self
    }

    fn with_broken_pod(mut self, node: &str, pod: &str) -> Self {
        let pod_ref = PodRef::new("default", pod);
        self.pods
            .entry(node.to_string())
            .or_default()
            .push((pod_ref.clone(), "Running"));
        self.broken_pods.insert(pod_ref);
        self
    }

    fn listed_nodes(&self) -> Vec<String> {
        self.pod_listings.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, ClusterError> {
        if self.fail_node_listing {
            return Err(ClusterError::Connection("connection refused".to_string()));
        }
        Ok(self.nodes.clone())
    }

    async fn list_active_pods(&self, node_name: &str) -> Result<Vec<PodRef>, ClusterError> {
        self.pod_listings.lock().unwrap().push(node_name.to_string());
        if self.broken_nodes.contains(node_name) {
            return Err(ClusterError::Api {
                operation: "list pods".to_string(),
                message: "internal error".to_string(),
            });
        }
        Ok(self
            .pods
            .get(node_name)
            .map(|pods| {
                pods.iter()
                    .filter(|(_, phase)| is_active_phase(phase))
                    .map(|(pod, _)| pod.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodResources, ClusterError> {
        let pod_ref = PodRef::new(namespace, name);
        if self.broken_pods.contains(&pod_ref) {
            return Err(ClusterError::Api {
                operation: "get pod".to_string(),
                message: "etcdserver: request timed out".to_string(),
            });
        }
        self.details
            .get(&pod_ref)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

fn node(name: &str, cpu: &str, memory: &str, pods: &str) -> NodeRecord {
    let allocatable: BTreeMap<String, String> = [("cpu", cpu), ("memory", memory), ("pods", pods)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    NodeRecord {
        name: name.to_string(),
        labels: BTreeMap::new(),
        allocatable,
        conditions: vec![
            NodeCondition::new("MemoryPressure", "False"),
            NodeCondition::new("DiskPressure", "False"),
            NodeCondition::new("PIDPressure", "False"),
            NodeCondition::new("Ready", "True"),
        ],
    }
}

fn unhealthy(mut record: NodeRecord, condition: &str) -> NodeRecord {
    for c in record.conditions.iter_mut() {
        if c.condition_type == condition {
            c.status = "True".to_string();
        }
    }
    record
}

fn pod(cpu_request: &str, memory_request: &str) -> PodResources {
    let mut requests = BTreeMap::new();
    requests.insert("cpu".to_string(), cpu_request.to_string());
    requests.insert("memory".to_string(), memory_request.to_string());
    PodResources {
        containers: vec![ContainerResources {
            name: "app".to_string(),
            requests,
            limits: BTreeMap::new(),
        }],
    }
}

fn target() -> TargetPod {
    TargetPod::new(250, 500, 250 * MIB, 500 * MIB).unwrap()
}

async fn run(cluster: FakeCluster, settings: EstimatorSettings, replicas: u64) -> ClusterEstimate {
    CapacityPlanner::new(Arc::new(cluster), settings)
        .estimate(&target(), replicas)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_empty_node_fits_eight() {
    let cluster = FakeCluster::default().with_node(node("n1", "2000m", "2Gi", "10"));

    let estimate = run(cluster, EstimatorSettings::default(), 1).await;

    assert_eq!(estimate.nodes.len(), 1);
    assert_eq!(estimate.nodes[0].cpu_bound, 8);
    assert_eq!(estimate.nodes[0].memory_bound, 8);
    assert_eq!(estimate.total_replicas, 8);
    assert!(estimate.can_schedule());
}

#[tokio::test]
async fn test_cpu_exhausted_node_fits_none() {
    let cluster = FakeCluster::default()
        .with_node(node("n1", "2000m", "2Gi", "10"))
        .with_pod("n1", "busy", "Running", pod("1900m", "0"));

    let estimate = run(cluster, EstimatorSettings::default(), 1).await;

    assert_eq!(estimate.nodes[0].free_cpu_millicores, 100);
    assert_eq!(estimate.nodes[0].memory_bound, 8);
    assert_eq!(estimate.total_replicas, 0);
    assert!(!estimate.can_schedule());
}

#[tokio::test]
async fn test_unhealthy_node_is_not_queried_or_counted() {
    let cluster = FakeCluster::default()
        .with_node(node("good", "2", "2Gi", "110"))
        .with_node(unhealthy(node("sick", "64", "256Gi", "110"), "DiskPressure"))
        .with_pod("sick", "web", "Running", pod("100m", "100Mi"));
    let cluster = Arc::new(cluster);

    let estimate = CapacityPlanner::new(cluster.clone(), EstimatorSettings::default())
        .estimate(&target(), 1)
        .await
        .unwrap();

    assert_eq!(cluster.listed_nodes(), vec!["good".to_string()]);
    assert_eq!(estimate.nodes.len(), 1);
    assert_eq!(estimate.total_replicas, 8);
    assert_eq!(
        estimate.excluded,
        vec![ExcludedNode {
            name: "sick".to_string(),
            reason: ExclusionReason::Unhealthy {
                condition: "DiskPressure".to_string(),
                status: "True".to_string(),
            },
        }]
    );
}

#[tokio::test]
async fn test_shortfall_reports_cannot_schedule() {
    // Three nodes with room for four replicas each
    let cluster = FakeCluster::default()
        .with_node(node("a", "1", "4Gi", "110"))
        .with_node(node("b", "1", "4Gi", "110"))
        .with_node(node("c", "1", "4Gi", "110"));

    let estimate = run(cluster, EstimatorSettings::default(), 15).await;

    assert_eq!(estimate.total_replicas, 12);
    assert!(!estimate.can_schedule());
    assert_eq!(estimate.shortfall(), 3);
    assert!(!can_schedule(12, 15));
    assert!(can_schedule(15, 15));
}

#[tokio::test]
async fn test_total_is_sum_of_nodes() {
    let build = |with_c: bool| {
        let mut cluster = FakeCluster::default()
            .with_node(node("a", "4", "8Gi", "110"))
            .with_node(node("b", "2", "1Gi", "110"))
            .with_pod("a", "db", "Running", pod("1500m", "3Gi"))
            .with_pod("b", "cache", "Running", pod("250m", "512Mi"));
        if with_c {
            cluster = cluster.with_node(node("c", "3", "16Gi", "5"));
        }
        cluster
    };

    let full = run(build(true), EstimatorSettings::default(), 1).await;
    let without_c = run(build(false), EstimatorSettings::default(), 1).await;

    let sum: u64 = full.nodes.iter().map(|n| n.replicas).sum();
    assert_eq!(full.total_replicas, sum);
    assert_eq!(aggregate(&full.nodes), sum);

    let c = full.nodes.iter().find(|n| n.node.name == "c").unwrap();
    assert_eq!(c.replicas, 5);
    assert_eq!(full.total_replicas - without_c.total_replicas, c.replicas);
}

#[tokio::test]
async fn test_terminal_pods_are_not_counted() {
    let cluster = FakeCluster::default()
        .with_node(node("n1", "2", "2Gi", "10"))
        .with_pod("n1", "done", "Succeeded", pod("2", "2Gi"))
        .with_pod("n1", "crashed", "Failed", pod("2", "2Gi"))
        .with_pod("n1", "waiting", "Pending", pod("2", "2Gi"))
        .with_pod("n1", "web", "Running", pod("500m", "512Mi"));

    let estimate = run(cluster, EstimatorSettings::default(), 1).await;
    let n1 = &estimate.nodes[0];

    assert_eq!(n1.usage.pod_count, 1);
    assert_eq!(n1.usage.totals.cpu_request_millicores, 500);
    assert_eq!(n1.usage.totals.memory_request_bytes, 512 * MIB);
    assert_eq!(n1.replicas, 6);
}

#[tokio::test]
async fn test_vanished_pod_is_skipped() {
    let cluster = FakeCluster::default()
        .with_node(node("n1", "2", "2Gi", "10"))
        .with_pod("n1", "web", "Running", pod("500m", "512Mi"))
        .with_vanished_pod("n1", "gone");

    let settings = EstimatorSettings::default().with_pod_fetch_policy(PodFetchPolicy::Abort);
    let estimate = run(cluster, settings, 1).await;
    let n1 = &estimate.nodes[0];

    assert_eq!(n1.usage.pod_count, 2);
    assert_eq!(n1.usage.skipped.len(), 1);
    assert_eq!(n1.usage.skipped[0].pod, PodRef::new("default", "gone"));
    assert_eq!(n1.usage.totals.cpu_request_millicores, 500);
}

#[tokio::test]
async fn test_pod_fetch_error_skipped_by_default() {
    let cluster = FakeCluster::default()
        .with_node(node("n1", "2", "2Gi", "10"))
        .with_broken_pod("n1", "flaky");

    let estimate = run(cluster, EstimatorSettings::default(), 1).await;

    assert_eq!(estimate.nodes[0].usage.skipped.len(), 1);
    assert!(estimate.nodes[0].usage.skipped[0]
        .reason
        .contains("timed out"));
}

#[tokio::test]
async fn test_pod_fetch_error_aborts_when_requested() {
    let cluster = FakeCluster::default()
        .with_node(node("n1", "2", "2Gi", "10"))
        .with_broken_pod("n1", "flaky");
    let settings = EstimatorSettings::default().with_pod_fetch_policy(PodFetchPolicy::Abort);

    let err = CapacityPlanner::new(Arc::new(cluster), settings)
        .estimate(&target(), 1)
        .await
        .unwrap_err();

    assert!(matches!(err, EstimateError::FetchPod { ref pod, .. } if pod == "default/flaky"));
}

#[tokio::test]
async fn test_node_listing_failure_aborts() {
    let cluster = FakeCluster {
        fail_node_listing: true,
        ..FakeCluster::default()
    };

    let err = CapacityPlanner::new(Arc::new(cluster), EstimatorSettings::default())
        .estimate(&target(), 1)
        .await
        .unwrap_err();

    assert!(matches!(err, EstimateError::ListNodes(ClusterError::Connection(_))));
}

#[tokio::test]
async fn test_pod_listing_failure_aborts() {
    let mut cluster = FakeCluster::default()
        .with_node(node("a", "2", "2Gi", "10"))
        .with_node(node("b", "2", "2Gi", "10"));
    cluster.broken_nodes.insert("b".to_string());

    let err = CapacityPlanner::new(Arc::new(cluster), EstimatorSettings::default())
        .estimate(&target(), 1)
        .await
        .unwrap_err();

    assert!(matches!(err, EstimateError::ListPods { ref node, .. } if node == "b"));
}

#[tokio::test]
async fn test_worker_filter_skips_unlabelled_nodes() {
    let mut worker = node("worker", "2", "2Gi", "10");
    worker
        .labels
        .insert(WORKER_ROLE_LABEL.to_string(), "true".to_string());
    let cluster = FakeCluster::default()
        .with_node(worker)
        .with_node(node("control-plane", "8", "32Gi", "110"));

    let settings = EstimatorSettings::default().with_role_filter(NodeRoleFilter::workers());
    let estimate = run(cluster, settings, 1).await;

    assert_eq!(estimate.nodes.len(), 1);
    assert_eq!(estimate.nodes[0].node.name, "worker");
    assert_eq!(estimate.excluded[0].reason, ExclusionReason::Role);
    assert_eq!(estimate.total_replicas, 8);
}

#[tokio::test]
async fn test_concurrent_run_matches_sequential() {
    let build = || {
        (0..8).fold(FakeCluster::default(), |cluster, i| {
            let name = format!("node-{}", i);
            cluster
                .with_node(node(&name, &format!("{}", i + 1), "8Gi", "110"))
                .with_pod(&name, &format!("app-{}", i), "Running", pod("300m", "256Mi"))
        })
    };

    let sequential = run(build(), EstimatorSettings::default(), 1).await;
    let concurrent = run(build(), EstimatorSettings::default().with_concurrency(4), 1).await;

    assert_eq!(sequential.total_replicas, concurrent.total_replicas);
    let names = |e: &ClusterEstimate| -> Vec<String> {
        e.nodes.iter().map(|n| n.node.name.clone()).collect()
    };
    assert_eq!(names(&sequential), names(&concurrent));
    let replicas =
        |e: &ClusterEstimate| -> Vec<u64> { e.nodes.iter().map(|n| n.replicas).collect() };
    assert_eq!(replicas(&sequential), replicas(&concurrent));
}

#[tokio::test]
async fn test_estimate_serializes_to_json() {
    let cluster = FakeCluster::default().with_node(node("n1", "2", "2Gi", "10"));
    let estimate = run(cluster, EstimatorSettings::default(), 3).await;

    let json = serde_json::to_value(&estimate).unwrap();
    assert_eq!(json["total_replicas"], 8);
    assert_eq!(json["requested_replicas"], 3);
    assert_eq!(json["nodes"][0]["node"]["name"], "n1");
    assert_eq!(json["nodes"][0]["limited_by"], "cpu");
}
