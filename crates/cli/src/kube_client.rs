//! Kubernetes API adapter for the capacity estimator

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use capacity_lib::{
    active_pods_field_selector, is_active_phase, ClusterApi, ClusterError, ContainerResources,
    NodeCondition, NodeRecord, PodRef, PodResources,
};
use k8s_openapi::api::core::v1::{Container, Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ListParams, ResourceExt};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::KubeconfigLocation;

/// Read-only cluster access backed by a kube client
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connect using the kubeconfig at `location`. A defaulted path that
    /// does not exist falls back to the in-cluster / inferred configuration;
    /// an explicit one must exist.
    pub async fn connect(location: &KubeconfigLocation) -> Result<Self> {
        let path = location.path.as_path();
        let config = if path.exists() {
            debug!(kubeconfig = %path.display(), "Loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .with_context(|| format!("Invalid kubeconfig {}", path.display()))?
        } else if location.explicit {
            bail!("Kubeconfig {} not found", path.display());
        } else {
            debug!(kubeconfig = %path.display(), "Kubeconfig not found, inferring configuration");
            Config::infer()
                .await
                .context("Failed to infer Kubernetes configuration")?
        };

        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, ClusterError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| map_error("list nodes", e, None))?;
        Ok(list.items.iter().map(node_record).collect())
    }

    async fn list_active_pods(&self, node_name: &str) -> Result<Vec<PodRef>, ClusterError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let selector = active_pods_field_selector(node_name);
        let list = pods
            .list(&ListParams::default().fields(&selector))
            .await
            .map_err(|e| map_error("list pods", e, None))?;
        Ok(list
            .items
            .iter()
            .filter(|pod| pod_phase(pod).map(is_active_phase).unwrap_or(true))
            .map(|pod| PodRef::new(pod.namespace().unwrap_or_default(), pod.name_any()))
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodResources, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pods
            .get(name)
            .await
            .map_err(|e| map_error("get pod", e, Some((namespace, name))))?;
        Ok(pod_resources(&pod))
    }
}

fn map_error(operation: &str, error: kube::Error, pod: Option<(&str, &str)>) -> ClusterError {
    match error {
        kube::Error::Api(response) if response.code == 404 => match pod {
            Some((namespace, name)) => ClusterError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            None => ClusterError::Api {
                operation: operation.to_string(),
                message: response.message,
            },
        },
        kube::Error::Api(response) => ClusterError::Api {
            operation: operation.to_string(),
            message: format!("{} ({})", response.message, response.code),
        },
        other => ClusterError::Connection(other.to_string()),
    }
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

fn quantities(map: Option<&BTreeMap<String, Quantity>>) -> BTreeMap<String, String> {
    map.map(|m| m.iter().map(|(k, q)| (k.clone(), q.0.clone())).collect())
        .unwrap_or_default()
}

fn node_record(node: &Node) -> NodeRecord {
    let status = node.status.as_ref();
    NodeRecord {
        name: node.name_any(),
        labels: node.labels().clone(),
        allocatable: quantities(status.and_then(|s| s.allocatable.as_ref())),
        conditions: status
            .and_then(|s| s.conditions.as_ref())
            .map(|conditions| {
                conditions
                    .iter()
                    .map(|c| NodeCondition::new(c.type_.clone(), c.status.clone()))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn container_resources(container: &Container) -> ContainerResources {
    let resources = container.resources.as_ref();
    ContainerResources {
        name: container.name.clone(),
        requests: quantities(resources.and_then(|r| r.requests.as_ref())),
        limits: quantities(resources.and_then(|r| r.limits.as_ref())),
    }
}

fn pod_resources(pod: &Pod) -> PodResources {
    PodResources {
        containers: pod
            .spec
            .as_ref()
            .map(|spec| spec.containers.iter().map(container_resources).collect())
            .unwrap_or_default(),
    }
}
