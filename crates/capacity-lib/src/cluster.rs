//! Query seam to the cluster API
//!
//! The estimator only needs three read operations. Implementations convert
//! their API objects into the plain records in [`crate::models`].

use crate::models::{NodeRecord, PodRef, PodResources};
use async_trait::async_trait;
use thiserror::Error;

/// Pod phases that do not consume node resources for this estimate
pub const EXCLUDED_POD_PHASES: [&str; 4] = ["Pending", "Succeeded", "Failed", "Unknown"];

/// Errors reported by a [`ClusterApi`] implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("pod {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("{operation} failed: {message}")]
    Api { operation: String, message: String },

    #[error("cluster unreachable: {0}")]
    Connection(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// Read-only view of the cluster
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List every node with labels, allocatable resources and conditions
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, ClusterError>;

    /// List pods bound to `node_name` whose phase is not in
    /// [`EXCLUDED_POD_PHASES`]
    async fn list_active_pods(&self, node_name: &str) -> Result<Vec<PodRef>, ClusterError>;

    /// Fetch the container resources of one pod
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodResources, ClusterError>;
}

/// Field selector matching active pods on a node
pub fn active_pods_field_selector(node_name: &str) -> String {
    let mut selector = format!("spec.nodeName={}", node_name);
    for phase in EXCLUDED_POD_PHASES {
        selector.push_str(",status.phase!=");
        selector.push_str(phase);
    }
    selector
}

/// Whether a pod in `phase` counts towards node consumption
pub fn is_active_phase(phase: &str) -> bool {
    !EXCLUDED_POD_PHASES.contains(&phase)
}
