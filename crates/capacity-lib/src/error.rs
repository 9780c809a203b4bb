//! Error taxonomy for an estimation run

use crate::cluster::ClusterError;
use crate::quantity::QuantityError;
use thiserror::Error;

/// Errors that stop an estimation run
#[derive(Debug, Error)]
pub enum EstimateError {
    /// A target request of zero cannot bound anything
    #[error("target {resource} request must be greater than zero")]
    ZeroRequest { resource: &'static str },

    #[error("invalid target {field}: {source}")]
    InvalidTarget {
        field: &'static str,
        #[source]
        source: QuantityError,
    },

    #[error("failed to list nodes: {0}")]
    ListNodes(#[source] ClusterError),

    #[error("failed to list pods on node {node}: {source}")]
    ListPods {
        node: String,
        #[source]
        source: ClusterError,
    },

    #[error("failed to fetch pod {pod} on node {node}: {source}")]
    FetchPod {
        node: String,
        pod: String,
        #[source]
        source: ClusterError,
    },
}
