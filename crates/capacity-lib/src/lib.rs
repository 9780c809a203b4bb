//! Cluster capacity estimation library
//!
//! This crate provides the core functionality for:
//! - Parsing CPU and memory quantities into normalized units
//! - Classifying node health and reading allocatable resources
//! - Aggregating per-node pod consumption
//! - Estimating how many more replicas of a pod fit per node and cluster-wide

pub mod cluster;
pub mod error;
pub mod estimator;
pub mod health;
pub mod models;
pub mod observability;
pub mod planner;
pub mod quantity;
pub mod settings;
pub mod usage;

pub use cluster::{active_pods_field_selector, is_active_phase, ClusterApi, ClusterError};
pub use error::EstimateError;
pub use estimator::{estimate_node, TargetPod};
pub use health::{filter_healthy, HealthFilterOutcome, NodeHealth};
pub use models::*;
pub use observability::RunLogger;
pub use planner::{aggregate, can_schedule, CapacityPlanner, ClusterEstimate};
pub use quantity::{parse_cpu, parse_memory, parse_pod_count, QuantityError};
pub use settings::{EstimatorSettings, HealthPolicy, NodeRoleFilter, PodFetchPolicy};
pub use usage::aggregate_usage;
