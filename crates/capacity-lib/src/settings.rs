//! Run-scoped estimator settings
//!
//! Everything that varies between runs (which nodes count, which conditions
//! are monitored, how pod fetch failures are treated, how many nodes are
//! processed at once) lives here and is passed to each pipeline stage.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Label used by clusters that mark worker nodes explicitly
pub const WORKER_ROLE_LABEL: &str = "node-role.kubernetes.io/node";

/// Which nodes are considered at all
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum NodeRoleFilter {
    /// Every node is eligible
    #[default]
    All,
    /// Only nodes carrying `key` (with `value`, when given)
    Label { key: String, value: Option<String> },
}

impl NodeRoleFilter {
    /// The historical worker-only policy: `node-role.kubernetes.io/node=true`
    pub fn workers() -> Self {
        NodeRoleFilter::Label {
            key: WORKER_ROLE_LABEL.to_string(),
            value: Some("true".to_string()),
        }
    }

    pub fn matches<'a, I>(&self, labels: I) -> bool
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        match self {
            NodeRoleFilter::All => true,
            NodeRoleFilter::Label { key, value } => labels.into_iter().any(|(k, v)| {
                k == key && value.as_ref().map(|expected| expected == v).unwrap_or(true)
            }),
        }
    }
}

impl FromStr for NodeRoleFilter {
    type Err = String;

    /// Accepts `all`, `KEY` or `KEY=VALUE`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty role filter".to_string());
        }
        if s.eq_ignore_ascii_case("all") {
            return Ok(NodeRoleFilter::All);
        }
        match s.split_once('=') {
            Some((key, _)) if key.is_empty() => Err(format!("missing label key in '{}'", s)),
            Some((key, value)) => Ok(NodeRoleFilter::Label {
                key: key.to_string(),
                value: Some(value.to_string()),
            }),
            None => Ok(NodeRoleFilter::Label {
                key: s.to_string(),
                value: None,
            }),
        }
    }
}

/// Node conditions that decide whether a node is usable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPolicy {
    /// Conditions that report "True" while the problem is present
    #[serde(default = "default_pressure_conditions")]
    pub pressure_conditions: Vec<String>,
    /// Whether `Ready` must report "True"
    #[serde(default = "default_require_ready")]
    pub require_ready: bool,
}

pub const READY_CONDITION: &str = "Ready";

fn default_pressure_conditions() -> Vec<String> {
    vec![
        "MemoryPressure".to_string(),
        "DiskPressure".to_string(),
        "PIDPressure".to_string(),
    ]
}

fn default_require_ready() -> bool {
    true
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            pressure_conditions: default_pressure_conditions(),
            require_ready: default_require_ready(),
        }
    }
}

/// What to do when a listed pod cannot be fetched for a reason other than
/// not-found. Not-found is always skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodFetchPolicy {
    #[default]
    SkipAndWarn,
    Abort,
}

impl FromStr for PodFetchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "skip" | "skip_and_warn" => Ok(PodFetchPolicy::SkipAndWarn),
            "abort" => Ok(PodFetchPolicy::Abort),
            other => Err(format!("unknown pod fetch policy '{}'", other)),
        }
    }
}

/// Settings threaded through a single estimation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatorSettings {
    #[serde(default)]
    pub role_filter: NodeRoleFilter,
    #[serde(default)]
    pub health: HealthPolicy,
    #[serde(default)]
    pub pod_fetch_policy: PodFetchPolicy,
    /// Nodes aggregated at once; 1 keeps the run strictly sequential
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    1
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            role_filter: NodeRoleFilter::default(),
            health: HealthPolicy::default(),
            pod_fetch_policy: PodFetchPolicy::default(),
            concurrency: default_concurrency(),
        }
    }
}

impl EstimatorSettings {
    pub fn with_role_filter(mut self, filter: NodeRoleFilter) -> Self {
        self.role_filter = filter;
        self
    }

    pub fn with_pod_fetch_policy(mut self, policy: PodFetchPolicy) -> Self {
        self.pod_fetch_policy = policy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}
