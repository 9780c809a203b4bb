//! Capacity estimate command

use anyhow::Result;
use capacity_lib::{CapacityPlanner, ClusterEstimate, NodeEstimate, TargetPod};
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_percent, color_replicas, format_bytes, format_cpu, OutputFormat};

/// Row for the per-node table
#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Pods")]
    pods: String,
    #[tabled(rename = "CPU Req")]
    cpu_request: String,
    #[tabled(rename = "CPU Lim")]
    cpu_limit: String,
    #[tabled(rename = "Mem Req")]
    memory_request: String,
    #[tabled(rename = "Mem Lim")]
    memory_limit: String,
    #[tabled(rename = "Free CPU")]
    free_cpu: String,
    #[tabled(rename = "Free Mem")]
    free_memory: String,
    #[tabled(rename = "Max Replicas")]
    replicas: String,
    #[tabled(rename = "Limited By")]
    limited_by: String,
}

impl From<&NodeEstimate> for NodeRow {
    fn from(estimate: &NodeEstimate) -> Self {
        let percentages = &estimate.percentages;
        Self {
            node: estimate.node.name.clone(),
            pods: format!(
                "{}/{}",
                estimate.usage.pod_count, estimate.node.allocatable_pods
            ),
            cpu_request: color_percent(percentages.cpu_request),
            cpu_limit: color_percent(percentages.cpu_limit),
            memory_request: color_percent(percentages.memory_request),
            memory_limit: color_percent(percentages.memory_limit),
            free_cpu: format_cpu(estimate.free_cpu_millicores),
            free_memory: format_bytes(estimate.free_memory_bytes),
            replicas: color_replicas(estimate.replicas),
            limited_by: estimate.limited_by.to_string(),
        }
    }
}

/// JSON report: the estimate plus the final verdict
#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    estimate: &'a ClusterEstimate,
    can_schedule: bool,
}

/// Run the estimate and print the report. Returns whether the requested
/// replicas fit.
pub async fn run(
    planner: &CapacityPlanner,
    target: &TargetPod,
    replicas: u64,
    format: OutputFormat,
    verbose: bool,
) -> Result<bool> {
    let estimate = planner.estimate(target, replicas).await?;

    match format {
        OutputFormat::Json => println!("{}", render_json(&estimate)?),
        OutputFormat::Table => print!("{}", render_table(&estimate, verbose)),
    }

    Ok(estimate.can_schedule())
}

pub fn render_json(estimate: &ClusterEstimate) -> Result<String> {
    let report = JsonReport {
        estimate,
        can_schedule: estimate.can_schedule(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

/// One-line verdict printed at the end of the table report
pub fn recommendation(estimate: &ClusterEstimate) -> String {
    if estimate.can_schedule() {
        format!(
            "You can go ahead with deployment of {} pod replicas in the cluster",
            estimate.requested_replicas
        )
    } else {
        format!(
            "The cluster cannot schedule {} replicas ({} short). Reduce the replica count or the CPU/memory requests",
            estimate.requested_replicas,
            estimate.shortfall()
        )
    }
}

pub fn render_table(estimate: &ClusterEstimate, verbose: bool) -> String {
    let mut out = String::new();
    let target = &estimate.target;

    out.push_str(&format!("{}\n", "Cluster Capacity".bold()));
    out.push_str(&format!("{}\n", "=".repeat(60)));
    out.push_str(&format!(
        "Target pod:  cpu {} / {}  memory {} / {}  (request / limit)\n",
        format_cpu(target.cpu_request_millicores as i64),
        format_cpu(target.cpu_limit_millicores as i64),
        format_bytes(target.memory_request_bytes),
        format_bytes(target.memory_limit_bytes),
    ));
    out.push_str(&format!("Requested:   {} replicas\n\n", estimate.requested_replicas));

    if estimate.nodes.is_empty() {
        out.push_str(&format!("{}\n", "No healthy nodes found".yellow()));
    } else {
        let rows: Vec<NodeRow> = estimate.nodes.iter().map(NodeRow::from).collect();
        let table = tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string();
        out.push_str(&table);
        out.push('\n');
    }

    if !estimate.excluded.is_empty() {
        out.push('\n');
        out.push_str(&format!("{}\n", "Excluded nodes".bold()));
        for excluded in &estimate.excluded {
            out.push_str(&format!(
                "  {} {}\n",
                excluded.name,
                format!("({})", excluded.reason).dimmed()
            ));
        }
    }

    if verbose {
        let skipped: Vec<_> = estimate
            .nodes
            .iter()
            .flat_map(|n| n.usage.skipped.iter().map(move |s| (&n.node.name, s)))
            .collect();
        if !skipped.is_empty() {
            out.push('\n');
            out.push_str(&format!("{}\n", "Skipped pods".bold()));
            for (node, pod) in skipped {
                out.push_str(&format!("  {} on {}: {}\n", pod.pod, node, pod.reason));
            }
        }
    }

    out.push('\n');
    out.push_str(&format!("{}\n", "=".repeat(60)));
    out.push_str(&format!(
        "{} {}\n",
        "Total possible replicas:".bold(),
        estimate.total_replicas
    ));
    let verdict = recommendation(estimate);
    if estimate.can_schedule() {
        out.push_str(&format!("{} {}\n", "✓".green().bold(), verdict));
    } else {
        out.push_str(&format!("{} {}\n", "✗".red().bold(), verdict.red()));
    }
    out.push_str(&format!("{}\n", format!("run {}", estimate.run_id).dimmed()));

    out
}
