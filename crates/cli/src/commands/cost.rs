//! Cost-related CLI commands

use anyhow::Result;
use colored::Colorize;
use engine_lib::analysis::CostSummary;
use engine_lib::cost::{RelativeCost, WasteReport};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_score, color_status, format_cores, format_gib, format_pct, print_heading, print_info,
    print_json, print_rows, OutputFormat,
};

/// Row for the relative cost table
#[derive(Tabled)]
struct NamespaceCostRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Pods")]
    pods: usize,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "CPU %")]
    cpu_pct: String,
    #[tabled(rename = "Memory %")]
    memory_pct: String,
    #[tabled(rename = "Cost %")]
    cost_pct: String,
}

/// Row for the waste table
#[derive(Tabled)]
struct WasteRow {
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Reasons")]
    reasons: String,
    #[tabled(rename = "Recommendation")]
    recommendation: String,
}

/// Show each namespace's share of the cluster
pub async fn show_relative(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: RelativeCost = client.get("api/v1/cost/relative").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => render_relative(&result),
    }

    Ok(())
}

/// Show pods flagged as waste
pub async fn show_waste(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: WasteReport = client.get("api/v1/cost/waste").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => render_waste(&result),
    }

    Ok(())
}

/// Show relative cost and waste together
pub async fn show_summary(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: CostSummary = client.get("api/v1/cost/summary").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            render_relative(&result.relative_cost);
            println!();
            render_waste(&result.waste);
        }
    }

    Ok(())
}

fn render_relative(cost: &RelativeCost) {
    print_heading("Relative Cost");
    if cost.is_empty() {
        print_info("No snapshots collected yet");
        return;
    }

    println!(
        "Cluster requests:       {} CPU, {}",
        format_cores(cost.cluster_total_cpu).cyan(),
        format_gib(cost.cluster_total_memory_gib).cyan()
    );
    println!();

    let rows = cost
        .namespaces
        .iter()
        .map(|n| NamespaceCostRow {
            namespace: n.namespace.clone(),
            pods: n.pod_count,
            cpu: format_cores(n.cpu_cores),
            memory: format_gib(n.memory_gib),
            cpu_pct: format_pct(n.cpu_pct),
            memory_pct: format_pct(n.memory_pct),
            cost_pct: format_pct(n.cost_pct),
        })
        .collect();
    print_rows::<NamespaceCostRow>(rows);
}

fn render_waste(report: &WasteReport) {
    print_heading("Waste");
    let summary = &report.summary;
    println!(
        "Wasteful pods:          {} of {} ({})",
        summary.waste_pod_count,
        summary.total_pods_analyzed,
        format_pct(summary.waste_pct)
    );
    println!(
        "Wasted requests:        {} CPU ({}), {} ({})",
        format_cores(summary.wasted_cpu_cores).red(),
        format_pct(summary.wasted_cpu_pct),
        format_gib(summary.wasted_memory_gib).red(),
        format_pct(summary.wasted_memory_pct)
    );
    println!();

    let rows = report
        .waste_pods
        .iter()
        .map(|f| WasteRow {
            pod: f.pod.clone(),
            namespace: f.namespace.clone(),
            status: color_status(f.status.as_str()),
            score: color_score(f64::from(f.waste_score)),
            reasons: f
                .reasons
                .iter()
                .map(|r| r.rule.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            recommendation: f.recommendation.clone(),
        })
        .collect();
    print_rows::<WasteRow>(rows);
}
