//! Anomaly, forecast and summary CLI commands

use anyhow::Result;
use colored::Colorize;
use engine_lib::analysis::AnomalyReport;
use engine_lib::anomaly::DailyForecast;
use engine_lib::ClusterSummary;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_score, format_cores, format_gib, print_heading, print_json, print_rows, print_warning,
    OutputFormat,
};

/// Pods below this score are left out of the table
const POD_SCORE_CUTOFF: f64 = 1.0;

#[derive(Tabled)]
struct NamespaceScoreRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Baseline")]
    baseline: String,
    #[tabled(rename = "Z")]
    z_score: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Forecast")]
    forecast: String,
}

#[derive(Tabled)]
struct PodScoreRow {
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Restarts")]
    restarts: String,
    #[tabled(rename = "Score")]
    score: String,
}

#[derive(Tabled)]
struct ForecastRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Kind")]
    kind: String,
}

/// Show namespace and pod anomaly scores
pub async fn show_anomalies(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: AnomalyReport = client.get("api/v1/anomalies").await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_heading("Namespace Anomalies");
            let rows = report
                .namespaces
                .iter()
                .map(|n| NamespaceScoreRow {
                    namespace: n.namespace.clone(),
                    metric: n.metric_type.to_string(),
                    current: format!("{:.2}", n.current),
                    baseline: format!("{:.2} ± {:.2}", n.baseline_avg, n.std_dev),
                    z_score: format!("{:.2}", n.z_score),
                    score: color_score(n.score),
                    forecast: format!("{:.2}", n.forecast),
                })
                .collect();
            print_rows::<NamespaceScoreRow>(rows);
            println!();

            print_heading("Pod Anomalies");
            let mut pods: Vec<_> = report
                .pods
                .iter()
                .filter(|p| p.score >= POD_SCORE_CUTOFF)
                .collect();
            pods.sort_by(|a, b| b.score.total_cmp(&a.score));
            let rows = pods
                .into_iter()
                .map(|p| PodScoreRow {
                    pod: p.pod.clone(),
                    namespace: p.namespace.clone(),
                    cpu: format!("{:.0}", p.cpu_anomaly),
                    restarts: format!("{:.0}", p.restart_anomaly),
                    score: color_score(p.score),
                })
                .collect();
            print_rows::<PodScoreRow>(rows);
        }
    }

    Ok(())
}

/// Show the daily forecast for one namespace
pub async fn show_forecast(
    client: &ApiClient,
    namespace: &str,
    metric: &str,
    days: u32,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("api/v1/forecast/{}?metric={}&days={}", namespace, metric, days);
    let forecast: DailyForecast = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&forecast)?,
        OutputFormat::Table => {
            print_heading(&format!("Forecast: {} ({})", forecast.namespace, forecast.metric_type));
            println!("Trend per day:          {:+.3}", forecast.trend);
            println!("Confidence:             {:.0}%", forecast.confidence * 100.0);
            if forecast.confidence < 0.5 {
                print_warning("Daily values are volatile; treat the forecast as rough");
            }
            println!();

            let history = forecast
                .historical_dates
                .iter()
                .zip(&forecast.historical_values)
                .map(|(date, value)| ForecastRow {
                    date: date.to_string(),
                    value: format!("{:.2}", value),
                    kind: "actual".to_string(),
                });
            let projected = forecast
                .forecast_dates
                .iter()
                .zip(&forecast.forecast_values)
                .map(|(date, value)| ForecastRow {
                    date: date.to_string(),
                    value: format!("{:.2}", value).cyan().to_string(),
                    kind: "forecast".cyan().to_string(),
                });
            print_rows::<ForecastRow>(history.chain(projected).collect());
        }
    }

    Ok(())
}

/// Show cluster totals over the latest snapshots
pub async fn show_summary(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let summary: ClusterSummary = client.get("api/v1/metrics/summary").await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_heading("Cluster Summary");
            println!("Namespaces:             {}", summary.total_namespaces);
            println!(
                "Pods:                   {} ({} running, {} pending, {} failed)",
                summary.total_pods,
                summary.running_pods.to_string().green(),
                summary.pending_pods.to_string().yellow(),
                summary.failed_pods.to_string().red()
            );
            println!("CPU requests:           {}", format_cores(summary.total_cpu));
            println!("Memory requests:        {}", format_gib(summary.total_memory));
            println!("Restarts:               {}", summary.total_restarts);

            let alerts = summary.active_alerts.to_string();
            let alerts = if summary.active_alerts > 0 {
                alerts.red().bold().to_string()
            } else {
                alerts.green().to_string()
            };
            println!("Active alerts:          {}", alerts);
        }
    }

    Ok(())
}
