//! Alert CLI commands

use anyhow::Result;
use engine_lib::Alert;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_timestamp, print_json, print_rows, print_success, OutputFormat,
};

/// Row for the alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Created")]
    created_at: String,
    #[tabled(rename = "Resolved")]
    resolved: String,
}

/// List alerts, unresolved only unless `all` is set
pub async fn list_alerts(client: &ApiClient, all: bool, format: OutputFormat) -> Result<()> {
    let path = format!("api/v1/alerts?active_only={}", !all);
    let alerts: Vec<Alert> = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            let rows = alerts
                .iter()
                .map(|a| AlertRow {
                    id: a.id,
                    namespace: a.namespace.clone(),
                    severity: color_status(&a.severity.to_string()),
                    message: a.message.clone(),
                    created_at: format_timestamp(&a.created_at),
                    resolved: if a.resolved { "yes" } else { "no" }.to_string(),
                })
                .collect();
            print_rows::<AlertRow>(rows);
        }
    }

    Ok(())
}

/// Mark an alert resolved
pub async fn resolve_alert(client: &ApiClient, id: u64, format: OutputFormat) -> Result<()> {
    let alert: Alert = client.post(&format!("api/v1/alerts/{}/resolve", id)).await?;

    match format {
        OutputFormat::Json => print_json(&alert)?,
        OutputFormat::Table => {
            print_success(&format!("Alert {} in {} resolved", alert.id, alert.namespace));
        }
    }

    Ok(())
}
