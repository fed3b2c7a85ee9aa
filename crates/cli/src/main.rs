//! KubePocket CLI
//!
//! A command-line tool for querying relative cost, waste, anomalies,
//! forecasts and alerts from the KubePocket engine.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alerts, analysis, cost};

/// KubePocket CLI
#[derive(Parser)]
#[command(name = "kpk")]
#[command(author, version, about = "CLI for KubePocket", long_about = None)]
pub struct Cli {
    /// Engine API URL (can also be set via KPK_API_URL env var)
    #[arg(long, env = "KPK_API_URL", default_value = "http://localhost:8001")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Relative cost and waste
    #[command(subcommand)]
    Cost(CostCommands),

    /// List and resolve alerts
    #[command(subcommand)]
    Alerts(AlertCommands),

    /// Show namespace and pod anomaly scores
    Anomalies,

    /// Forecast a namespace metric from its daily averages
    Forecast {
        /// Namespace to forecast
        namespace: String,

        /// Metric to forecast (cpu, memory)
        #[arg(long, short, default_value = "cpu")]
        metric: String,

        /// Days to project
        #[arg(long, short, default_value_t = 7)]
        days: u32,
    },

    /// Show cluster totals
    Summary,
}

#[derive(Subcommand)]
pub enum CostCommands {
    /// Each namespace's share of requested CPU and memory
    Relative,

    /// Pods that hold resources without doing useful work
    Waste,

    /// Relative cost and waste together
    Summary,
}

#[derive(Subcommand)]
pub enum AlertCommands {
    /// List alerts
    List {
        /// Include resolved alerts
        #[arg(long)]
        all: bool,
    },

    /// Mark an alert resolved
    Resolve {
        /// Alert ID
        id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Cost(cost_cmd) => match cost_cmd {
            CostCommands::Relative => cost::show_relative(&client, cli.format).await?,
            CostCommands::Waste => cost::show_waste(&client, cli.format).await?,
            CostCommands::Summary => cost::show_summary(&client, cli.format).await?,
        },
        Commands::Alerts(alert_cmd) => match alert_cmd {
            AlertCommands::List { all } => alerts::list_alerts(&client, all, cli.format).await?,
            AlertCommands::Resolve { id } => {
                alerts::resolve_alert(&client, id, cli.format).await?
            }
        },
        Commands::Anomalies => analysis::show_anomalies(&client, cli.format).await?,
        Commands::Forecast {
            namespace,
            metric,
            days,
        } => analysis::show_forecast(&client, &namespace, &metric, days, cli.format).await?,
        Commands::Summary => analysis::show_summary(&client, cli.format).await?,
    }

    Ok(())
}
