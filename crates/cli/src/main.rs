//! Cloud Resource Audit CLI
//!
//! A command-line tool for reading audit results, recommendations and
//! savings from a running audit agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{audits, groups, recommendations, savings};

/// Cloud Resource Audit CLI
#[derive(Parser)]
#[command(name = "cloud-audit")]
#[command(author, version, about = "CLI for the Cloud Resource Audit agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (falls back to ~/.config/cloud-audit/config.json, then http://localhost:8080)
    #[arg(long, env = "CLOUD_AUDIT_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Audit results of the latest run
    #[command(subcommand)]
    Audits(AuditCommands),

    /// List recommendations, most urgent first
    Recommendations {
        /// Minimum priority (low, medium, high)
        #[arg(long, short)]
        priority: Option<String>,

        /// Filter by resource type (e.g. cloud_run, persistent_disk)
        #[arg(long, short)]
        resource_type: Option<String>,

        /// Maximum number of recommendations
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show project groups and their savings
    Groups,

    /// Show potential savings per audit type
    Savings,

    /// Start an audit run now
    Refresh,
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Summary of every audit type
    List,

    /// Findings of one audit type
    Show {
        /// Audit type (cloud_run, cloud_functions, compute_engine, cloud_sql, persistent_disks, static_ips)
        audit_type: String,
    },
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;

    match cli.command {
        Commands::Audits(audit_cmd) => match audit_cmd {
            AuditCommands::List => audits::list_audits(&client, cli.format).await?,
            AuditCommands::Show { audit_type } => {
                audits::show_audit(&client, &audit_type, cli.format).await?
            }
        },
        Commands::Recommendations {
            priority,
            resource_type,
            limit,
        } => {
            recommendations::list_recommendations(
                &client,
                priority,
                resource_type,
                limit,
                cli.format,
            )
            .await?;
        }
        Commands::Groups => groups::list_groups(&client, cli.format).await?,
        Commands::Savings => savings::show_savings(&client, cli.format).await?,
        Commands::Refresh => audits::refresh(&client, cli.format).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        output::print_error(&format!("{:#}", err));
        std::process::exit(1);
    }
}
