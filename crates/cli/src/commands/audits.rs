//! Audit result commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, AuditOverview, AuditResult, RefreshResponse};
use crate::output::{
    color_priority, format_savings, print_json, print_success, print_table, print_warning,
    truncate, OutputFormat,
};

/// Row for the audit overview table
#[derive(Tabled)]
struct AuditRow {
    #[tabled(rename = "Audit")]
    audit_type: String,
    #[tabled(rename = "Resources")]
    total: u64,
    #[tabled(rename = "Untagged")]
    untagged: u64,
    #[tabled(rename = "Idle")]
    idle: u64,
    #[tabled(rename = "Over-provisioned")]
    over_provisioned: u64,
    #[tabled(rename = "Issues")]
    issues: usize,
    #[tabled(rename = "Savings/mo")]
    savings: String,
}

/// Row for the findings of one audit
#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Location")]
    region: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Issue")]
    issue: String,
    #[tabled(rename = "Savings/mo")]
    savings: String,
}

/// List the merged result of every audit type
pub async fn list_audits(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let overview: AuditOverview = client.get("api/audits").await?;

    if format == OutputFormat::Json {
        return print_json(&overview);
    }

    println!(
        "{} {} project(s), generated {}",
        "Audit run:".bold(),
        overview.projects,
        overview
            .generated_at
            .format("%Y-%m-%d %H:%M UTC")
            .to_string()
            .dimmed()
    );

    let rows: Vec<AuditRow> = overview
        .results
        .iter()
        .map(|(audit_type, r)| AuditRow {
            audit_type: audit_type.clone(),
            total: r.total_count,
            untagged: r.untagged_count,
            idle: r.idle_count,
            over_provisioned: r.over_provisioned_count,
            issues: r.issues.len(),
            savings: format_savings(r.potential_monthly_savings),
        })
        .collect();
    print_table(rows);

    println!(
        "\n{} {}",
        "Potential Savings:".bold(),
        format_savings(overview.total_potential_savings).green().bold()
    );
    if overview.issues > 0 {
        print_warning(&format!(
            "{} issue(s) recorded, see `audits show <type>`",
            overview.issues
        ));
    }

    Ok(())
}

/// Show the findings and issues of one audit type
pub async fn show_audit(client: &ApiClient, audit_type: &str, format: OutputFormat) -> Result<()> {
    let result: AuditResult = client.get(&format!("api/audits/{}", audit_type)).await?;

    if format == OutputFormat::Json {
        return print_json(&result);
    }

    println!("{}", result.resource_type.bold());
    println!("{}", "=".repeat(50));
    println!("Resources:          {}", result.total_count);
    println!("Untagged:           {}", result.untagged_count);
    println!("Idle:               {}", result.idle_count);
    println!("Over-provisioned:   {}", result.over_provisioned_count);
    println!(
        "Savings/mo:         {}",
        format_savings(result.potential_monthly_savings).green()
    );
    println!();

    if result.recommendations.is_empty() {
        print_success("No recommendations");
    } else {
        let rows: Vec<FindingRow> = result
            .recommendations
            .iter()
            .map(|r| FindingRow {
                resource: r.resource_name.clone(),
                region: r.region.clone(),
                priority: color_priority(&r.priority),
                issue: truncate(&r.issue, 60),
                savings: format_savings(r.potential_monthly_savings),
            })
            .collect();
        print_table(rows);
    }

    for issue in &result.issues {
        print_warning(issue);
    }

    Ok(())
}

/// Ask the agent to start an audit run now
pub async fn refresh(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: RefreshResponse = client.post("api/audits/refresh").await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            print_success(&format!("Audit run {}", response.status));
            Ok(())
        }
    }
}
