//! Savings summary

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, AuditOverview};
use crate::output::{format_savings, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct SavingsRow {
    #[tabled(rename = "Audit")]
    audit_type: String,
    #[tabled(rename = "Recommendations")]
    recommendations: usize,
    #[tabled(rename = "Savings/mo")]
    savings: String,
    #[tabled(rename = "Share")]
    share: String,
}

/// Savings per audit type, largest first
#[derive(Debug, Serialize)]
pub struct SavingsBreakdown {
    pub total_potential_savings: f64,
    pub by_audit_type: Vec<(String, f64)>,
}

impl SavingsBreakdown {
    pub fn from_overview(overview: &AuditOverview) -> Self {
        let mut by_audit_type: Vec<(String, f64)> = overview
            .results
            .iter()
            .map(|(t, r)| (t.clone(), r.potential_monthly_savings))
            .collect();
        by_audit_type.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            total_potential_savings: overview.total_potential_savings,
            by_audit_type,
        }
    }

    fn share(&self, amount: f64) -> f64 {
        if self.total_potential_savings > 0.0 {
            amount / self.total_potential_savings * 100.0
        } else {
            0.0
        }
    }
}

pub async fn show_savings(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let overview: AuditOverview = client.get("api/audits").await?;
    let breakdown = SavingsBreakdown::from_overview(&overview);

    if format == OutputFormat::Json {
        return print_json(&breakdown);
    }

    let rows: Vec<SavingsRow> = breakdown
        .by_audit_type
        .iter()
        .map(|(audit_type, amount)| SavingsRow {
            audit_type: audit_type.clone(),
            recommendations: overview
                .results
                .get(audit_type)
                .map_or(0, |r| r.recommendations.len()),
            savings: format_savings(*amount),
            share: format!("{:.1}%", breakdown.share(*amount)),
        })
        .collect();
    print_table(rows);

    println!(
        "\n{} {}",
        "Potential Savings:".bold(),
        format_savings(breakdown.total_potential_savings).green().bold()
    );
    Ok(())
}
