//! Recommendation listing

use anyhow::Result;
use tabled::Tabled;

use crate::client::{recommendations_path, ApiClient, Recommendation};
use crate::output::{
    color_priority, format_savings, print_json, print_table, print_warning, truncate,
    OutputFormat,
};

/// Row for recommendations table
#[derive(Tabled)]
struct RecommendationRow {
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Location")]
    region: String,
    #[tabled(rename = "Recommendation")]
    recommendation: String,
    #[tabled(rename = "Savings/mo")]
    savings: String,
}

/// List recommendations, most urgent first
pub async fn list_recommendations(
    client: &ApiClient,
    priority: Option<String>,
    resource_type: Option<String>,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let path = recommendations_path(priority.as_deref(), resource_type.as_deref(), limit);
    let recommendations: Vec<Recommendation> = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&recommendations),
        OutputFormat::Table => {
            if recommendations.is_empty() {
                print_warning("No recommendations found");
                return Ok(());
            }

            let total: f64 = recommendations
                .iter()
                .map(|r| r.potential_monthly_savings)
                .sum();
            let count = recommendations.len();

            let rows: Vec<RecommendationRow> = recommendations
                .into_iter()
                .map(|r| RecommendationRow {
                    priority: color_priority(&r.priority),
                    resource_type: r.resource_type,
                    resource: r.resource_name,
                    region: r.region,
                    recommendation: truncate(&r.recommendation, 60),
                    savings: format_savings(r.potential_monthly_savings),
                })
                .collect();
            print_table(rows);

            println!(
                "\nTotal: {} recommendations, {} per month",
                count,
                format_savings(total)
            );
            Ok(())
        }
    }
}
