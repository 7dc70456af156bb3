//! Project group listing

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, GroupSummary};
use crate::output::{format_savings, print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Group")]
    group_key: String,
    #[tabled(rename = "Billing Account")]
    billing_account: String,
    #[tabled(rename = "Projects")]
    projects: String,
    #[tabled(rename = "Recommendations")]
    recommendations: usize,
    #[tabled(rename = "Issues")]
    issues: usize,
    #[tabled(rename = "Savings/mo")]
    savings: String,
}

pub async fn list_groups(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let groups: Vec<GroupSummary> = client.get("api/groups").await?;

    match format {
        OutputFormat::Json => print_json(&groups),
        OutputFormat::Table => {
            if groups.is_empty() {
                print_warning("No project groups found");
                return Ok(());
            }

            let rows: Vec<GroupRow> = groups
                .into_iter()
                .map(|g| GroupRow {
                    group_key: g.group_key,
                    billing_account: g.billing_account_id.unwrap_or_else(|| "-".to_string()),
                    projects: g.project_ids.join(", "),
                    recommendations: g.total_recommendations,
                    issues: g.issues,
                    savings: format_savings(g.potential_monthly_savings),
                })
                .collect();
            print_table(rows);
            Ok(())
        }
    }
}
