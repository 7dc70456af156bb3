//! Folding per-scope tallies into audit results

use crate::models::{AuditResult, OptimizationRecommendation};

/// What one scope scan produced, owned by a single worker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeTally {
    pub total_count: u64,
    pub untagged_count: u64,
    pub idle_count: u64,
    pub over_provisioned_count: u64,
    pub issues: Vec<String>,
    pub recommendations: Vec<OptimizationRecommendation>,
}

impl ScopeTally {
    pub fn with_issue(issue: impl Into<String>) -> Self {
        Self {
            issues: vec![issue.into()],
            ..Default::default()
        }
    }
}

/// Sum counts and concatenate issues and recommendations in input order
///
/// Savings are recomputed from the final recommendation list.
pub fn aggregate(
    resource_type: &str,
    tallies: impl IntoIterator<Item = ScopeTally>,
) -> AuditResult {
    let mut result = AuditResult::empty(resource_type);

    for tally in tallies {
        result.total_count += tally.total_count;
        result.untagged_count += tally.untagged_count;
        result.idle_count += tally.idle_count;
        result.over_provisioned_count += tally.over_provisioned_count;
        result.issues.extend(tally.issues);
        result.recommendations.extend(tally.recommendations);
    }

    result.potential_monthly_savings = result.recommended_savings();
    result
}

/// Merge one audit type across projects; issues are prefixed with their project
pub fn merge_results<'a>(
    resource_type: &str,
    results: impl IntoIterator<Item = (&'a str, &'a AuditResult)>,
) -> AuditResult {
    aggregate(
        resource_type,
        results.into_iter().map(|(project_id, result)| ScopeTally {
            total_count: result.total_count,
            untagged_count: result.untagged_count,
            idle_count: result.idle_count,
            over_provisioned_count: result.over_provisioned_count,
            issues: result
                .issues
                .iter()
                .map(|issue| format!("[{}] {}", project_id, issue))
                .collect(),
            recommendations: result.recommendations.clone(),
        }),
    )
}
