//! Monitoring query model
//!
//! A [`MetricQuery`] names one metric on one monitored resource. It is
//! turned into a [`TimeSeriesRequest`] with a filter expression and an
//! aligner, and the returned points are reduced to a single scalar.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use tracing::warn;

/// Metrics whose samples are delta distributions; mean alignment is invalid on them
pub const DISTRIBUTION_METRICS: &[&str] = &[
    "run.googleapis.com/container/cpu/utilizations",
    "run.googleapis.com/container/memory/utilizations",
    "run.googleapis.com/request_latencies",
];

/// Temporal aggregation applied per alignment period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aligner {
    Mean,
    Sum,
    Max,
    Min,
    Count,
    Delta,
    Rate,
}

impl Aligner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aligner::Mean => "ALIGN_MEAN",
            Aligner::Sum => "ALIGN_SUM",
            Aligner::Max => "ALIGN_MAX",
            Aligner::Min => "ALIGN_MIN",
            Aligner::Count => "ALIGN_COUNT",
            Aligner::Delta => "ALIGN_DELTA",
            Aligner::Rate => "ALIGN_RATE",
        }
    }
}

impl std::fmt::Display for Aligner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the aligner for a metric given the caller's aggregation name
pub fn select_aligner(metric_type: &str, aggregation: &str) -> Aligner {
    if DISTRIBUTION_METRICS.contains(&metric_type) {
        return Aligner::Delta;
    }

    match aggregation.to_ascii_lowercase().as_str() {
        "mean" => Aligner::Mean,
        "sum" => Aligner::Sum,
        "max" => Aligner::Max,
        "min" => Aligner::Min,
        "count" => Aligner::Count,
        "delta" => Aligner::Delta,
        "rate" => Aligner::Rate,
        other => {
            warn!(
                metric_type = %metric_type,
                aggregation = %other,
                "Unknown aggregation, falling back to mean"
            );
            Aligner::Mean
        }
    }
}

/// Closed time interval a query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window ending now and reaching `days` back
    pub fn last_days(days: u32) -> Self {
        let end = Utc::now();
        let start = end - ChronoDuration::days(i64::from(days.max(1)));
        Self { start, end }
    }
}

/// One metric on one monitored resource
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub metric_type: String,
    pub resource_kind: String,
    pub labels: BTreeMap<String, String>,
    pub aggregation: String,
    pub extra_filter: Option<String>,
}

impl MetricQuery {
    pub fn new(metric_type: impl Into<String>, resource_kind: impl Into<String>) -> Self {
        Self {
            metric_type: metric_type.into(),
            resource_kind: resource_kind.into(),
            labels: BTreeMap::new(),
            aggregation: "mean".to_string(),
            extra_filter: None,
        }
    }

    /// Constrain a resource label
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn aggregation(mut self, aggregation: impl Into<String>) -> Self {
        self.aggregation = aggregation.into();
        self
    }

    /// Additional clause conjoined to the filter, e.g. a metric label match
    pub fn extra_filter(mut self, clause: impl Into<String>) -> Self {
        self.extra_filter = Some(clause.into());
        self
    }

    /// Backend filter expression
    pub fn filter(&self) -> String {
        let mut clauses = vec![
            format!("resource.type=\"{}\"", self.resource_kind),
            format!("metric.type=\"{}\"", self.metric_type),
        ];
        clauses.extend(
            self.labels
                .iter()
                .map(|(k, v)| format!("resource.labels.{}=\"{}\"", k, v)),
        );
        if let Some(extra) = &self.extra_filter {
            clauses.push(extra.clone());
        }
        clauses.join(" AND ")
    }

    pub fn aligner(&self) -> Aligner {
        select_aligner(&self.metric_type, &self.aggregation)
    }
}

/// Fully built request handed to a [`super::TimeSeriesSource`]
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRequest {
    /// `projects/{id}`
    pub name: String,
    pub filter: String,
    pub window: TimeWindow,
    pub aligner: Aligner,
    pub alignment_period_secs: u64,
}

/// Value of a single sample point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointValue {
    Double(f64),
    Int64(i64),
    /// Histogram sample; only its mean is usable
    Distribution { count: i64, mean: f64 },
}

impl PointValue {
    /// Scalar contribution, or `None` for empty distributions
    pub fn scalar(&self) -> Option<f64> {
        match *self {
            PointValue::Double(v) => Some(v),
            PointValue::Int64(v) => Some(v as f64),
            PointValue::Distribution { count, mean } if count > 0 => Some(mean),
            PointValue::Distribution { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub points: Vec<PointValue>,
}

/// Mean over every usable point across all series; zero when none
pub fn reduce_points(series: &[TimeSeries]) -> f64 {
    let (sum, count) = series
        .iter()
        .flat_map(|s| s.points.iter())
        .filter_map(PointValue::scalar)
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_metrics_force_delta() {
        for metric in DISTRIBUTION_METRICS {
            assert_eq!(select_aligner(metric, "mean"), Aligner::Delta);
            assert_eq!(select_aligner(metric, "sum"), Aligner::Delta);
        }
    }

    #[test]
    fn test_aligner_from_aggregation() {
        let metric = "cloudsql.googleapis.com/database/cpu/utilization";
        assert_eq!(select_aligner(metric, "mean"), Aligner::Mean);
        assert_eq!(select_aligner(metric, "SUM"), Aligner::Sum);
        assert_eq!(select_aligner(metric, "max"), Aligner::Max);
        assert_eq!(select_aligner(metric, "min"), Aligner::Min);
        assert_eq!(select_aligner(metric, "median"), Aligner::Mean);
        assert_eq!(Aligner::Delta.to_string(), "ALIGN_DELTA");
    }

    #[test]
    fn test_filter_expression() {
        let query = MetricQuery::new("run.googleapis.com/request_count", "cloud_run_revision")
            .label("service_name", "api")
            .label("location", "us-central1")
            .aggregation("sum")
            .extra_filter("metric.label.response_code_class=\"startup\"");

        assert_eq!(
            query.filter(),
            "resource.type=\"cloud_run_revision\" AND \
             metric.type=\"run.googleapis.com/request_count\" AND \
             resource.labels.location=\"us-central1\" AND \
             resource.labels.service_name=\"api\" AND \
             metric.label.response_code_class=\"startup\""
        );
        assert_eq!(query.aligner(), Aligner::Sum);
    }

    #[test]
    fn test_reduce_numeric_points() {
        let series = vec![
            TimeSeries {
                points: vec![PointValue::Double(0.2), PointValue::Double(0.4)],
            },
            TimeSeries {
                points: vec![PointValue::Int64(3)],
            },
        ];
        assert!((reduce_points(&series) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_reduce_skips_empty_distributions() {
        let series = vec![TimeSeries {
            points: vec![
                PointValue::Distribution { count: 10, mean: 0.5 },
                PointValue::Distribution { count: 0, mean: 0.0 },
                PointValue::Distribution { count: 4, mean: 0.1 },
            ],
        }];
        assert!((reduce_points(&series) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_reduce_no_points() {
        assert_eq!(reduce_points(&[]), 0.0);
        assert_eq!(reduce_points(&[TimeSeries::default()]), 0.0);
    }

    #[test]
    fn test_last_days_window() {
        let window = TimeWindow::last_days(30);
        assert_eq!((window.end - window.start).num_days(), 30);
    }
}
