//! Metric retrieval from the time-series monitoring backend
//!
//! [`MetricClient::query_metric`] is a best-effort signal source: every
//! failure path ends in `0.0` and a log line, never an error. Transient
//! backend errors are retried according to a [`RetryPolicy`].

mod query;
mod retry;

pub use query::{
    reduce_points, select_aligner, Aligner, MetricQuery, PointValue, TimeSeries,
    TimeSeriesRequest, TimeWindow, DISTRIBUTION_METRICS,
};
pub use retry::RetryPolicy;

use crate::error::{AuditError, Result};
use crate::observability::AuditMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Alignment period for every query (one hour)
pub const ALIGNMENT_PERIOD: Duration = Duration::from_secs(3600);

/// Time-series query backend
#[async_trait]
pub trait TimeSeriesSource: Send + Sync {
    async fn list_time_series(&self, request: &TimeSeriesRequest) -> Result<Vec<TimeSeries>>;
}

/// Scalar metric lookups for one project
#[derive(Clone)]
pub struct MetricClient {
    source: Option<Arc<dyn TimeSeriesSource>>,
    project_id: String,
    retry: RetryPolicy,
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
    metrics: AuditMetrics,
}

impl MetricClient {
    /// A client without a source answers every query with zero
    pub fn new(source: Option<Arc<dyn TimeSeriesSource>>, project_id: impl Into<String>) -> Self {
        Self {
            source,
            project_id: project_id.into(),
            retry: RetryPolicy::default(),
            cancel: None,
            deadline: None,
            metrics: AuditMetrics::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stop retrying once the flag flips to `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Stop retrying when the next attempt would start after `deadline`
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    /// Mean of the metric over `window`, or `0.0` when it cannot be read
    pub async fn query_metric(&self, query: &MetricQuery, window: &TimeWindow) -> f64 {
        let Some(source) = self.source.as_ref() else {
            debug!(
                metric_type = %query.metric_type,
                "No monitoring backend configured, returning zero"
            );
            return 0.0;
        };

        let request = TimeSeriesRequest {
            name: format!("projects/{}", self.project_id),
            filter: query.filter(),
            window: *window,
            aligner: query.aligner(),
            alignment_period_secs: ALIGNMENT_PERIOD.as_secs(),
        };

        let start = Instant::now();
        let outcome = self.execute(source.as_ref(), &request).await;
        self.metrics
            .observe_query_latency(start.elapsed().as_secs_f64());

        match outcome {
            Ok(series) => reduce_points(&series),
            Err(err) => {
                self.metrics.inc_query_failures(err.reason());
                match &err {
                    AuditError::PermissionDenied(_) => warn!(
                        project_id = %self.project_id,
                        metric_type = %query.metric_type,
                        error = %err,
                        "Permission denied reading metric"
                    ),
                    AuditError::NotFound(_) => debug!(
                        project_id = %self.project_id,
                        metric_type = %query.metric_type,
                        "Metric not found"
                    ),
                    _ => error!(
                        project_id = %self.project_id,
                        metric_type = %query.metric_type,
                        resource_kind = %query.resource_kind,
                        labels = ?query.labels,
                        aligner = %request.aligner,
                        error = %err,
                        "Failed to query metric"
                    ),
                }
                0.0
            }
        }
    }

    async fn execute(
        &self,
        source: &dyn TimeSeriesSource,
        request: &TimeSeriesRequest,
    ) -> Result<Vec<TimeSeries>> {
        let started = Instant::now();
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match source.list_time_series(request).await {
                Ok(series) => return Ok(series),
                Err(err) => err,
            };

            if !self.retry.should_retry(&err) {
                return Err(err);
            }

            let delay = self.retry.backoff_for(attempt - 1);
            let over_budget = started.elapsed() + delay > self.retry.deadline;
            let past_deadline = self
                .deadline
                .map(|deadline| Instant::now() + delay > deadline)
                .unwrap_or(false);

            if attempt >= max_attempts || over_budget || past_deadline || self.is_cancelled() {
                return Err(err);
            }

            debug!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient monitoring error, retrying"
            );
            self.metrics.inc_query_retries();

            if !self.pause(delay).await {
                debug!("Metric query cancelled during backoff");
                return Err(err);
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Sleep for `delay`; false when cancelled first
    async fn pause(&self, delay: Duration) -> bool {
        let Some(mut cancel) = self.cancel.clone() else {
            tokio::time::sleep(delay).await;
            return true;
        };

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                changed = cancel.changed() => {
                    if changed.is_err() {
                        // Sender gone, nobody can cancel any more
                        (&mut sleep).await;
                        return true;
                    }
                    if *cancel.borrow() {
                        return false;
                    }
                }
            }
        }
    }
}
