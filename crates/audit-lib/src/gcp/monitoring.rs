//! Time-series reads from the monitoring API

use super::client::{int_from_string, Page, RestClient};
use crate::error::Result;
use crate::metrics::{PointValue, TimeSeries, TimeSeriesRequest, TimeSeriesSource};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Deserialize;

pub struct MonitoringClient {
    rest: RestClient,
    base: String,
}

impl MonitoringClient {
    pub fn new(rest: RestClient, base: impl Into<String>) -> Self {
        Self {
            rest,
            base: base.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTimeSeriesResponse {
    #[serde(default)]
    time_series: Vec<WireSeries>,
    next_page_token: Option<String>,
}

impl Page for ListTimeSeriesResponse {
    type Item = TimeSeries;

    fn into_parts(self) -> (Vec<TimeSeries>, Option<String>) {
        let series = self
            .time_series
            .into_iter()
            .map(|s| TimeSeries {
                points: s.points.into_iter().filter_map(|p| p.value.into_point()).collect(),
            })
            .collect();
        (series, self.next_page_token)
    }
}

#[derive(Deserialize)]
struct WireSeries {
    #[serde(default)]
    points: Vec<WirePoint>,
}

#[derive(Deserialize)]
struct WirePoint {
    value: WireValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireValue {
    double_value: Option<f64>,
    #[serde(default, deserialize_with = "int_from_string")]
    int64_value: Option<i64>,
    distribution_value: Option<WireDistribution>,
}

#[derive(Deserialize)]
struct WireDistribution {
    #[serde(default, deserialize_with = "int_from_string")]
    count: Option<i64>,
    #[serde(default)]
    mean: f64,
}

impl WireValue {
    fn into_point(self) -> Option<PointValue> {
        if let Some(v) = self.double_value {
            return Some(PointValue::Double(v));
        }
        if let Some(v) = self.int64_value {
            return Some(PointValue::Int64(v));
        }
        self.distribution_value.map(|d| PointValue::Distribution {
            count: d.count.unwrap_or(0),
            mean: d.mean,
        })
    }
}

#[async_trait]
impl TimeSeriesSource for MonitoringClient {
    async fn list_time_series(&self, request: &TimeSeriesRequest) -> Result<Vec<TimeSeries>> {
        let mut url = self
            .rest
            .url(&self.base, &format!("/v3/{}/timeSeries", request.name))?;
        url.query_pairs_mut()
            .append_pair("filter", &request.filter)
            .append_pair(
                "interval.startTime",
                &request.window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .append_pair(
                "interval.endTime",
                &request.window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .append_pair(
                "aggregation.alignmentPeriod",
                &format!("{}s", request.alignment_period_secs),
            )
            .append_pair("aggregation.perSeriesAligner", request.aligner.as_str())
            .append_pair("view", "FULL");

        self.rest.list_all::<ListTimeSeriesResponse>(url).await
    }
}
