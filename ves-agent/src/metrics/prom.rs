// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Range queries against a Prometheus-compatible HTTP API.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::debug;

use ves_common::hyper_migration::{self, Body};
use ves_common::{Endpoint, HttpClient};

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics backend query failed: {0}")]
    Query(String),
    #[error("query result cannot be converted into a matrix")]
    NotAMatrix,
    #[error("metrics backend request failed: {0}")]
    Network(String),
    #[error("metrics backend request timed out")]
    Timeout,
    #[error("cannot decode metrics backend response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cannot build metrics backend request: {0}")]
    Build(String),
}

/// Time range of a query, stepped by `step`.
#[derive(Clone, Copy, Debug)]
pub struct QueryRange {
    pub start: SystemTime,
    pub end: SystemTime,
    pub step: Duration,
}

/// One labeled series of `(timestamp, value)` samples.
#[derive(Clone, Debug, Default)]
pub struct Series {
    pub labels: HashMap<String, String>,
    pub samples: Vec<(SystemTime, f64)>,
}

pub type Matrix = Vec<Series>;

/// The southbound interface: anything that can evaluate an expression over
/// a time range into a matrix of labeled series.
pub trait MetricsSource {
    fn query_range(
        &self,
        expr: &str,
        range: &QueryRange,
    ) -> impl std::future::Future<Output = Result<Matrix, MetricsError>> + Send;
}

/// Prometheus HTTP API client (`GET /api/v1/query_range`).
pub struct PromClient {
    endpoint: Endpoint,
    client: HttpClient,
}

impl PromClient {
    pub fn new(address: &str, timeout: Duration) -> anyhow::Result<PromClient> {
        let url: hyper::Uri = address.parse()?;
        let connector = ves_common::connector::build_connector(None)?;
        Ok(PromClient {
            endpoint: Endpoint::from_url(url).with_timeout(timeout.as_millis() as u64),
            client: hyper_migration::new_client(connector),
        })
    }

    fn query_url(&self, expr: &str, range: &QueryRange) -> Result<hyper::Uri, MetricsError> {
        let base = self.endpoint.url.to_string();
        let mut url =
            url::Url::parse(&base).map_err(|e| MetricsError::Build(e.to_string()))?;
        url.set_path(&ves_common::join_path(url.path(), "api/v1/query_range"));
        url.query_pairs_mut()
            .append_pair("query", expr)
            .append_pair("start", &epoch_f64(range.start).to_string())
            .append_pair("end", &epoch_f64(range.end).to_string())
            .append_pair("step", &format!("{}s", range.step.as_secs()));
        url.as_str()
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| MetricsError::Build(e.to_string()))
    }
}

fn epoch_f64(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn from_epoch_f64(secs: f64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs_f64(secs.max(0.0))
}

#[derive(Deserialize)]
struct PromReply {
    status: String,
    #[serde(default)]
    data: Option<PromData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct PromData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<PromSeries>,
}

#[derive(Deserialize)]
struct PromSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl MetricsSource for PromClient {
    async fn query_range(&self, expr: &str, range: &QueryRange) -> Result<Matrix, MetricsError> {
        debug!(query = expr, "Prometheus query");
        let url = self.query_url(expr, range)?;
        let request = hyper::Request::builder()
            .uri(url)
            .method(hyper::Method::GET)
            .body(Body::empty())
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let timeout = Duration::from_millis(self.endpoint.timeout_ms);
        let response = match tokio::time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => hyper_migration::into_response(response),
            Ok(Err(e)) => return Err(MetricsError::Network(e.to_string())),
            Err(_) => return Err(MetricsError::Timeout),
        };
        let status = response.status();
        let bytes = hyper_migration::read_body_bytes(response.into_body())
            .await
            .map_err(|e| MetricsError::Network(e.to_string()))?;

        let reply: PromReply = serde_json::from_slice(&bytes)?;
        if reply.status != "success" {
            return Err(MetricsError::Query(
                reply
                    .error
                    .unwrap_or_else(|| format!("backend returned status {status}")),
            ));
        }
        let data = reply.data.ok_or(MetricsError::NotAMatrix)?;
        if data.result_type != "matrix" {
            return Err(MetricsError::NotAMatrix);
        }

        Ok(data
            .result
            .into_iter()
            .map(|series| Series {
                labels: series.metric,
                samples: series
                    .values
                    .into_iter()
                    .filter_map(|(ts, value)| {
                        value.parse::<f64>().ok().map(|v| (from_epoch_f64(ts), v))
                    })
                    .collect(),
            })
            .collect())
    }
}
