//! Signal source abstraction and the Prometheus implementation
//!
//! The reconciler consumes signals through the [`MetricsSource`] capability;
//! [`PrometheusSource`] implements it against the Prometheus HTTP query API.
//! Latency getters return SECONDS (the native unit of the histogram
//! queries); the reconciler converts to milliseconds when comparing against
//! targets.

use async_trait::async_trait;
use serde::Deserialize;

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Default query for P99 inference latency, in seconds
pub const DEFAULT_P99_QUERY: &str =
    "histogram_quantile(0.99, sum(rate(inference_request_duration_seconds_bucket[5m])) by (le))";

/// Default query for P95 inference latency, in seconds
pub const DEFAULT_P95_QUERY: &str =
    "histogram_quantile(0.95, sum(rate(inference_request_duration_seconds_bucket[5m])) by (le))";

/// Default query for GPU utilization percentage
pub const DEFAULT_GPU_QUERY: &str = "avg(DCGM_FI_DEV_GPU_UTIL)";

/// Default query for total request queue depth
pub const DEFAULT_QUEUE_QUERY: &str = "sum(inference_request_queue_depth)";

/// Capability for fetching current signal values
///
/// Each getter accepts a custom query string; an empty string selects the
/// built-in default query. A transport-level failure reaching the source
/// surfaces as [`Error::MetricsUnavailable`]; a query that returned no data
/// surfaces as a per-signal [`Error::MetricFetch`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Current P99 latency in seconds
    async fn latency_p99(&self, query: &str) -> Result<f64>;

    /// Current P95 latency in seconds
    async fn latency_p95(&self, query: &str) -> Result<f64>;

    /// Current GPU utilization in percent
    async fn gpu_utilization(&self, query: &str) -> Result<f64>;

    /// Current request queue depth
    async fn queue_depth(&self, query: &str) -> Result<i64>;
}

// -----------------------------------------------------------------------------
// Prometheus HTTP API response shapes
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<VectorSample>),
    Scalar(SampleValue),
    Matrix(serde_json::Value),
    String(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    value: SampleValue,
}

/// A Prometheus sample: `[unix_timestamp, "value"]`
#[derive(Debug, Deserialize)]
struct SampleValue(#[allow(dead_code)] f64, String);

/// Pull the single numeric value out of a query response
fn extract_value(response: QueryResponse) -> std::result::Result<f64, String> {
    if response.status != "success" {
        return Err(format!("query returned status {:?}", response.status));
    }
    match response.data {
        Some(QueryData::Vector(samples)) => match samples.first() {
            Some(sample) => sample
                .value
                .1
                .parse::<f64>()
                .map_err(|e| format!("unparseable sample value: {e}")),
            None => Err("no data returned from query".to_string()),
        },
        Some(QueryData::Scalar(value)) => value
            .1
            .parse::<f64>()
            .map_err(|e| format!("unparseable sample value: {e}")),
        Some(other) => Err(format!("unexpected result type: {other:?}")),
        None => Err("response carried no data".to_string()),
    }
}

/// Prometheus-backed metrics source
///
/// Queries the instant-query endpoint (`/api/v1/query`) of the configured
/// server. One client is shared across all policies; reqwest multiplexes
/// connections internally.
#[derive(Clone)]
pub struct PrometheusSource {
    client: reqwest::Client,
    base_url: String,
}

impl PrometheusSource {
    /// Create a source against the given Prometheus base URL
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::metrics_unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: address.into().trim_end_matches('/').to_string(),
        })
    }

    /// Execute an instant query and return its single numeric value
    async fn query(&self, signal: &str, query: &str) -> Result<f64> {
        let url = format!("{}/api/v1/query", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    // The source itself is unreachable - this aborts the
                    // whole snapshot rather than degrading one signal.
                    Error::metrics_unavailable(e.to_string())
                } else {
                    Error::metric_fetch(signal, e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::metric_fetch(
                signal,
                format!("prometheus returned HTTP {}", response.status()),
            ));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::metric_fetch(signal, e.to_string()))?;

        extract_value(body).map_err(|message| Error::metric_fetch(signal, message))
    }
}

#[async_trait]
impl MetricsSource for PrometheusSource {
    async fn latency_p99(&self, query: &str) -> Result<f64> {
        let query = if query.is_empty() {
            DEFAULT_P99_QUERY
        } else {
            query
        };
        self.query("latency_p99", query).await
    }

    async fn latency_p95(&self, query: &str) -> Result<f64> {
        let query = if query.is_empty() {
            DEFAULT_P95_QUERY
        } else {
            query
        };
        self.query("latency_p95", query).await
    }

    async fn gpu_utilization(&self, query: &str) -> Result<f64> {
        let query = if query.is_empty() {
            DEFAULT_GPU_QUERY
        } else {
            query
        };
        self.query("gpu_utilization", query).await
    }

    async fn queue_depth(&self, query: &str) -> Result<i64> {
        let query = if query.is_empty() {
            DEFAULT_QUEUE_QUERY
        } else {
            query
        };
        let value = self.query("queue_depth", query).await?;
        Ok(value as i64)
    }
}
