//! MetricsGateway: queries Prometheus and evaluates a single metric check.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Prometheus HTTP error: {0}")]
    Http(String),

    #[error("unrecognized metric check name: {0}")]
    UnknownCheck(String),

    #[error("failed to parse Prometheus response: {0}")]
    Parse(String),

    #[error("no data returned from Prometheus")]
    NoData,

    #[error("invalid metric value: {0}")]
    InvalidValue(String),
}

/// Builds the PromQL query for a recognized metric check name. A name outside this set is
/// `UnknownCheck`, which the analyzer treats as a no-op — see the component design.
fn build_query(check_name: &str, target: &str, revision: &str) -> Result<String, MetricsError> {
    match check_name {
        "success-rate-counter" => Ok(format!(
            r#"sum(rate(http_requests_total{{status=~"5..",target="{target}",revision="{revision}"}}[2m])) / sum(rate(http_requests_total{{target="{target}",revision="{revision}"}}[2m])) * 100"#,
        )),
        "request-duration-high" => Ok(format!(
            r#"histogram_quantile(0.95, rate(http_request_duration_seconds_bucket{{target="{target}",revision="{revision}"}}[2m]))"#,
        )),
        other => Err(MetricsError::UnknownCheck(other.to_string())),
    }
}

/// Prometheus reports `request-duration-high` in seconds; the threshold is specified in
/// milliseconds, so the raw query result needs converting before comparison.
fn normalize(check_name: &str, value: f64) -> f64 {
    match check_name {
        "request-duration-high" => value * 1000.0,
        _ => value,
    }
}

#[derive(Debug, Deserialize)]
struct PrometheusResponse {
    status: String,
    data: PrometheusData,
}

#[derive(Debug, Deserialize)]
struct PrometheusData {
    result: Vec<PrometheusResult>,
}

#[derive(Debug, Deserialize)]
struct PrometheusResult {
    value: (i64, String),
}

fn parse_instant_query(body: &str) -> Result<f64, MetricsError> {
    let response: PrometheusResponse =
        serde_json::from_str(body).map_err(|e| MetricsError::Parse(format!("invalid JSON: {e}")))?;

    if response.status != "success" {
        return Err(MetricsError::Http(format!(
            "query failed with status: {}",
            response.status
        )));
    }

    let result = response.data.result.first().ok_or(MetricsError::NoData)?;
    let value = result
        .value
        .1
        .parse::<f64>()
        .map_err(|e| MetricsError::Parse(format!("invalid value: {e}")))?;

    if value.is_nan() {
        return Err(MetricsError::InvalidValue("NaN".to_string()));
    }
    if value.is_infinite() {
        return Err(MetricsError::InvalidValue("infinity".to_string()));
    }

    Ok(value)
}

/// Queries Prometheus for a named metric check and reports whether it passed its threshold.
///
/// `evaluate` has a default implementation so a single `query_instant` is all a new backend
/// needs to supply; the threshold comparison direction is fixed by the check name, matching the
/// data model's `MetricCheck`.
#[async_trait]
pub trait MetricsGateway: Send + Sync {
    async fn query_instant(&self, query: &str) -> Result<f64, MetricsError>;

    async fn evaluate(
        &self,
        check_name: &str,
        target: &str,
        revision: &str,
        threshold: f64,
    ) -> Result<bool, MetricsError> {
        let query = build_query(check_name, target, revision)?;
        let value = normalize(check_name, self.query_instant(&query).await?);
        match check_name {
            "success-rate-counter" => Ok(value >= threshold),
            "request-duration-high" => Ok(value <= threshold),
            other => Err(MetricsError::UnknownCheck(other.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct HttpMetricsGateway {
    address: String,
    client: reqwest::Client,
}

impl HttpMetricsGateway {
    pub fn new(address: String) -> Self {
        Self {
            address,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MetricsGateway for HttpMetricsGateway {
    async fn query_instant(&self, query: &str) -> Result<f64, MetricsError> {
        let url = format!("{}/api/v1/query", self.address);
        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| MetricsError::Http(format!("request failed: {e}")))?;

        let body = response
            .text()
            .await
            .map_err(|e| MetricsError::Http(format!("failed to read response: {e}")))?;

        parse_instant_query(&body)
    }
}

/// Supports two modes: a single canned response via `set_mock_response`, or a FIFO
/// `enqueue_response`/`enqueue_error` queue for scripting multi-tick scenarios.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockMetricsGateway {
    mock_response: std::sync::Arc<std::sync::Mutex<Option<String>>>,
    response_queue: std::sync::Arc<std::sync::Mutex<Vec<Result<f64, MetricsError>>>>,
}

#[cfg(test)]
impl MockMetricsGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mock_response(&self, response: String) {
        *self.mock_response.lock().unwrap() = Some(response);
    }

    pub fn enqueue_response(&self, value: f64) {
        self.response_queue.lock().unwrap().push(Ok(value));
    }

    pub fn enqueue_error(&self, error: MetricsError) {
        self.response_queue.lock().unwrap().push(Err(error));
    }
}

#[cfg(test)]
#[async_trait]
impl MetricsGateway for MockMetricsGateway {
    async fn query_instant(&self, _query: &str) -> Result<f64, MetricsError> {
        if let Some(next) = {
            let mut queue = self.response_queue.lock().unwrap();
            if queue.is_empty() { None } else { Some(queue.remove(0)) }
        } {
            return next;
        }
        let mock = self.mock_response.lock().unwrap();
        let response = mock
            .as_ref()
            .ok_or_else(|| MetricsError::Http("no mock response set".to_string()))?;
        parse_instant_query(response)
    }
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod tests;
