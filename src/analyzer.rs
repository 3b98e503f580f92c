//! Analyzer: evaluates a Canary's declared metric checks against its gateway.

use crate::crd::MetricCheck;
use crate::gateway::{MetricsError, MetricsGateway};

/// Distinguishes an actual metric-threshold failure (charges the failure budget) from a query
/// error — a transport failure (does not charge the budget; the tick ends as an infrastructure
/// error instead, matching the engine's error-kind taxonomy). An unrecognized check name is
/// neither: it's a silent no-op, letting the remaining checks decide the outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    MetricFailed(String),
    CheckError(String),
}

/// Evaluates every metric in order, stopping at the first non-passing check, the same
/// fail-on-first-failure pattern as the corresponding multi-metric evaluator this is grounded
/// on. An empty metric list trivially passes. A check with an unrecognized name is skipped
/// rather than treated as a failure or an error.
pub async fn check(
    gateway: &dyn MetricsGateway,
    metrics: &[MetricCheck],
    target: &str,
    revision: &str,
) -> CheckOutcome {
    for metric in metrics {
        match gateway
            .evaluate(&metric.name, target, revision, metric.threshold)
            .await
        {
            Ok(true) => continue,
            Ok(false) => {
                return CheckOutcome::MetricFailed(format!(
                    "{} exceeded threshold {}",
                    metric.name, metric.threshold
                ))
            }
            Err(MetricsError::UnknownCheck(_)) => continue,
            Err(e) => return CheckOutcome::CheckError(format!("{} check errored: {e}", metric.name)),
        }
    }
    CheckOutcome::Pass
}

#[cfg(test)]
#[path = "analyzer_test.rs"]
mod tests;
