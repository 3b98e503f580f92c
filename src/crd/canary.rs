//! Canary is the Custom Resource driving the rollout control core.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Canary is a Custom Resource describing a progressive rollout policy for one target workload.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "vaaka.io",
    version = "v1alpha1",
    kind = "Canary",
    namespaced,
    status = "CanaryStatus",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Weight", "type":"integer", "jsonPath":".status.currentWeight"}"#,
    printcolumn = r#"{"name":"FailedChecks", "type":"integer", "jsonPath":".status.failedChecks"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CanarySpec {
    /// Logical name of the stable workload. The candidate workload shares this name;
    /// the primary workload is named `<targetRef>-primary`.
    pub target_ref: String,

    /// Analysis configuration governing the traffic shift and rollback budget.
    pub analysis: AnalysisSpec,
}

/// Analysis configuration: traffic progression and the metric checks that gate it.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSpec {
    /// Upper bound of candidate traffic share before promotion, in [1, 100].
    #[serde(default = "default_max_weight")]
    pub max_weight: i32,

    /// Weight delta applied to the candidate per tick, in [1, 100].
    pub step_weight: i32,

    /// Maximum tolerated failed metric checks before rollback.
    pub threshold: i32,

    /// Ordered list of metric checks evaluated each tick the candidate carries traffic.
    #[serde(default)]
    pub metrics: Vec<MetricCheck>,
}

fn default_max_weight() -> i32 {
    100
}

/// A single metric check: a named query evaluated over an interval against a threshold.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricCheck {
    /// Recognized names: `success-rate-counter`, `request-duration-high`. Others are ignored.
    pub name: String,

    /// Time window the metric is evaluated over, e.g. "1m".
    pub interval: String,

    /// Threshold compared against the observed value; interpretation depends on `name`.
    pub threshold: f64,
}

/// Rollout state, as enumerated in the data model. No catch-all variant — a Canary with no
/// status at all (`status: None`) is the `∅` state; every other member of the enumeration is
/// represented explicitly.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CanaryState {
    Initialized,
    Running,
    PromotionFinished,
    PromotionFailed,
}

/// Persisted status: the entirety of the core's durable state for one Canary.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CanaryStatus {
    pub state: Option<CanaryState>,

    /// Fingerprint of the candidate pod template at the last observed transition.
    pub canary_revision: Option<String>,

    /// Cumulative failed-metric-check counter, bounded by `analysis.threshold`.
    #[serde(default)]
    pub failed_checks: i32,
}
