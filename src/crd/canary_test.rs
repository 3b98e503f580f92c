use super::*;

#[test]
fn test_state_serializes_kebab_case() {
    assert_eq!(
        serde_json::to_string(&CanaryState::PromotionFinished).unwrap(),
        "\"promotion-finished\""
    );
    assert_eq!(
        serde_json::to_string(&CanaryState::PromotionFailed).unwrap(),
        "\"promotion-failed\""
    );
    assert_eq!(
        serde_json::to_string(&CanaryState::Initialized).unwrap(),
        "\"initialized\""
    );
    assert_eq!(
        serde_json::to_string(&CanaryState::Running).unwrap(),
        "\"running\""
    );
}

#[test]
fn test_max_weight_defaults_to_100() {
    let json = serde_json::json!({
        "stepWeight": 20,
        "threshold": 2,
    });
    let analysis: AnalysisSpec = serde_json::from_value(json).unwrap();
    assert_eq!(analysis.max_weight, 100);
}

#[test]
fn test_metrics_default_to_empty() {
    let json = serde_json::json!({
        "maxWeight": 100,
        "stepWeight": 20,
        "threshold": 2,
    });
    let analysis: AnalysisSpec = serde_json::from_value(json).unwrap();
    assert!(analysis.metrics.is_empty());
}

#[test]
fn test_status_round_trips_through_json() {
    let status = CanaryStatus {
        state: Some(CanaryState::Running),
        canary_revision: Some("abc1234567".to_string()),
        failed_checks: 1,
    };
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["state"], "running");
    assert_eq!(json["canaryRevision"], "abc1234567");
    assert_eq!(json["failedChecks"], 1);

    let round_tripped: CanaryStatus = serde_json::from_value(json).unwrap();
    assert_eq!(round_tripped.failed_checks, 1);
    assert_eq!(round_tripped.state, Some(CanaryState::Running));
}

#[test]
fn test_empty_status_has_no_state() {
    let status = CanaryStatus::default();
    assert!(status.state.is_none());
    assert!(status.canary_revision.is_none());
    assert_eq!(status.failed_checks, 0);
}
