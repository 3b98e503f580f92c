use super::*;

fn success_json(value: &str) -> String {
    format!(
        r#"{{"status":"success","data":{{"resultType":"vector","result":[{{"metric":{{}},"value":[1234567890,"{value}"]}}]}}}}"#
    )
}

#[test]
fn test_build_query_known_names() {
    assert!(build_query("success-rate-counter", "app", "r1").unwrap().contains("http_requests_total"));
    assert!(build_query("request-duration-high", "app", "r1").unwrap().contains("histogram_quantile"));
}

#[test]
fn test_build_query_unknown_name() {
    let err = build_query("made-up-check", "app", "r1").unwrap_err();
    assert!(matches!(err, MetricsError::UnknownCheck(name) if name == "made-up-check"));
}

#[test]
fn test_parse_instant_query_rejects_nan_and_infinity() {
    assert!(matches!(
        parse_instant_query(&success_json("NaN")),
        Err(MetricsError::InvalidValue(_))
    ));
    assert!(matches!(
        parse_instant_query(&success_json("inf")),
        Err(MetricsError::InvalidValue(_))
    ));
}

#[test]
fn test_parse_instant_query_no_data() {
    let body = r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
    assert!(matches!(parse_instant_query(body), Err(MetricsError::NoData)));
}

#[test]
fn test_parse_instant_query_non_success_status() {
    let body = r#"{"status":"error","data":{"resultType":"vector","result":[]}}"#;
    assert!(matches!(parse_instant_query(body), Err(MetricsError::Http(_))));
}

#[tokio::test]
async fn test_evaluate_success_rate_passes_when_value_at_or_above_threshold() {
    let gw = MockMetricsGateway::new();
    gw.set_mock_response(success_json("5.0"));
    let passed = gw
        .evaluate("success-rate-counter", "app", "r1", 1.0)
        .await
        .unwrap();
    assert!(passed);
}

#[tokio::test]
async fn test_evaluate_success_rate_fails_when_value_below_threshold() {
    let gw = MockMetricsGateway::new();
    gw.set_mock_response(success_json("0.5"));
    let passed = gw
        .evaluate("success-rate-counter", "app", "r1", 1.0)
        .await
        .unwrap();
    assert!(!passed);
}

#[tokio::test]
async fn test_evaluate_request_duration_passes_when_within_threshold() {
    let gw = MockMetricsGateway::new();
    // 0.2s reported by Prometheus, converted to 200ms, under a 2000ms threshold.
    gw.set_mock_response(success_json("0.2"));
    let passed = gw
        .evaluate("request-duration-high", "app", "r1", 2000.0)
        .await
        .unwrap();
    assert!(passed);
}

#[tokio::test]
async fn test_evaluate_request_duration_fails_when_over_threshold_in_milliseconds() {
    let gw = MockMetricsGateway::new();
    // 3.0s reported by Prometheus, converted to 3000ms, over a 2000ms threshold.
    gw.set_mock_response(success_json("3.0"));
    let passed = gw
        .evaluate("request-duration-high", "app", "r1", 2000.0)
        .await
        .unwrap();
    assert!(!passed);
}

#[tokio::test]
async fn test_evaluate_unknown_check_errors_before_querying() {
    let gw = MockMetricsGateway::new();
    let err = gw.evaluate("nonsense", "app", "r1", 1.0).await.unwrap_err();
    assert!(matches!(err, MetricsError::UnknownCheck(_)));
}

#[tokio::test]
async fn test_response_queue_drains_in_fifo_order() {
    let gw = MockMetricsGateway::new();
    gw.enqueue_response(0.1);
    gw.enqueue_response(9.9);

    assert_eq!(gw.query_instant("q").await.unwrap(), 0.1);
    assert_eq!(gw.query_instant("q").await.unwrap(), 9.9);
}

#[tokio::test]
async fn test_queue_takes_priority_over_single_response() {
    let gw = MockMetricsGateway::new();
    gw.set_mock_response(success_json("42.0"));
    gw.enqueue_response(1.0);

    assert_eq!(gw.query_instant("q").await.unwrap(), 1.0);
    assert_eq!(gw.query_instant("q").await.unwrap(), 42.0);
}
