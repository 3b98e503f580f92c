use super::*;
use crate::crd::{AnalysisSpec, CanarySpec};

fn sample_canary() -> Canary {
    let mut canary = Canary::new(
        "app",
        CanarySpec {
            target_ref: "app".to_string(),
            analysis: AnalysisSpec {
                max_weight: 100,
                step_weight: 20,
                threshold: 2,
                metrics: vec![],
            },
        },
    );
    canary.metadata.namespace = Some("default".to_string());
    canary
}

#[tokio::test]
async fn test_records_info_warning_error_independently() {
    let recorder = MockEventRecorder::new();
    let canary = sample_canary();

    recorder.info(&canary, "starting").await;
    recorder.warning(&canary, "halt advancement").await;
    recorder.error(&canary, "route malformed").await;

    assert_eq!(
        recorder.events(),
        vec![
            (Severity::Info, "starting".to_string()),
            (Severity::Warning, "halt advancement".to_string()),
            (Severity::Error, "route malformed".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_events_accumulate_in_order() {
    let recorder = MockEventRecorder::new();
    let canary = sample_canary();

    for i in 0..3 {
        recorder.info(&canary, &format!("tick {i}")).await;
    }

    assert_eq!(recorder.events().len(), 3);
    assert_eq!(recorder.events()[1].1, "tick 1");
}
