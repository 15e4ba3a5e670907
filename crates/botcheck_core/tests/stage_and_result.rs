use botcheck_core::{validate_event, Priority, ScoringResult, SignalValue, Stage};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn stage_defaults_match_pipeline_order() {
    let percents: Vec<f64> = Stage::ALL.iter().map(|s| s.default_percent()).collect();
    assert_eq!(percents, vec![5.0, 25.0, 45.0, 65.0, 85.0, 100.0, 0.0]);
    assert_eq!(Stage::Analyzing.display_name(), "Analyzing Patterns");
    assert!(Stage::Completed.is_terminal());
    assert!(Stage::Error.is_terminal());
    assert!(!Stage::Saving.is_terminal());
}

#[test]
fn missing_percent_derives_from_stage() {
    let event = validate_event(&json!({"jobId": "J1", "stage": "analyzing", "message": "x"}))
        .unwrap();
    assert_eq!(event.progress_percent(), 85.0);

    let event = validate_event(&json!({
        "jobId": "J1", "stage": "analyzing", "message": "x", "percent": 90
    }))
    .unwrap();
    assert_eq!(event.progress_percent(), 90.0);
}

fn sample_result() -> serde_json::Value {
    json!({
        "human_score": 72,
        "confidence": 64.5,
        "summary_bullets": ["Posts at human hours", "Varied vocabulary"],
        "top_signals": [
            {"signal": "posting_cadence", "value": 0.42, "weight": 0.3, "explain": "irregular"},
            {"signal": "verified", "value": false, "weight": 0.1, "explain": "not verified"},
            {"signal": "bio", "value": "crypto", "weight": 0.05, "explain": "keyword"}
        ],
        "action_table": [
            {"action": "Review followers", "priority": "high", "rationale": "spike", "estimated_effort": "1h"}
        ],
        "username": "alice"
    })
}

#[test]
fn completed_event_carries_scoring_result() {
    let event = validate_event(&json!({
        "jobId": "J1",
        "stage": "completed",
        "message": "done",
        "data": sample_result()
    }))
    .unwrap();

    let result = event.scoring_result().expect("result");
    assert_eq!(result.human_score, 72.0);
    assert_eq!(result.top_signals[0].value, SignalValue::Number(0.42));
    assert_eq!(result.top_signals[1].value, SignalValue::Bool(false));
    assert_eq!(result.top_signals[2].value, SignalValue::Text("crypto".into()));
    assert_eq!(result.action_table[0].priority, Priority::High);
    assert_eq!(result.username.as_deref(), Some("alice"));
    assert_eq!(result.analysis_date, None);
}

#[test]
fn scoring_result_ignored_on_non_terminal_stage_or_bad_scores() {
    let event = validate_event(&json!({
        "jobId": "J1", "stage": "analyzing", "message": "x", "data": sample_result()
    }))
    .unwrap();
    assert!(event.scoring_result().is_none());

    let mut bad = sample_result();
    bad["human_score"] = json!(101);
    let parsed: ScoringResult = serde_json::from_value(bad.clone()).unwrap();
    assert!(parsed.validate().is_err());

    let event = validate_event(&json!({
        "jobId": "J1", "stage": "completed", "message": "x", "data": bad
    }))
    .unwrap();
    assert!(event.scoring_result().is_none());
}

#[test]
fn events_serialize_with_wire_field_names() {
    let event = validate_event(&json!({
        "jobId": "J1",
        "stage": "started",
        "message": "x",
        "timestamp": "2024-01-01T00:00:00.000Z"
    }))
    .unwrap();
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({
            "jobId": "J1",
            "stage": "started",
            "message": "x",
            "timestamp": "2024-01-01T00:00:00.000Z"
        })
    );
}
