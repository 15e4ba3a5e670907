use botcheck_core::{validate_event, InvalidEvent, Stage};
use serde_json::json;

#[test]
fn accepts_minimal_event_without_timestamp() {
    let event = validate_event(&json!({
        "jobId": "J1",
        "stage": "fetching",
        "message": "Fetching profile"
    }))
    .expect("valid event");

    assert_eq!(event.job_id, "J1");
    assert_eq!(event.stage, Stage::Fetching);
    assert_eq!(event.timestamp, None);
    assert_eq!(event.percent, None);
}

#[test]
fn rejects_unknown_stage() {
    let err = validate_event(&json!({"jobId": "J1", "stage": "bogus", "message": "x"}))
        .unwrap_err();
    assert!(matches!(err, InvalidEvent::Malformed(_)));
}

#[test]
fn rejects_missing_or_empty_required_fields() {
    let missing = validate_event(&json!({"stage": "started", "message": "x"})).unwrap_err();
    assert!(matches!(missing, InvalidEvent::Malformed(_)));

    let empty_job = validate_event(&json!({"jobId": "", "stage": "started", "message": "x"}))
        .unwrap_err();
    assert_eq!(empty_job, InvalidEvent::EmptyField("jobId"));

    let empty_message =
        validate_event(&json!({"jobId": "J1", "stage": "started", "message": "  "}))
            .unwrap_err();
    assert_eq!(empty_message, InvalidEvent::EmptyField("message"));
}

#[test]
fn rejects_percent_outside_range() {
    let err = validate_event(&json!({
        "jobId": "J1", "stage": "parsing", "message": "x", "percent": 140
    }))
    .unwrap_err();
    assert_eq!(err, InvalidEvent::PercentOutOfRange(140.0));

    let err = validate_event(&json!({
        "jobId": "J1", "stage": "parsing", "message": "x", "percent": "50"
    }))
    .unwrap_err();
    assert!(matches!(err, InvalidEvent::Malformed(_)));
}

#[test]
fn diagnostics_accept_any_number() {
    let event = validate_event(&json!({
        "jobId": "J1",
        "stage": "fetching",
        "message": "x",
        "diagnostics": {"rounds": 2.5, "adsSeen": -1, "adsFiltered": 0}
    }))
    .expect("valid event");
    let diagnostics = event.diagnostics.expect("diagnostics");
    assert_eq!(diagnostics.rounds, Some(2.5));
    assert_eq!(diagnostics.ads_seen, Some(-1.0));
    assert_eq!(diagnostics.ads_filtered, Some(0.0));
}

#[test]
fn diagnostics_are_optional_but_type_checked() {
    let event = validate_event(&json!({
        "jobId": "J1",
        "stage": "fetching",
        "message": "x",
        "diagnostics": {"rounds": 3, "networkIdleUsed": true}
    }))
    .expect("valid event");
    let diagnostics = event.diagnostics.expect("diagnostics");
    assert_eq!(diagnostics.rounds, Some(3.0));
    assert_eq!(diagnostics.ads_seen, None);
    assert_eq!(diagnostics.network_idle_used, Some(true));

    let err = validate_event(&json!({
        "jobId": "J1",
        "stage": "fetching",
        "message": "x",
        "diagnostics": {"adsSeen": "many"}
    }))
    .unwrap_err();
    assert!(matches!(err, InvalidEvent::Malformed(_)));
}

#[test]
fn null_optionals_and_unknown_fields_are_ignored() {
    let event = validate_event(&json!({
        "jobId": "J1",
        "stage": "saving",
        "message": "x",
        "timestamp": null,
        "percent": null,
        "extra": {"ignored": true}
    }))
    .expect("valid event");
    assert_eq!(event.timestamp, None);
    assert_eq!(event.percent, None);
}

#[test]
fn non_object_payload_is_malformed() {
    let err = validate_event(&json!("progress")).unwrap_err();
    assert!(matches!(err, InvalidEvent::Malformed(_)));
}
