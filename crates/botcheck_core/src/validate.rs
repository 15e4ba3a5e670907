use serde::Deserialize;

use crate::{Diagnostics, ProgressEvent, Stage};

/// Why an inbound event was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidEvent {
    #[error("malformed event: {0}")]
    Malformed(String),
    #[error("field `{0}` must be a non-empty string")]
    EmptyField(&'static str),
    #[error("percent must be within 0..=100, got {0}")]
    PercentOutOfRange(f64),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    job_id: String,
    stage: Stage,
    message: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    percent: Option<f64>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    diagnostics: Option<Diagnostics>,
}

/// Checks a raw inbound payload against the progress event schema.
///
/// Unknown fields are ignored and `null` optional fields count as absent.
/// Nothing is stamped here; admission assigns the receipt time.
pub fn validate_event(raw: &serde_json::Value) -> Result<ProgressEvent, InvalidEvent> {
    let wire =
        WireEvent::deserialize(raw).map_err(|err| InvalidEvent::Malformed(err.to_string()))?;

    if wire.job_id.trim().is_empty() {
        return Err(InvalidEvent::EmptyField("jobId"));
    }
    if wire.message.trim().is_empty() {
        return Err(InvalidEvent::EmptyField("message"));
    }
    if let Some(percent) = wire.percent {
        if !(0.0..=100.0).contains(&percent) {
            return Err(InvalidEvent::PercentOutOfRange(percent));
        }
    }

    Ok(ProgressEvent {
        job_id: wire.job_id,
        stage: wire.stage,
        message: wire.message,
        timestamp: wire.timestamp,
        percent: wire.percent,
        data: wire.data,
        diagnostics: wire.diagnostics,
    })
}
