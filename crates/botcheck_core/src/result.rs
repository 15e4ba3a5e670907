use serde::{Deserialize, Serialize};

use crate::Stage;

/// Value measured for a signal; the server sends whichever JSON scalar fits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal: String,
    pub value: SignalValue,
    pub weight: f64,
    pub explain: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action: String,
    pub priority: Priority,
    pub rationale: String,
    pub estimated_effort: String,
}

/// Terminal artifact of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub human_score: f64,
    pub confidence: f64,
    pub summary_bullets: Vec<String>,
    pub top_signals: Vec<Signal>,
    pub action_table: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field} must be within 0..=100, got {value}")]
pub struct ScoreOutOfRange {
    pub field: &'static str,
    pub value: f64,
}

impl ScoringResult {
    pub fn validate(&self) -> Result<(), ScoreOutOfRange> {
        check_score("human_score", self.human_score)?;
        check_score("confidence", self.confidence)
    }
}

fn check_score(field: &'static str, value: f64) -> Result<(), ScoreOutOfRange> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ScoreOutOfRange { field, value })
    }
}

/// Server-side record of a job, fetched independently of the live stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub status: Stage,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJobResponse {
    pub job_id: String,
}
