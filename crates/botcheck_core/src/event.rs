use std::fmt;

use serde::{Deserialize, Serialize};

use crate::result::ScoringResult;

/// One step in a job's lifecycle, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Started,
    Fetching,
    Parsing,
    Saving,
    Analyzing,
    Completed,
    Error,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Started,
        Stage::Fetching,
        Stage::Parsing,
        Stage::Saving,
        Stage::Analyzing,
        Stage::Completed,
        Stage::Error,
    ];

    /// Progress shown for an event of this stage that carries no `percent`.
    pub fn default_percent(self) -> f64 {
        match self {
            Stage::Started => 5.0,
            Stage::Fetching => 25.0,
            Stage::Parsing => 45.0,
            Stage::Saving => 65.0,
            Stage::Analyzing => 85.0,
            Stage::Completed => 100.0,
            Stage::Error => 0.0,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Started => "Started",
            Stage::Fetching => "Fetching Data",
            Stage::Parsing => "Parsing Content",
            Stage::Saving => "Saving Results",
            Stage::Analyzing => "Analyzing Patterns",
            Stage::Completed => "Completed",
            Stage::Error => "Error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Started => "started",
            Stage::Fetching => "fetching",
            Stage::Parsing => "parsing",
            Stage::Saving => "saving",
            Stage::Analyzing => "analyzing",
            Stage::Completed => "completed",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scraper counters reported alongside progress. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ads_seen: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ads_filtered: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_idle_used: Option<bool>,
}

/// A validated observation of job advancement.
///
/// Instances are only produced by [`crate::validate_event`] or read back from
/// a store that holds previously validated events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: String,
    pub stage: Stage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

/// Identity used to drop redelivered events.
///
/// Two genuinely distinct events sharing job, stage and timestamp collapse
/// into one; see DESIGN.md.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey<'a> {
    pub job_id: &'a str,
    pub timestamp: Option<&'a str>,
    pub stage: Stage,
}

impl ProgressEvent {
    pub fn dedup_key(&self) -> DedupKey<'_> {
        DedupKey {
            job_id: &self.job_id,
            timestamp: self.timestamp.as_deref(),
            stage: self.stage,
        }
    }

    pub fn is_duplicate_of(&self, other: &ProgressEvent) -> bool {
        self.dedup_key() == other.dedup_key()
    }

    /// Explicit percent when present, otherwise the stage default.
    pub fn progress_percent(&self) -> f64 {
        self.percent.unwrap_or_else(|| self.stage.default_percent())
    }

    /// Fills in `timestamp` if the wire event had none or an empty one.
    pub fn stamped(mut self, now: impl FnOnce() -> String) -> Self {
        if self.timestamp.as_deref().is_none_or(str::is_empty) {
            self.timestamp = Some(now());
        }
        self
    }

    /// Decodes the scoring result carried by a `completed` event.
    ///
    /// Returns `None` for other stages, a missing payload, or a payload that
    /// does not satisfy the result schema.
    pub fn scoring_result(&self) -> Option<ScoringResult> {
        if self.stage != Stage::Completed {
            return None;
        }
        let data = self.data.as_ref()?;
        let result: ScoringResult = serde_json::from_value(data.clone()).ok()?;
        result.validate().ok()?;
        Some(result)
    }
}
