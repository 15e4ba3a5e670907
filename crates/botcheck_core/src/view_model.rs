use crate::{ConnectionState, JobStreamState, ProgressEvent, ScoringResult, Stage, StreamError};

/// Snapshot handed to consumers after each update.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStreamView {
    pub job_id: String,
    pub events: Vec<ProgressEvent>,
    pub connection: ConnectionState,
    pub is_connected: bool,
    pub is_connecting: bool,
    pub last_error: Option<StreamError>,
    pub latest_stage: Option<Stage>,
    /// Progress of the newest event, falling back to its stage default.
    pub progress_percent: f64,
    pub is_terminal: bool,
    pub result: Option<ScoringResult>,
    pub replaying: bool,
    pub dirty: bool,
}

impl JobStreamView {
    pub(crate) fn from_state(state: &JobStreamState) -> Self {
        let events: Vec<ProgressEvent> = state.events().cloned().collect();
        let latest = events.last();
        let result = events
            .iter()
            .rev()
            .find(|event| event.stage == Stage::Completed)
            .and_then(ProgressEvent::scoring_result);

        Self {
            job_id: state.job_id().to_string(),
            connection: state.connection(),
            is_connected: state.connection() == ConnectionState::Connected,
            is_connecting: state.connection() == ConnectionState::Connecting,
            last_error: state.last_error().cloned(),
            latest_stage: latest.map(|event| event.stage),
            progress_percent: latest.map_or(0.0, ProgressEvent::progress_percent),
            is_terminal: latest.is_some_and(|event| event.stage.is_terminal()),
            result,
            replaying: state.is_replaying(),
            dirty: state.dirty(),
            events,
        }
    }
}
