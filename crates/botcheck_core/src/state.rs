use std::collections::VecDeque;
use std::time::Duration;

use crate::view_model::JobStreamView;
use crate::{Backoff, ConnectionState, ProgressEvent, ReconnectPolicy, StreamError};

/// Number of events kept in memory per job.
pub const MEMORY_WINDOW: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct StreamOptions {
    pub reconnect: ReconnectPolicy,
    /// Pause between replayed events. Zero replays as fast as the driver runs.
    pub replay_delay: Duration,
    pub memory_window: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            replay_delay: Duration::from_millis(100),
            memory_window: MEMORY_WINDOW,
        }
    }
}

/// Everything the stream knows about one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStreamState {
    job_id: String,
    options: StreamOptions,
    events: VecDeque<ProgressEvent>,
    connection: ConnectionState,
    backoff: Backoff,
    last_error: Option<StreamError>,
    conn_id: u64,
    reconnect_token: u64,
    replay_queue: VecDeque<ProgressEvent>,
    replay_token: u64,
    seeded: bool,
    closed: bool,
    dirty: bool,
}

impl JobStreamState {
    pub fn new(job_id: impl Into<String>, options: StreamOptions) -> Self {
        let backoff = Backoff::new(options.reconnect);
        Self {
            job_id: job_id.into(),
            options,
            events: VecDeque::new(),
            connection: ConnectionState::Idle,
            backoff,
            last_error: None,
            conn_id: 0,
            reconnect_token: 0,
            replay_queue: VecDeque::new(),
            replay_token: 0,
            seeded: false,
            closed: false,
            dirty: false,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn events(&self) -> impl ExactSizeIterator<Item = &ProgressEvent> {
        self.events.iter()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn last_error(&self) -> Option<&StreamError> {
        self.last_error.as_ref()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    pub fn is_replaying(&self) -> bool {
        !self.replay_queue.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn view(&self) -> JobStreamView {
        JobStreamView::from_state(self)
    }

    /// Returns whether anything changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn options(&self) -> &StreamOptions {
        &self.options
    }

    pub(crate) fn dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn seed(&mut self, events: Vec<ProgressEvent>) -> bool {
        if self.seeded {
            return false;
        }
        self.seeded = true;
        for event in events {
            self.push_event(event);
        }
        self.mark_dirty();
        true
    }

    /// Checks the live window and any stored history still waiting to replay.
    pub(crate) fn contains_duplicate(&self, event: &ProgressEvent) -> bool {
        self.events
            .iter()
            .chain(self.replay_queue.iter())
            .any(|known| known.is_duplicate_of(event))
    }

    fn in_window(&self, event: &ProgressEvent) -> bool {
        self.events.iter().any(|known| known.is_duplicate_of(event))
    }

    /// Appends to the in-memory window, evicting the oldest entries past the cap.
    pub(crate) fn push_event(&mut self, event: ProgressEvent) {
        self.events.push_back(event);
        while self.events.len() > self.options.memory_window {
            self.events.pop_front();
        }
        self.mark_dirty();
    }

    pub(crate) fn clear_events(&mut self) {
        self.events.clear();
        self.mark_dirty();
    }

    pub(crate) fn is_current_conn(&self, conn_id: u64) -> bool {
        !self.closed && conn_id == self.conn_id
    }

    pub(crate) fn begin_connect(&mut self) -> u64 {
        self.conn_id += 1;
        self.connection = ConnectionState::Connecting;
        self.last_error = None;
        self.mark_dirty();
        self.conn_id
    }

    pub(crate) fn set_connection(&mut self, connection: ConnectionState) {
        if self.connection != connection {
            self.connection = connection;
            self.mark_dirty();
        }
    }

    pub(crate) fn set_last_error(&mut self, error: Option<StreamError>) {
        self.last_error = error;
        self.mark_dirty();
    }

    pub(crate) fn backoff_mut(&mut self) -> &mut Backoff {
        &mut self.backoff
    }

    pub(crate) fn reconnect_token(&self) -> u64 {
        self.reconnect_token
    }

    pub(crate) fn next_reconnect_token(&mut self) -> u64 {
        self.reconnect_token += 1;
        self.reconnect_token
    }

    pub(crate) fn replay_token(&self) -> u64 {
        self.replay_token
    }

    /// Discards any pending replay and starts a new one from `events`.
    pub(crate) fn start_replay(&mut self, events: Vec<ProgressEvent>) -> u64 {
        self.replay_token += 1;
        self.replay_queue = events.into();
        self.clear_events();
        self.replay_token
    }

    pub(crate) fn cancel_replay(&mut self) {
        self.replay_token += 1;
        self.replay_queue.clear();
    }

    /// Pops the next stored event, or `None` when it already arrived live.
    pub(crate) fn next_replayed(&mut self) -> Option<Option<ProgressEvent>> {
        let event = self.replay_queue.pop_front()?;
        Some((!self.in_window(&event)).then_some(event))
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
        // Invalidates anything still in flight from the old connection.
        self.conn_id += 1;
        self.connection = ConnectionState::Idle;
        self.mark_dirty();
    }
}
