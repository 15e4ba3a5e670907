use std::time::Duration;

use crate::{ProgressEvent, StreamError};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Connect { conn_id: u64 },
    /// Close the live connection without scheduling a reconnect.
    CloseConnection,
    ScheduleReconnect { token: u64, delay: Duration },
    CancelReconnect,
    ScheduleReplayTick { token: u64, delay: Duration },
    CancelReplay,
    PersistEvent(ProgressEvent),
    ClearStore,
    Notify(Notification),
}

/// Observer-facing outcome of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Progress(ProgressEvent),
    Replayed(ProgressEvent),
    Connected,
    Disconnected { reason: String },
    Error(StreamError),
}
