use crate::ProgressEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Durable history read at subscribe time, applied once before live events.
    Seeded(Vec<ProgressEvent>),
    /// Consumer subscribed; open the first connection.
    Start,
    /// Transport finished its handshake and joined the job room.
    ConnectionOpened { conn_id: u64 },
    /// Transport could not be opened.
    ConnectionFailed { conn_id: u64, message: String },
    /// Remote side closed an established connection.
    ConnectionClosed { conn_id: u64, reason: String },
    /// Raw progress payload pushed by the server.
    FrameReceived {
        conn_id: u64,
        payload: serde_json::Value,
        received_at: String,
    },
    /// A scheduled reconnect timer fired.
    ReconnectDue { token: u64 },
    /// User asked to reconnect now.
    RetryRequested,
    /// User asked to drop all known events for the job.
    ClearRequested,
    /// Durable history re-read for a replay.
    ReplayLoaded(Vec<ProgressEvent>),
    /// A replay pacing timer fired.
    ReplayTick { token: u64 },
    /// Consumer went away; tear everything down.
    Unsubscribe,
}
