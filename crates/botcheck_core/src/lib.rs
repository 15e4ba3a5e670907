//! Botcheck core: event schema, validation and the pure job stream state machine.
mod effect;
mod error;
mod event;
mod msg;
mod reconnect;
mod result;
mod state;
mod update;
mod validate;
mod view_model;

pub use effect::{Effect, Notification};
pub use error::StreamError;
pub use event::{DedupKey, Diagnostics, ProgressEvent, Stage};
pub use msg::Msg;
pub use reconnect::{Backoff, ConnectionState, ReconnectPolicy};
pub use result::{
    Action, JobMetadata, Priority, ScoreOutOfRange, ScoringResult, Signal, SignalValue,
    StartJobResponse,
};
pub use state::{JobStreamState, StreamOptions, MEMORY_WINDOW};
pub use update::update;
pub use validate::{validate_event, InvalidEvent};
pub use view_model::JobStreamView;
