//! Botcheck engine: IO side of the job event stream.
mod api;
mod clock;
mod config;
mod connection;
mod observer;
mod store;
mod stream;

pub use api::{ApiClient, ApiError};
pub use clock::now_rfc3339;
pub use config::{ClientConfig, StreamSettings, DEFAULT_SERVER_URL};
pub use connection::{
    job_progress_event, progress_payload, ConnectionEvent, ConnectionStream, Connector, Envelope,
    TransportError, WsConnector, JOIN_ROOM_EVENT, LOCAL_CLOSE_REASON, PROGRESS_EVENT,
};
pub use observer::{ChannelObserver, NoopObserver, StreamObserver};
pub use store::{LocalEventStore, MAX_EVENTS_PER_JOB};
pub use stream::JobStream;
