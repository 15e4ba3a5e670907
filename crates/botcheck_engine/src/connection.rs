//! Real-time transport: one websocket per job, joined to the job's room.

use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::stream::{self, BoxStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::ClientConfig;

pub const PROGRESS_EVENT: &str = "progress";
pub const JOIN_ROOM_EVENT: &str = "joinJobRoom";
/// Close reason sent when the client tears the connection down itself.
pub const LOCAL_CLOSE_REASON: &str = "client disconnect";

/// Name of the job-scoped progress event some servers emit instead of `progress`.
pub fn job_progress_event(job_id: &str) -> String {
    format!("job:{job_id}:progress")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// What an open connection delivers. `Closed` is always the last item.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Progress(serde_json::Value),
    Closed(String),
}

pub type ConnectionStream = BoxStream<'static, ConnectionEvent>;

/// Opens job-scoped connections.
///
/// Once `closing` is cancelled the connection is closed with
/// [`LOCAL_CLOSE_REASON`] and the stream ends with that `Closed` item.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        job_id: &str,
        closing: CancellationToken,
    ) -> Result<ConnectionStream, TransportError>;
}

/// `{"event": ..., "data": ...}` frame exchanged over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct WsConnector {
    config: ClientConfig,
}

impl WsConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Socket endpoint with `http(s)` mapped to `ws(s)` and the API key as `token`.
    pub fn endpoint(&self) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.config.socket_url)
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| TransportError::InvalidUrl(self.config.socket_url.clone()))?;
        if let Some(key) = self.config.api_key.as_deref() {
            url.query_pairs_mut().append_pair("token", key);
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn open(
        &self,
        job_id: &str,
        closing: CancellationToken,
    ) -> Result<ConnectionStream, TransportError> {
        let url = self.endpoint()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        if let Some(key) = self.config.api_key.as_deref() {
            let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|err| TransportError::Handshake(err.to_string()))?;
            request.headers_mut().insert("authorization", bearer);
        }

        engine_debug!("Opening socket to {}", self.config.socket_url);
        let timeout = self.config.connect_timeout;
        let (mut ws, _) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|err| TransportError::Handshake(err.to_string()))?;

        let join = Envelope {
            event: JOIN_ROOM_EVENT.to_string(),
            data: serde_json::json!({ "jobId": job_id }),
        };
        let payload = serde_json::to_string(&join)
            .map_err(|err| TransportError::Protocol(err.to_string()))?;
        ws.send(Message::Text(payload.into()))
            .await
            .map_err(|err| TransportError::Protocol(format!("failed to join room: {err}")))?;
        engine_info!("Joined room for job {}", job_id);

        let job_event = job_progress_event(job_id);
        let frames = stream::unfold(Some(ws), move |ws| {
            let job_event = job_event.clone();
            let closing = closing.clone();
            async move {
                let mut ws = ws?;
                loop {
                    let next = tokio::select! {
                        _ = closing.cancelled() => {
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: Utf8Bytes::from_static(LOCAL_CLOSE_REASON),
                            };
                            if let Err(err) = ws.close(Some(frame)).await {
                                engine_debug!("Close handshake failed: {}", err);
                            }
                            let reason = LOCAL_CLOSE_REASON.to_string();
                            return Some((ConnectionEvent::Closed(reason), None));
                        }
                        next = ws.next() => next,
                    };
                    let item = match next {
                        Some(Ok(Message::Text(text))) => {
                            match progress_payload(text.as_str(), &job_event) {
                                Some(payload) => ConnectionEvent::Progress(payload),
                                None => continue,
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .filter(|reason| !reason.is_empty())
                                .unwrap_or_else(|| "server closed connection".to_string());
                            return Some((ConnectionEvent::Closed(reason), None));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(err)) => {
                            return Some((
                                ConnectionEvent::Closed(format!("transport error: {err}")),
                                None,
                            ));
                        }
                        None => {
                            return Some((
                                ConnectionEvent::Closed("transport close".to_string()),
                                None,
                            ));
                        }
                    };
                    return Some((item, Some(ws)));
                }
            }
        });

        Ok(frames.boxed())
    }
}

/// Extracts the progress payload from a text frame, if it is one.
pub fn progress_payload(text: &str, job_event: &str) -> Option<serde_json::Value> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            engine_warn!("Dropping non-JSON socket frame: {}", err);
            return None;
        }
    };
    if envelope.event == PROGRESS_EVENT || envelope.event == job_event {
        Some(envelope.data)
    } else {
        engine_debug!("Ignoring socket event {}", envelope.event);
        None
    }
}
