use std::sync::mpsc;

use botcheck_core::{Notification, ProgressEvent, StreamError};

/// Receives stream notifications on the job's driver thread.
///
/// An observer passed to [`crate::JobStream::subscribe`] sees every
/// notification produced after that call exactly once, in order.
pub trait StreamObserver: Send + Sync {
    fn on_progress(&self, _event: &ProgressEvent) {}
    fn on_replay(&self, _event: &ProgressEvent) {}
    fn on_connect(&self) {}
    fn on_disconnect(&self, _reason: &str) {}
    fn on_error(&self, _error: &StreamError) {}
}

/// Observer that ignores everything; consumers poll the view instead.
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

/// Forwards notifications into a channel so another thread can drain them.
pub struct ChannelObserver {
    tx: mpsc::Sender<Notification>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx }
    }

    fn forward(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }
}

impl StreamObserver for ChannelObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        self.forward(Notification::Progress(event.clone()));
    }

    fn on_replay(&self, event: &ProgressEvent) {
        self.forward(Notification::Replayed(event.clone()));
    }

    fn on_connect(&self) {
        self.forward(Notification::Connected);
    }

    fn on_disconnect(&self, reason: &str) {
        self.forward(Notification::Disconnected {
            reason: reason.to_string(),
        });
    }

    fn on_error(&self, error: &StreamError) {
        self.forward(Notification::Error(error.clone()));
    }
}

pub(crate) fn deliver(observer: &dyn StreamObserver, notification: &Notification) {
    match notification {
        Notification::Progress(event) => observer.on_progress(event),
        Notification::Replayed(event) => observer.on_replay(event),
        Notification::Connected => observer.on_connect(),
        Notification::Disconnected { reason } => observer.on_disconnect(reason),
        Notification::Error(error) => observer.on_error(error),
    }
}
