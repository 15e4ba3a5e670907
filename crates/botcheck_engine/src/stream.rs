//! Runtime for one job's event stream.
//!
//! Each subscription gets a dedicated thread running a current-thread tokio
//! runtime, so every state transition for the job happens on one logical
//! thread. Connection tasks and timers post [`Msg`]s back to the driver;
//! the driver feeds them through [`update`] and executes the resulting
//! effects.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use botcheck_core::{
    update, ConnectionState, Effect, JobStreamState, JobStreamView, Msg, Notification,
    ProgressEvent, StreamError,
};
use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::now_rfc3339;
use crate::connection::{ConnectionEvent, Connector};
use crate::observer::{deliver, StreamObserver};
use crate::{LocalEventStore, StreamSettings};

/// How long shutdown waits for open connections to finish their close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

enum StreamCommand {
    Retry,
    Clear,
    Replay,
    Shutdown,
}

/// Handle to a live job subscription. Dropping it unsubscribes.
pub struct JobStream {
    job_id: String,
    cmd_tx: mpsc::UnboundedSender<StreamCommand>,
    view: Arc<Mutex<JobStreamView>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl JobStream {
    /// Seeds the job's sequence from the local store, then connects.
    pub fn subscribe(
        job_id: impl Into<String>,
        settings: StreamSettings,
        connector: Arc<dyn Connector>,
        observer: Arc<dyn StreamObserver>,
    ) -> Self {
        let job_id = job_id.into();
        let state = JobStreamState::new(job_id.clone(), settings.options.clone());
        let view = Arc::new(Mutex::new(state.view()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let driver = Driver::new(
            state,
            LocalEventStore::new(settings.store_dir),
            connector,
            observer,
            view.clone(),
        );
        let thread = thread::Builder::new()
            .name(format!("job-stream-{job_id}"))
            .spawn(move || driver.run_blocking(cmd_rx))
            .map_err(|err| engine_error!("Failed to spawn stream thread for {}: {}", job_id, err))
            .ok();

        Self {
            job_id,
            cmd_tx,
            view,
            thread,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Latest published snapshot.
    pub fn view(&self) -> JobStreamView {
        self.view
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.view().events
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.view().connection
    }

    pub fn last_error(&self) -> Option<StreamError> {
        self.view().last_error
    }

    /// Drops the current connection and reconnects with a fresh retry budget.
    pub fn retry_connection(&self) {
        self.send(StreamCommand::Retry);
    }

    /// Empties the in-memory sequence and the stored log. Connection is untouched.
    pub fn clear_events(&self) {
        self.send(StreamCommand::Clear);
    }

    /// Rebuilds the sequence from the stored log, one event per pacing interval.
    pub fn replay_events(&self) {
        self.send(StreamCommand::Replay);
    }

    /// Cancels timers and replay, closes the connection and waits for the driver to stop.
    pub fn unsubscribe(mut self) {
        self.shutdown();
    }

    fn send(&self, command: StreamCommand) {
        if self.cmd_tx.send(command).is_err() {
            engine_warn!("Stream for job {} is no longer running", self.job_id);
        }
    }

    fn shutdown(&mut self) {
        let _ = self.cmd_tx.send(StreamCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                engine_error!("Stream thread for job {} panicked", self.job_id);
            }
        }
    }
}

impl Drop for JobStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Driver {
    state: Option<JobStreamState>,
    job_id: String,
    store: LocalEventStore,
    connector: Arc<dyn Connector>,
    observer: Arc<dyn StreamObserver>,
    view: Arc<Mutex<JobStreamView>>,
    msg_tx: mpsc::UnboundedSender<Msg>,
    msg_rx: Option<mpsc::UnboundedReceiver<Msg>>,
    shutdown: CancellationToken,
    connection: Option<CancellationToken>,
    connection_tasks: Vec<JoinHandle<()>>,
    reconnect_timer: Option<CancellationToken>,
    replay_timer: Option<CancellationToken>,
}

impl Driver {
    fn new(
        state: JobStreamState,
        store: LocalEventStore,
        connector: Arc<dyn Connector>,
        observer: Arc<dyn StreamObserver>,
        view: Arc<Mutex<JobStreamView>>,
    ) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        Self {
            job_id: state.job_id().to_string(),
            state: Some(state),
            store,
            connector,
            observer,
            view,
            msg_tx,
            msg_rx: Some(msg_rx),
            shutdown: CancellationToken::new(),
            connection: None,
            connection_tasks: Vec::new(),
            reconnect_timer: None,
            replay_timer: None,
        }
    }

    fn run_blocking(self, cmd_rx: mpsc::UnboundedReceiver<StreamCommand>) {
        engine_logging::set_job_context(self.job_id.clone());
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                engine_error!("Failed to build stream runtime: {}", err);
                return;
            }
        };
        runtime.block_on(self.run(cmd_rx));
        engine_logging::clear_job_context();
    }

    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<StreamCommand>) {
        let Some(mut msg_rx) = self.msg_rx.take() else {
            return;
        };

        let history = self.store.read(&self.job_id);
        engine_debug!("Seeding stream with {} stored events", history.len());
        self.dispatch(Msg::Seeded(history));
        self.dispatch(Msg::Start);

        loop {
            let msg = tokio::select! {
                command = cmd_rx.recv() => match command {
                    Some(StreamCommand::Retry) => Msg::RetryRequested,
                    Some(StreamCommand::Clear) => Msg::ClearRequested,
                    Some(StreamCommand::Replay) => {
                        let history = self.store.read(&self.job_id);
                        engine_info!("Replaying {} stored events", history.len());
                        Msg::ReplayLoaded(history)
                    }
                    Some(StreamCommand::Shutdown) | None => break,
                },
                Some(msg) = msg_rx.recv() => msg,
            };
            self.dispatch(msg);
        }

        self.dispatch(Msg::Unsubscribe);
        self.shutdown.cancel();
        for task in self.connection_tasks.drain(..) {
            if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
                engine_warn!("Connection did not close within {}ms", CLOSE_GRACE.as_millis());
            }
        }
        engine_info!("Unsubscribed");
    }

    fn dispatch(&mut self, msg: Msg) {
        let Some(state) = self.state.take() else {
            return;
        };
        let (mut state, effects) = update(state, msg);
        if state.consume_dirty() {
            let view = state.view();
            *self.view.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = view;
        }
        self.state = Some(state);

        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Connect { conn_id } => {
                cancel(&mut self.connection);
                let token = self.shutdown.child_token();
                self.connection = Some(token.clone());
                self.connection_tasks.retain(|task| !task.is_finished());
                self.connection_tasks.push(tokio::spawn(run_connection(
                    self.connector.clone(),
                    self.job_id.clone(),
                    conn_id,
                    self.msg_tx.clone(),
                    token,
                )));
            }
            Effect::CloseConnection => {
                engine_debug!("Closing connection locally");
                cancel(&mut self.connection);
            }
            Effect::ScheduleReconnect { token, delay } => {
                engine_info!("Reconnecting in {}ms", delay.as_millis());
                let timer = self.spawn_timer(delay, Msg::ReconnectDue { token });
                replace_timer(&mut self.reconnect_timer, timer);
            }
            Effect::CancelReconnect => cancel(&mut self.reconnect_timer),
            Effect::ScheduleReplayTick { token, delay } => {
                let timer = self.spawn_timer(delay, Msg::ReplayTick { token });
                replace_timer(&mut self.replay_timer, timer);
            }
            Effect::CancelReplay => cancel(&mut self.replay_timer),
            Effect::PersistEvent(event) => self.store.append(&self.job_id, &event),
            Effect::ClearStore => self.store.clear(&self.job_id),
            Effect::Notify(notification) => {
                log_notification(&notification);
                deliver(self.observer.as_ref(), &notification);
            }
        }
    }

    fn spawn_timer(&self, delay: Duration, msg: Msg) -> CancellationToken {
        let token = self.shutdown.child_token();
        let cancelled = token.clone();
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = msg_tx.send(msg);
                }
            }
        });
        token
    }
}

fn cancel(slot: &mut Option<CancellationToken>) {
    if let Some(token) = slot.take() {
        token.cancel();
    }
}

fn replace_timer(slot: &mut Option<CancellationToken>, timer: CancellationToken) {
    cancel(slot);
    *slot = Some(timer);
}

/// Opens one connection and forwards everything it yields until it ends.
///
/// Cancelling `closing` makes the connector close the socket; the resulting
/// local close is not reported back to the driver.
async fn run_connection(
    connector: Arc<dyn Connector>,
    job_id: String,
    conn_id: u64,
    msg_tx: mpsc::UnboundedSender<Msg>,
    closing: CancellationToken,
) {
    let opened = tokio::select! {
        _ = closing.cancelled() => return,
        opened = connector.open(&job_id, closing.clone()) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(err) => {
            let _ = msg_tx.send(Msg::ConnectionFailed {
                conn_id,
                message: err.to_string(),
            });
            return;
        }
    };
    let _ = msg_tx.send(Msg::ConnectionOpened { conn_id });

    let deadline = close_deadline(&closing);
    tokio::pin!(deadline);
    let mut reason = "transport close".to_string();
    loop {
        let event = tokio::select! {
            event = stream.next() => event,
            _ = &mut deadline => {
                engine_warn!("Connection ignored local close; dropping it");
                None
            }
        };
        let Some(event) = event else {
            break;
        };
        match event {
            ConnectionEvent::Progress(payload) => {
                let _ = msg_tx.send(Msg::FrameReceived {
                    conn_id,
                    payload,
                    received_at: now_rfc3339(),
                });
            }
            ConnectionEvent::Closed(closed) => {
                reason = closed;
                break;
            }
        }
    }
    if !closing.is_cancelled() {
        let _ = msg_tx.send(Msg::ConnectionClosed { conn_id, reason });
    }
}

async fn close_deadline(closing: &CancellationToken) {
    closing.cancelled().await;
    tokio::time::sleep(CLOSE_GRACE).await;
}

fn log_notification(notification: &Notification) {
    match notification {
        Notification::Progress(event) => {
            engine_debug!("Progress {} {}", event.stage, event.message)
        }
        Notification::Replayed(event) => engine_debug!("Replayed {}", event.stage),
        Notification::Connected => engine_info!("Socket connected"),
        Notification::Disconnected { reason } => engine_info!("Socket disconnected: {}", reason),
        Notification::Error(StreamError::ExhaustedRetries { attempts }) => {
            engine_error!("Giving up after {} reconnection attempts", attempts)
        }
        Notification::Error(StreamError::Validation(err)) => {
            engine_warn!("Invalid progress event received: {}", err)
        }
        Notification::Error(err) => engine_warn!("{}", err),
    }
}
