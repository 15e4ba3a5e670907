use std::time::Duration;

use crate::{
    validate_event, ConnectionState, Effect, JobStreamState, Msg, Notification, StreamError,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: JobStreamState, msg: Msg) -> (JobStreamState, Vec<Effect>) {
    if state.is_closed() {
        return (state, Vec::new());
    }

    let effects = match msg {
        Msg::Seeded(events) => {
            state.seed(events);
            Vec::new()
        }
        Msg::Start => match state.connection() {
            // Connect is a no-op while a session is live or being opened.
            ConnectionState::Connected | ConnectionState::Connecting => Vec::new(),
            _ => vec![Effect::Connect {
                conn_id: state.begin_connect(),
            }],
        },
        Msg::ConnectionOpened { conn_id } => {
            if !state.is_current_conn(conn_id) {
                return (state, Vec::new());
            }
            state.set_connection(ConnectionState::Connected);
            state.set_last_error(None);
            state.backoff_mut().reset();
            vec![Effect::Notify(Notification::Connected)]
        }
        Msg::ConnectionFailed { conn_id, message } => {
            if !state.is_current_conn(conn_id) {
                return (state, Vec::new());
            }
            state.set_connection(ConnectionState::Disconnected);
            let error = StreamError::Transport(message);
            state.set_last_error(Some(error.clone()));
            let mut effects = vec![Effect::Notify(Notification::Error(error))];
            effects.extend(schedule_reconnect(&mut state));
            effects
        }
        Msg::ConnectionClosed { conn_id, reason } => {
            if !state.is_current_conn(conn_id) {
                return (state, Vec::new());
            }
            let was_connected = state.connection() == ConnectionState::Connected;
            state.set_connection(ConnectionState::Disconnected);
            let mut effects = Vec::new();
            if was_connected {
                effects.push(Effect::Notify(Notification::Disconnected { reason }));
            } else {
                let error = StreamError::Transport(reason);
                state.set_last_error(Some(error.clone()));
                effects.push(Effect::Notify(Notification::Error(error)));
            }
            effects.extend(schedule_reconnect(&mut state));
            effects
        }
        Msg::FrameReceived {
            conn_id,
            payload,
            received_at,
        } => {
            if !state.is_current_conn(conn_id) {
                return (state, Vec::new());
            }
            admit_event(&mut state, &payload, received_at)
        }
        Msg::ReconnectDue { token } => {
            if token != state.reconnect_token()
                || state.connection() != ConnectionState::Disconnected
            {
                return (state, Vec::new());
            }
            vec![Effect::Connect {
                conn_id: state.begin_connect(),
            }]
        }
        Msg::RetryRequested => {
            state.backoff_mut().reset();
            state.next_reconnect_token();
            let mut effects = vec![Effect::CancelReconnect];
            if matches!(
                state.connection(),
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                effects.push(Effect::CloseConnection);
            }
            effects.push(Effect::Connect {
                conn_id: state.begin_connect(),
            });
            effects
        }
        Msg::ClearRequested => {
            state.cancel_replay();
            state.clear_events();
            vec![Effect::CancelReplay, Effect::ClearStore]
        }
        Msg::ReplayLoaded(events) => {
            let token = state.start_replay(events);
            let mut effects = vec![Effect::CancelReplay];
            if state.is_replaying() {
                effects.push(Effect::ScheduleReplayTick {
                    token,
                    delay: Duration::ZERO,
                });
            }
            effects
        }
        Msg::ReplayTick { token } => {
            if token != state.replay_token() {
                return (state, Vec::new());
            }
            let Some(next) = state.next_replayed() else {
                return (state, Vec::new());
            };
            let mut effects = Vec::new();
            if let Some(event) = next {
                state.push_event(event.clone());
                effects.push(Effect::Notify(Notification::Replayed(event)));
            }
            if state.is_replaying() {
                effects.push(Effect::ScheduleReplayTick {
                    token,
                    delay: state.options().replay_delay,
                });
            }
            effects
        }
        Msg::Unsubscribe => {
            state.cancel_replay();
            state.close();
            vec![
                Effect::CancelReconnect,
                Effect::CancelReplay,
                Effect::CloseConnection,
            ]
        }
    };

    (state, effects)
}

fn admit_event(
    state: &mut JobStreamState,
    payload: &serde_json::Value,
    received_at: String,
) -> Vec<Effect> {
    let event = match validate_event(payload) {
        Ok(event) => event.stamped(|| received_at),
        Err(invalid) => {
            return vec![Effect::Notify(Notification::Error(StreamError::Validation(
                invalid,
            )))];
        }
    };

    // The room is job-scoped; anything else is a stray broadcast.
    if event.job_id != state.job_id() || state.contains_duplicate(&event) {
        return Vec::new();
    }

    state.push_event(event.clone());
    vec![
        Effect::PersistEvent(event.clone()),
        Effect::Notify(Notification::Progress(event)),
    ]
}

fn schedule_reconnect(state: &mut JobStreamState) -> Vec<Effect> {
    match state.backoff_mut().next_delay() {
        Some(delay) => {
            let token = state.next_reconnect_token();
            vec![Effect::ScheduleReconnect { token, delay }]
        }
        None => {
            let attempts = state.backoff_mut().attempts();
            state.set_connection(ConnectionState::FailedPermanently);
            let error = StreamError::ExhaustedRetries { attempts };
            state.set_last_error(Some(error.clone()));
            vec![Effect::Notify(Notification::Error(error))]
        }
    }
}
