use std::time::Duration;

use botcheck_core::{
    update, Effect, JobStreamState, Msg, Notification, ProgressEvent, Stage, StreamOptions,
};
use serde_json::json;

fn stored(stage: Stage, timestamp: &str) -> ProgressEvent {
    ProgressEvent {
        job_id: "J1".to_string(),
        stage,
        message: stage.display_name().to_string(),
        timestamp: Some(timestamp.to_string()),
        percent: None,
        data: None,
        diagnostics: None,
    }
}

fn history() -> Vec<ProgressEvent> {
    vec![
        stored(Stage::Started, "t0"),
        stored(Stage::Fetching, "t1"),
        stored(Stage::Parsing, "t2"),
    ]
}

/// Fires every scheduled replay tick in order, collecting the delays used.
fn drain_replay(
    mut state: JobStreamState,
    mut effects: Vec<Effect>,
) -> (JobStreamState, Vec<Duration>, Vec<ProgressEvent>) {
    let mut delays = Vec::new();
    let mut replayed = Vec::new();
    loop {
        let tick = effects.iter().find_map(|effect| match effect {
            Effect::ScheduleReplayTick { token, delay } => Some((*token, *delay)),
            _ => None,
        });
        let Some((token, delay)) = tick else {
            break;
        };
        delays.push(delay);
        let (next, next_effects) = update(state, Msg::ReplayTick { token });
        for effect in &next_effects {
            if let Effect::Notify(Notification::Replayed(event)) = effect {
                replayed.push(event.clone());
            }
            assert!(!matches!(effect, Effect::PersistEvent(_)));
        }
        state = next;
        effects = next_effects;
    }
    (state, delays, replayed)
}

#[test]
fn replay_reproduces_durable_order_with_pacing() {
    let state = JobStreamState::new("J1", StreamOptions::default());
    let (state, _) = update(state, Msg::Seeded(vec![stored(Stage::Saving, "t9")]));
    let (state, effects) = update(state, Msg::ReplayLoaded(history()));

    assert_eq!(state.events().len(), 0);
    assert!(state.view().replaying);

    let (state, delays, replayed) = drain_replay(state, effects);
    assert_eq!(
        delays,
        vec![
            Duration::ZERO,
            Duration::from_millis(100),
            Duration::from_millis(100)
        ]
    );
    assert_eq!(replayed, history());
    let events: Vec<ProgressEvent> = state.events().cloned().collect();
    assert_eq!(events, history());
    assert!(!state.view().replaying);
}

#[test]
fn redelivery_during_replay_is_not_duplicated() {
    let state = JobStreamState::new("J1", StreamOptions::default());
    let (state, _) = update(state, Msg::Seeded(history()));
    let (state, _) = update(state, Msg::Start);
    let (state, _) = update(state, Msg::ConnectionOpened { conn_id: 1 });
    let (state, replay) = update(state, Msg::ReplayLoaded(history()));

    let (state, effects) = update(
        state,
        Msg::FrameReceived {
            conn_id: 1,
            payload: json!({"jobId": "J1", "stage": "started", "message": "again", "timestamp": "t0"}),
            received_at: "t5".to_string(),
        },
    );
    assert!(effects.is_empty());

    let (state, _, replayed) = drain_replay(state, replay);
    assert_eq!(replayed, history());
    let events: Vec<ProgressEvent> = state.events().cloned().collect();
    assert_eq!(events, history());
}

#[test]
fn live_event_ahead_of_replay_is_not_replayed_twice() {
    let state = JobStreamState::new("J1", StreamOptions::default());
    let (state, _) = update(state, Msg::Start);
    let (state, _) = update(state, Msg::ConnectionOpened { conn_id: 1 });
    let mut doubled = history();
    doubled.push(stored(Stage::Started, "t0"));
    let (state, replay) = update(state, Msg::ReplayLoaded(doubled));

    let (state, delays, replayed) = drain_replay(state, replay);
    assert_eq!(delays.len(), 4);
    assert_eq!(replayed, history());
    assert_eq!(state.events().len(), 3);
}

#[test]
fn replay_of_empty_history_just_clears() {
    let state = JobStreamState::new("J1", StreamOptions::default());
    let (state, _) = update(state, Msg::Seeded(history()));
    let (state, effects) = update(state, Msg::ReplayLoaded(Vec::new()));
    assert_eq!(effects, vec![Effect::CancelReplay]);
    assert_eq!(state.events().len(), 0);
}

#[test]
fn second_replay_supersedes_first() {
    let state = JobStreamState::new("J1", StreamOptions::default());
    let (state, first) = update(state, Msg::ReplayLoaded(history()));
    let first_token = match first.last() {
        Some(Effect::ScheduleReplayTick { token, .. }) => *token,
        other => panic!("unexpected {other:?}"),
    };
    let (state, second) = update(state, Msg::ReplayLoaded(history()));

    let (state, effects) = update(state, Msg::ReplayTick { token: first_token });
    assert!(effects.is_empty());

    let (state, _, replayed) = drain_replay(state, second);
    assert_eq!(replayed.len(), 3);
    assert_eq!(state.events().len(), 3);
}

#[test]
fn unsubscribe_stops_replay_midway() {
    let state = JobStreamState::new("J1", StreamOptions::default());
    let (state, effects) = update(state, Msg::ReplayLoaded(history()));
    let token = match effects.last() {
        Some(Effect::ScheduleReplayTick { token, .. }) => *token,
        other => panic!("unexpected {other:?}"),
    };
    let (state, _) = update(state, Msg::ReplayTick { token });
    let (state, _) = update(state, Msg::Unsubscribe);
    let (state, effects) = update(state, Msg::ReplayTick { token });

    assert!(effects.is_empty());
    assert_eq!(state.events().len(), 1);
}

#[test]
fn clear_cancels_pending_replay() {
    let state = JobStreamState::new("J1", StreamOptions::default());
    let (state, effects) = update(state, Msg::ReplayLoaded(history()));
    let token = match effects.last() {
        Some(Effect::ScheduleReplayTick { token, .. }) => *token,
        other => panic!("unexpected {other:?}"),
    };
    let (state, _) = update(state, Msg::ClearRequested);
    let (state, effects) = update(state, Msg::ReplayTick { token });
    assert!(effects.is_empty());
    assert_eq!(state.events().len(), 0);
}
