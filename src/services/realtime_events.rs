use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        events::{
            InjectReleasedEvent, ParticipantJoinedEvent, ParticipantUpdatedEvent,
            PhaseProgressionToggledEvent, ResponseSubmittedEvent, ResponsesToggledEvent,
        },
        inject::InjectSummary,
        participant::ParticipantSummary,
        ws::RoomEvent,
    },
    state::{RoomKey, SharedState},
};

pub const EVENT_INJECT_RELEASED: &str = "injectReleased";
pub const EVENT_RESPONSES_TOGGLED: &str = "responsesToggled";
pub const EVENT_PHASE_PROGRESSION_TOGGLED: &str = "phaseProgressionToggled";
pub const EVENT_PARTICIPANT_JOINED: &str = "participantJoined";
pub const EVENT_RESPONSE_SUBMITTED: &str = "responseSubmitted";
pub const EVENT_PARTICIPANT_UPDATED: &str = "participantUpdated";

/// Broadcast a released inject to everyone following the exercise.
pub fn broadcast_inject_released(state: &SharedState, exercise_id: Uuid, inject: InjectSummary) {
    let payload = InjectReleasedEvent {
        inject_number: inject.inject_number,
        inject,
    };
    send_exercise_event(state, exercise_id, EVENT_INJECT_RELEASED, &payload);
}

/// Broadcast that responses were opened or closed on an inject.
pub fn broadcast_responses_toggled(
    state: &SharedState,
    exercise_id: Uuid,
    inject_number: u32,
    open: bool,
) {
    let payload = ResponsesToggledEvent {
        inject_number,
        open,
    };
    send_exercise_event(state, exercise_id, EVENT_RESPONSES_TOGGLED, &payload);
}

/// Broadcast that phase progression was locked or unlocked on an inject.
pub fn broadcast_phase_progression_toggled(
    state: &SharedState,
    exercise_id: Uuid,
    inject_number: u32,
    locked: bool,
) {
    let payload = PhaseProgressionToggledEvent {
        inject_number,
        locked,
    };
    send_exercise_event(state, exercise_id, EVENT_PHASE_PROGRESSION_TOGGLED, &payload);
}

/// Announce a new participant to the exercise room.
pub fn broadcast_participant_joined(state: &SharedState, participant: ParticipantSummary) {
    let exercise_id = participant.exercise_id;
    let payload = ParticipantJoinedEvent { participant };
    send_exercise_event(state, exercise_id, EVENT_PARTICIPANT_JOINED, &payload);
}

/// Tell the exercise room that a participant answered a phase.
pub fn broadcast_response_submitted(
    state: &SharedState,
    exercise_id: Uuid,
    payload: ResponseSubmittedEvent,
) {
    send_exercise_event(state, exercise_id, EVENT_RESPONSE_SUBMITTED, &payload);
}

/// Push the latest participant record to its personal room.
pub fn notify_participant_updated(state: &SharedState, participant: ParticipantSummary) {
    let key = RoomKey::Participant(participant.id);
    let payload = ParticipantUpdatedEvent { participant };
    send_room_event(state, key, EVENT_PARTICIPANT_UPDATED, &payload);
}

fn send_exercise_event(
    state: &SharedState,
    exercise_id: Uuid,
    event: &str,
    payload: &impl Serialize,
) {
    send_room_event(state, RoomKey::Exercise(exercise_id), event, payload);
}

fn send_room_event(state: &SharedState, key: RoomKey, event: &str, payload: &impl Serialize) {
    match RoomEvent::json(event, payload) {
        Ok(message) => {
            let delivered = state.rooms().broadcast(key, message);
            debug!(room = %key, event, delivered, "room event dispatched");
        }
        Err(err) => warn!(room = %key, event, error = %err, "failed to serialize room payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    #[tokio::test]
    async fn toggles_reach_the_exercise_room() {
        let state = AppState::new(AppConfig::default());
        let exercise_id = Uuid::new_v4();
        let mut receiver = state.rooms().subscribe(RoomKey::Exercise(exercise_id));

        broadcast_responses_toggled(&state, exercise_id, 2, false);
        broadcast_phase_progression_toggled(&state, exercise_id, 2, true);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.event, EVENT_RESPONSES_TOGGLED);
        assert_eq!(
            first.data,
            serde_json::json!({"injectNumber": 2, "open": false})
        );

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.event, EVENT_PHASE_PROGRESSION_TOGGLED);
        assert_eq!(
            second.data,
            serde_json::json!({"injectNumber": 2, "locked": true})
        );
    }
}
