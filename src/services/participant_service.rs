//! Participant-side operations (join, answer, advance) and the facilitator's roster controls.

use std::time::SystemTime;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        exercise_store::ExerciseStore,
        models::{
            ExerciseEntity, ExerciseStatus, ParticipantEntity, ParticipantStatus, ResponseEntity,
        },
    },
    dto::{
        events::ResponseSubmittedEvent,
        participant::{
            JoinExerciseRequest, JoinExerciseResponse, ParticipantSummary, SubmitResponseRequest,
        },
    },
    error::ServiceError,
    services::{exercise_service::load_owned_exercise, realtime_events},
    state::SharedState,
};

async fn load_participant(
    store: &dyn ExerciseStore,
    participant_id: Uuid,
) -> Result<ParticipantEntity, ServiceError> {
    store
        .find_participant(participant_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("participant `{participant_id}` not found")))
}

async fn load_exercise_of(
    store: &dyn ExerciseStore,
    participant: &ParticipantEntity,
) -> Result<ExerciseEntity, ServiceError> {
    store
        .find_exercise(participant.exercise_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("exercise `{}` not found", participant.exercise_id))
        })
}

fn ensure_active(participant: &ParticipantEntity) -> Result<(), ServiceError> {
    if participant.status != ParticipantStatus::Active {
        return Err(ServiceError::InvalidState(format!(
            "participant `{}` is {:?}",
            participant.id, participant.status
        )));
    }
    Ok(())
}

/// Join an exercise by access code. The participant starts on the latest released inject.
pub async fn join_exercise(
    state: &SharedState,
    request: JoinExerciseRequest,
) -> Result<JoinExerciseResponse, ServiceError> {
    let store = state.require_store().await?;
    let access_code = request.access_code.trim().to_ascii_uppercase();

    let Some(exercise) = store.find_exercise_by_access_code(access_code.clone()).await? else {
        return Err(ServiceError::NotFound(format!(
            "no exercise uses access code `{access_code}`"
        )));
    };

    if exercise.status == ExerciseStatus::Completed {
        return Err(ServiceError::InvalidState(format!(
            "exercise `{}` is completed",
            exercise.id
        )));
    }

    let joined = store.count_participants(exercise.id).await?;
    if joined >= u64::from(exercise.max_participants) {
        return Err(ServiceError::InvalidState(format!(
            "exercise `{}` is full ({} participants)",
            exercise.id, exercise.max_participants
        )));
    }

    let participant = ParticipantEntity {
        id: Uuid::new_v4(),
        exercise_id: exercise.id,
        name: request.name.trim().to_string(),
        team: request.team.trim().to_string(),
        status: ParticipantStatus::Active,
        current_inject: exercise.latest_released_inject().unwrap_or(0),
        current_phase: 1,
        total_score: 0,
        responses: Vec::new(),
        joined_at: SystemTime::now(),
    };
    store.insert_participant(participant.clone()).await?;

    info!(
        exercise_id = %exercise.id,
        participant_id = %participant.id,
        current_inject = participant.current_inject,
        "participant joined"
    );

    let summary = ParticipantSummary::from(participant);
    realtime_events::broadcast_participant_joined(state, summary.clone());

    Ok(JoinExerciseResponse {
        participant: summary,
        exercise_title: exercise.title,
    })
}

pub async fn get_participant(
    state: &SharedState,
    participant_id: Uuid,
) -> Result<ParticipantSummary, ServiceError> {
    let store = state.require_store().await?;
    let participant = load_participant(store.as_ref(), participant_id).await?;
    Ok(participant.into())
}

/// Every participant of an exercise, whatever its status, in join order.
pub async fn list_participants(
    state: &SharedState,
    user_id: &str,
    exercise_id: Uuid,
) -> Result<Vec<ParticipantSummary>, ServiceError> {
    let store = state.require_store().await?;
    load_owned_exercise(store.as_ref(), exercise_id, user_id).await?;

    let participants = store.list_participants(exercise_id, None).await?;
    Ok(participants
        .into_iter()
        .map(ParticipantSummary::from)
        .collect())
}

pub async fn set_participant_status(
    state: &SharedState,
    user_id: &str,
    exercise_id: Uuid,
    participant_id: Uuid,
    status: ParticipantStatus,
) -> Result<ParticipantSummary, ServiceError> {
    let store = state.require_store().await?;
    load_owned_exercise(store.as_ref(), exercise_id, user_id).await?;

    let participant = store
        .set_participant_status(exercise_id, participant_id, status)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "participant `{participant_id}` not found in exercise `{exercise_id}`"
            ))
        })?;

    info!(
        exercise_id = %exercise_id,
        participant_id = %participant_id,
        status = ?status,
        "participant status changed"
    );

    let summary = ParticipantSummary::from(participant);
    realtime_events::notify_participant_updated(state, summary.clone());
    Ok(summary)
}

/// Record an answer to one phase of a released inject and add its points to the total.
pub async fn submit_response(
    state: &SharedState,
    participant_id: Uuid,
    request: SubmitResponseRequest,
) -> Result<ParticipantSummary, ServiceError> {
    let store = state.require_store().await?;
    let participant = load_participant(store.as_ref(), participant_id).await?;
    ensure_active(&participant)?;
    let exercise = load_exercise_of(store.as_ref(), &participant).await?;

    let inject_number = request.inject_number;
    let inject = exercise.inject(inject_number).ok_or_else(|| {
        ServiceError::NotFound(format!(
            "inject {inject_number} not found in exercise `{}`",
            exercise.id
        ))
    })?;
    if !inject.is_active {
        return Err(ServiceError::InvalidState(format!(
            "inject {inject_number} has not been released"
        )));
    }
    if !inject.responses_open {
        return Err(ServiceError::InvalidState(format!(
            "responses are closed for inject {inject_number}"
        )));
    }

    let phase = inject.phase(request.phase).ok_or_else(|| {
        ServiceError::NotFound(format!(
            "phase {} not found in inject {inject_number}",
            request.phase
        ))
    })?;
    if participant.has_responded(inject_number, request.phase) {
        return Err(ServiceError::InvalidState(format!(
            "phase {} of inject {inject_number} already answered",
            request.phase
        )));
    }

    let content = request.content.trim().to_string();
    let points_earned = if exercise.settings.scoring_enabled {
        phase.points_for(&content)
    } else {
        0
    };

    let response = ResponseEntity {
        inject_number,
        phase: request.phase,
        content,
        points_earned,
        submitted_at: SystemTime::now(),
    };
    let Some(updated) = store.record_response(participant_id, response).await? else {
        debug!(
            participant_id = %participant_id,
            inject_number,
            "duplicate response rejected by store"
        );
        return Err(ServiceError::InvalidState(format!(
            "phase {} of inject {inject_number} already answered",
            request.phase
        )));
    };

    info!(
        exercise_id = %exercise.id,
        participant_id = %participant_id,
        inject_number,
        phase = request.phase,
        points_earned,
        "response recorded"
    );

    realtime_events::broadcast_response_submitted(
        state,
        exercise.id,
        ResponseSubmittedEvent {
            participant_id,
            inject_number,
            phase: request.phase,
            points_earned,
        },
    );
    let summary = ParticipantSummary::from(updated);
    realtime_events::notify_participant_updated(state, summary.clone());
    Ok(summary)
}

/// Move the participant to the next phase of its current inject.
pub async fn advance_phase(
    state: &SharedState,
    participant_id: Uuid,
) -> Result<ParticipantSummary, ServiceError> {
    let store = state.require_store().await?;
    let participant = load_participant(store.as_ref(), participant_id).await?;
    ensure_active(&participant)?;
    let exercise = load_exercise_of(store.as_ref(), &participant).await?;

    let inject_number = participant.current_inject;
    let Some(inject) = exercise.inject(inject_number) else {
        return Err(ServiceError::InvalidState(
            "participant is not positioned on an inject yet".into(),
        ));
    };
    if inject.phase_progression_locked {
        return Err(ServiceError::InvalidState(format!(
            "phase progression is locked for inject {inject_number}"
        )));
    }
    let from_phase = participant.current_phase;
    if from_phase as usize >= inject.phases.len() {
        return Err(ServiceError::InvalidState(format!(
            "participant is already on the last phase of inject {inject_number}"
        )));
    }

    let updated = store
        .advance_phase(participant_id, inject_number, from_phase)
        .await?
        .ok_or_else(|| {
            ServiceError::InvalidState("participant position changed concurrently".into())
        })?;

    info!(
        participant_id = %participant_id,
        inject_number,
        phase = updated.current_phase,
        "participant advanced"
    );

    let summary = ParticipantSummary::from(updated);
    realtime_events::notify_participant_updated(state, summary.clone());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dto::exercise::UpdateExerciseRequest,
        services::{
            exercise_service, inject_service,
            realtime_events::{EVENT_PARTICIPANT_JOINED, EVENT_PARTICIPANT_UPDATED},
            test_support::{self, FACILITATOR},
        },
        state::RoomKey,
    };

    async fn access_code(state: &SharedState, exercise_id: Uuid) -> String {
        exercise_service::get_exercise(state, FACILITATOR, exercise_id)
            .await
            .unwrap()
            .access_code
    }

    async fn join(
        state: &SharedState,
        code: &str,
        name: &str,
    ) -> Result<ParticipantSummary, ServiceError> {
        join_exercise(
            state,
            JoinExerciseRequest {
                access_code: code.into(),
                name: name.into(),
                team: "red".into(),
            },
        )
        .await
        .map(|joined| joined.participant)
    }

    fn answer(inject_number: u32, phase: u32, content: &str) -> SubmitResponseRequest {
        SubmitResponseRequest {
            inject_number,
            phase,
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn join_positions_on_latest_released_inject() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        test_support::inject(&state, exercise_id, "one").await;
        test_support::inject(&state, exercise_id, "two").await;
        let code = access_code(&state, exercise_id).await;

        let early = join(&state, &code.to_lowercase(), "Early").await.unwrap();
        assert_eq!(early.current_inject, 0);
        assert_eq!(early.current_phase, 1);

        inject_service::release_inject(&state, FACILITATOR, exercise_id, 2)
            .await
            .unwrap();
        let late = join(&state, &code, "Late").await.unwrap();
        assert_eq!(late.current_inject, 2);
        assert_eq!(late.status, ParticipantStatus::Active);
    }

    #[tokio::test]
    async fn join_rejects_unknown_code_full_and_completed_exercises() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        let code = access_code(&state, exercise_id).await;

        assert!(matches!(
            join(&state, "ZZZZZZ", "Nobody").await,
            Err(ServiceError::NotFound(_))
        ));

        exercise_service::update_exercise(
            &state,
            FACILITATOR,
            exercise_id,
            UpdateExerciseRequest {
                max_participants: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        join(&state, &code, "First").await.unwrap();
        assert!(matches!(
            join(&state, &code, "Second").await,
            Err(ServiceError::InvalidState(_))
        ));

        exercise_service::update_exercise(
            &state,
            FACILITATOR,
            exercise_id,
            UpdateExerciseRequest {
                max_participants: Some(10),
                status: Some(ExerciseStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            join(&state, &code, "Third").await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn join_is_announced_to_the_exercise_room() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        let code = access_code(&state, exercise_id).await;
        let mut room = state.rooms().subscribe(RoomKey::Exercise(exercise_id));

        let participant = join(&state, &code, "Ada").await.unwrap();
        let event = room.recv().await.unwrap();
        assert_eq!(event.event, EVENT_PARTICIPANT_JOINED);
        assert_eq!(
            event.data["participant"]["id"],
            participant.id.to_string()
        );
    }

    #[tokio::test]
    async fn responses_are_scored_once_per_phase() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        test_support::inject(&state, exercise_id, "one").await;
        let code = access_code(&state, exercise_id).await;
        let participant = join(&state, &code, "Ada").await.unwrap();

        assert!(matches!(
            submit_response(&state, participant.id, answer(1, 1, "a")).await,
            Err(ServiceError::InvalidState(_))
        ));

        inject_service::release_inject(&state, FACILITATOR, exercise_id, 1)
            .await
            .unwrap();
        let mut own_room = state.rooms().subscribe(RoomKey::Participant(participant.id));

        let scored = submit_response(&state, participant.id, answer(1, 1, " a "))
            .await
            .unwrap();
        assert_eq!(scored.total_score, 10);
        assert_eq!(scored.responses.len(), 1);
        assert_eq!(scored.responses[0].points_earned, 10);
        assert_eq!(own_room.recv().await.unwrap().event, EVENT_PARTICIPANT_UPDATED);

        assert!(matches!(
            submit_response(&state, participant.id, answer(1, 1, "b")).await,
            Err(ServiceError::InvalidState(_))
        ));

        let unmatched = submit_response(&state, participant.id, answer(1, 2, "call the CISO"))
            .await
            .unwrap();
        assert_eq!(unmatched.total_score, 10);
        assert_eq!(unmatched.responses[1].points_earned, 0);

        assert!(matches!(
            submit_response(&state, participant.id, answer(1, 3, "a")).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn responses_require_open_inject_and_active_participant() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        test_support::inject(&state, exercise_id, "one").await;
        let code = access_code(&state, exercise_id).await;
        let participant = join(&state, &code, "Ada").await.unwrap();

        inject_service::release_inject(&state, FACILITATOR, exercise_id, 1)
            .await
            .unwrap();
        inject_service::set_responses_open(&state, FACILITATOR, exercise_id, 1, false)
            .await
            .unwrap();
        assert!(matches!(
            submit_response(&state, participant.id, answer(1, 1, "a")).await,
            Err(ServiceError::InvalidState(_))
        ));

        inject_service::set_responses_open(&state, FACILITATOR, exercise_id, 1, true)
            .await
            .unwrap();
        set_participant_status(
            &state,
            FACILITATOR,
            exercise_id,
            participant.id,
            ParticipantStatus::Inactive,
        )
        .await
        .unwrap();
        assert!(matches!(
            submit_response(&state, participant.id, answer(1, 1, "a")).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn scoring_disabled_records_zero_points() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        test_support::inject(&state, exercise_id, "one").await;
        exercise_service::update_exercise(
            &state,
            FACILITATOR,
            exercise_id,
            UpdateExerciseRequest {
                settings: Some(crate::dto::exercise::ExerciseSettingsDto {
                    scoring_enabled: false,
                    auto_release: false,
                    show_scores: false,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let code = access_code(&state, exercise_id).await;
        let participant = join(&state, &code, "Ada").await.unwrap();
        inject_service::release_inject(&state, FACILITATOR, exercise_id, 1)
            .await
            .unwrap();

        let recorded = submit_response(&state, participant.id, answer(1, 1, "a"))
            .await
            .unwrap();
        assert_eq!(recorded.total_score, 0);
    }

    #[tokio::test]
    async fn advance_respects_lock_and_last_phase() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        test_support::inject(&state, exercise_id, "one").await;
        let code = access_code(&state, exercise_id).await;
        let participant = join(&state, &code, "Ada").await.unwrap();

        assert!(matches!(
            advance_phase(&state, participant.id).await,
            Err(ServiceError::InvalidState(_))
        ));

        inject_service::release_inject(&state, FACILITATOR, exercise_id, 1)
            .await
            .unwrap();
        inject_service::set_phase_progression_locked(&state, FACILITATOR, exercise_id, 1, true)
            .await
            .unwrap();
        assert!(matches!(
            advance_phase(&state, participant.id).await,
            Err(ServiceError::InvalidState(_))
        ));

        inject_service::set_phase_progression_locked(&state, FACILITATOR, exercise_id, 1, false)
            .await
            .unwrap();
        let advanced = advance_phase(&state, participant.id).await.unwrap();
        assert_eq!(advanced.current_phase, 2);

        assert!(matches!(
            advance_phase(&state, participant.id).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn roster_is_facilitator_only() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        let code = access_code(&state, exercise_id).await;
        let participant = join(&state, &code, "Ada").await.unwrap();

        assert!(matches!(
            list_participants(&state, "intruder", exercise_id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            set_participant_status(
                &state,
                "intruder",
                exercise_id,
                participant.id,
                ParticipantStatus::Removed
            )
            .await,
            Err(ServiceError::Forbidden(_))
        ));

        let removed = set_participant_status(
            &state,
            FACILITATOR,
            exercise_id,
            participant.id,
            ParticipantStatus::Removed,
        )
        .await
        .unwrap();
        assert_eq!(removed.status, ParticipantStatus::Removed);

        let roster = list_participants(&state, FACILITATOR, exercise_id).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].status, ParticipantStatus::Removed);
    }
}
