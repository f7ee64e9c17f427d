//! Fixtures shared by the service tests.

use std::{sync::Arc, time::SystemTime};

use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        exercise_store::memory::MemoryExerciseStore,
        models::{ParticipantEntity, ParticipantStatus},
    },
    dto::{
        exercise::CreateExerciseRequest,
        inject::{CreateInjectRequest, PhaseDto, ResponseOptionDto},
    },
    services::{exercise_service, inject_service},
    state::{AppState, SharedState},
};

pub const FACILITATOR: &str = "facilitator-1";

/// Shared state backed by a fresh in-memory store.
pub async fn memory_state() -> SharedState {
    let state = AppState::new(AppConfig::default());
    state.set_store(Arc::new(MemoryExerciseStore::new())).await;
    state
}

/// Create an exercise owned by [`FACILITATOR`] and return its id.
pub async fn exercise(state: &SharedState) -> Uuid {
    exercise_service::create_exercise(
        state,
        FACILITATOR,
        CreateExerciseRequest {
            title: "Tabletop".into(),
            description: String::new(),
            max_participants: None,
            settings: None,
        },
    )
    .await
    .unwrap()
    .id
}

/// Two-phase phase list; phase 1 scores `a` = 10 and `b` = 2.
pub fn phases() -> Vec<PhaseDto> {
    vec![
        PhaseDto {
            title: "Triage".into(),
            prompt: "What do you do first?".into(),
            options: vec![
                ResponseOptionDto {
                    key: "a".into(),
                    label: "Isolate the host".into(),
                    points: 10,
                },
                ResponseOptionDto {
                    key: "b".into(),
                    label: "Wait".into(),
                    points: 2,
                },
            ],
        },
        PhaseDto {
            title: "Escalate".into(),
            prompt: "Who do you call?".into(),
            options: Vec::new(),
        },
    ]
}

/// Append an inject with [`phases`] and return its number.
pub async fn inject(state: &SharedState, exercise_id: Uuid, title: &str) -> u32 {
    inject_service::add_inject(
        state,
        FACILITATOR,
        exercise_id,
        CreateInjectRequest {
            title: title.into(),
            narrative: format!("{title} narrative"),
            artifacts: Vec::new(),
            phases: phases(),
        },
    )
    .await
    .unwrap()
    .inject_number
}

/// Insert a participant directly through the store.
pub async fn participant(
    state: &SharedState,
    exercise_id: Uuid,
    status: ParticipantStatus,
    total_score: i32,
) -> ParticipantEntity {
    let participant = ParticipantEntity {
        id: Uuid::new_v4(),
        exercise_id,
        name: format!("p-{total_score}"),
        team: "blue".into(),
        status,
        current_inject: 0,
        current_phase: 1,
        total_score,
        responses: Vec::new(),
        joined_at: SystemTime::now(),
    };
    state
        .require_store()
        .await
        .unwrap()
        .insert_participant(participant.clone())
        .await
        .unwrap();
    participant
}
