//! Inject authoring and the guarded lifecycle operations (release and the two toggles).
//!
//! Every lifecycle write is a single conditional update scoped to one inject; the realtime
//! event is only dispatched once that write has been acknowledged by the store.

use std::time::SystemTime;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        exercise_store::InjectWrite,
        models::{ArtifactEntity, InjectEntity, InjectPatch, PhaseEntity},
    },
    dto::inject::{CreateInjectRequest, InjectSummary, UpdateInjectRequest},
    error::ServiceError,
    services::{exercise_service::load_owned_exercise, realtime_events},
    state::{SharedState, lifecycle::LifecycleEvent},
};

fn inject_not_found(exercise_id: Uuid, inject_number: u32) -> ServiceError {
    ServiceError::NotFound(format!(
        "inject {inject_number} not found in exercise `{exercise_id}`"
    ))
}

fn exercise_not_found(exercise_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("exercise `{exercise_id}` not found"))
}

/// Map a store write outcome to the resulting inject, treating "nothing changed" as success.
fn written_inject(
    write: InjectWrite,
    exercise_id: Uuid,
    inject_number: u32,
) -> Result<InjectEntity, ServiceError> {
    match write {
        InjectWrite::Updated(inject) | InjectWrite::Unchanged(inject) => Ok(inject),
        InjectWrite::InjectNotFound => Err(inject_not_found(exercise_id, inject_number)),
        InjectWrite::ExerciseNotFound => Err(exercise_not_found(exercise_id)),
    }
}

/// Append a new, unreleased inject numbered after the current last one.
pub async fn add_inject(
    state: &SharedState,
    user_id: &str,
    exercise_id: Uuid,
    request: CreateInjectRequest,
) -> Result<InjectSummary, ServiceError> {
    let store = state.require_store().await?;
    let exercise = load_owned_exercise(store.as_ref(), exercise_id, user_id).await?;

    let inject = InjectEntity::new(
        exercise.next_inject_number(),
        request.title.trim().to_string(),
        request.narrative,
        request
            .artifacts
            .into_iter()
            .map(ArtifactEntity::from)
            .collect(),
        request.phases.into_iter().map(PhaseEntity::from).collect(),
    );

    let appended = store
        .append_inject(exercise_id, exercise.injects.len(), inject.clone())
        .await?;
    if !appended {
        warn!(
            exercise_id = %exercise_id,
            inject_number = inject.inject_number,
            "inject list changed while appending"
        );
        return Err(ServiceError::InvalidState(
            "the exercise gained another inject concurrently; retry".into(),
        ));
    }

    info!(
        exercise_id = %exercise_id,
        inject_number = inject.inject_number,
        "inject added"
    );
    Ok(inject.into())
}

/// Shallow-merge a patch into an inject.
///
/// Lifecycle flags in the patch are written as-is: no event, no participant cascade.
pub async fn update_inject(
    state: &SharedState,
    user_id: &str,
    exercise_id: Uuid,
    inject_number: u32,
    request: UpdateInjectRequest,
) -> Result<InjectSummary, ServiceError> {
    let store = state.require_store().await?;
    let exercise = load_owned_exercise(store.as_ref(), exercise_id, user_id).await?;
    if exercise.inject(inject_number).is_none() {
        return Err(inject_not_found(exercise_id, inject_number));
    }

    let write = store
        .update_inject(
            exercise_id,
            inject_number,
            InjectPatch::from(request),
            SystemTime::now(),
        )
        .await?;
    let inject = written_inject(write, exercise_id, inject_number)?;

    info!(exercise_id = %exercise_id, inject_number, "inject updated");
    Ok(inject.into())
}

/// Release an inject: activate it, open responses, move active participants onto it and
/// announce it to the exercise room.
pub async fn release_inject(
    state: &SharedState,
    user_id: &str,
    exercise_id: Uuid,
    inject_number: u32,
) -> Result<InjectSummary, ServiceError> {
    let store = state.require_store().await?;
    load_owned_exercise(store.as_ref(), exercise_id, user_id).await?;

    let write = store
        .apply_lifecycle(
            exercise_id,
            inject_number,
            LifecycleEvent::Release,
            SystemTime::now(),
        )
        .await?;

    let inject = match write {
        InjectWrite::Updated(inject) => inject,
        InjectWrite::Unchanged(_) => {
            info!(exercise_id = %exercise_id, inject_number, "inject already released");
            return Err(ServiceError::AlreadyReleased { inject_number });
        }
        InjectWrite::InjectNotFound => return Err(inject_not_found(exercise_id, inject_number)),
        InjectWrite::ExerciseNotFound => return Err(exercise_not_found(exercise_id)),
    };

    // The inject stays released even if repositioning fails.
    match store
        .reposition_active_participants(exercise_id, inject_number)
        .await
    {
        Ok(moved) => info!(
            exercise_id = %exercise_id,
            inject_number,
            moved,
            "inject released; participants repositioned"
        ),
        Err(err) => error!(
            exercise_id = %exercise_id,
            inject_number,
            error = %err,
            "inject released but participant repositioning failed"
        ),
    }

    let summary = InjectSummary::from(inject);
    realtime_events::broadcast_inject_released(state, exercise_id, summary.clone());
    Ok(summary)
}

/// Open or close responses on an inject. Allowed before the inject has been released.
pub async fn set_responses_open(
    state: &SharedState,
    user_id: &str,
    exercise_id: Uuid,
    inject_number: u32,
    open: bool,
) -> Result<InjectSummary, ServiceError> {
    let store = state.require_store().await?;
    load_owned_exercise(store.as_ref(), exercise_id, user_id).await?;

    let write = store
        .apply_lifecycle(
            exercise_id,
            inject_number,
            LifecycleEvent::SetResponsesOpen(open),
            SystemTime::now(),
        )
        .await?;
    let inject = written_inject(write, exercise_id, inject_number)?;

    info!(exercise_id = %exercise_id, inject_number, open, "responses toggled");
    realtime_events::broadcast_responses_toggled(state, exercise_id, inject_number, open);
    Ok(inject.into())
}

/// Lock or unlock phase progression on an inject.
pub async fn set_phase_progression_locked(
    state: &SharedState,
    user_id: &str,
    exercise_id: Uuid,
    inject_number: u32,
    locked: bool,
) -> Result<InjectSummary, ServiceError> {
    let store = state.require_store().await?;
    load_owned_exercise(store.as_ref(), exercise_id, user_id).await?;

    let write = store
        .apply_lifecycle(
            exercise_id,
            inject_number,
            LifecycleEvent::SetPhaseProgressionLocked(locked),
            SystemTime::now(),
        )
        .await?;
    let inject = written_inject(write, exercise_id, inject_number)?;

    info!(exercise_id = %exercise_id, inject_number, locked, "phase progression toggled");
    realtime_events::broadcast_phase_progression_toggled(
        state,
        exercise_id,
        inject_number,
        locked,
    );
    Ok(inject.into())
}
