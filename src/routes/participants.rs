use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::participant::{
        JoinExerciseRequest, JoinExerciseResponse, ParticipantSummary, SubmitResponseRequest,
    },
    error::AppError,
    services::participant_service,
    state::SharedState,
};

/// Participant-facing routes. Participants are identified by the id returned on join.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/join", post(join_exercise))
        .route("/participants/{id}", get(get_participant))
        .route("/participants/{id}/responses", post(submit_response))
        .route("/participants/{id}/advance", post(advance_phase))
}

#[utoipa::path(
    post,
    path = "/join",
    tag = "participants",
    request_body = JoinExerciseRequest,
    responses(
        (status = 201, description = "Joined the exercise", body = JoinExerciseResponse),
        (status = 404, description = "Unknown access code"),
        (status = 409, description = "Exercise completed or full")
    )
)]
/// Join an exercise with its access code.
pub async fn join_exercise(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinExerciseRequest>>,
) -> Result<(StatusCode, Json<JoinExerciseResponse>), AppError> {
    let joined = participant_service::join_exercise(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(joined)))
}

#[utoipa::path(
    get,
    path = "/participants/{id}",
    tag = "participants",
    params(("id" = Uuid, Path, description = "Participant identifier")),
    responses(
        (status = 200, description = "Participant position and responses", body = ParticipantSummary),
        (status = 404, description = "Unknown participant")
    )
)]
pub async fn get_participant(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParticipantSummary>, AppError> {
    let participant = participant_service::get_participant(&state, id).await?;
    Ok(Json(participant))
}

#[utoipa::path(
    post,
    path = "/participants/{id}/responses",
    tag = "participants",
    request_body = SubmitResponseRequest,
    params(("id" = Uuid, Path, description = "Participant identifier")),
    responses(
        (status = 200, description = "Response recorded", body = ParticipantSummary),
        (status = 409, description = "Inject not open for responses or phase already answered")
    )
)]
/// Answer one phase of a released inject.
pub async fn submit_response(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SubmitResponseRequest>>,
) -> Result<Json<ParticipantSummary>, AppError> {
    let participant = participant_service::submit_response(&state, id, payload).await?;
    Ok(Json(participant))
}

#[utoipa::path(
    post,
    path = "/participants/{id}/advance",
    tag = "participants",
    params(("id" = Uuid, Path, description = "Participant identifier")),
    responses(
        (status = 200, description = "Moved to the next phase", body = ParticipantSummary),
        (status = 409, description = "Phase progression locked or already on the last phase")
    )
)]
/// Move the participant to the next phase of their current inject.
pub async fn advance_phase(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParticipantSummary>, AppError> {
    let participant = participant_service::advance_phase(&state, id).await?;
    Ok(Json(participant))
}
