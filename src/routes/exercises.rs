use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        exercise::{CreateExerciseRequest, ExerciseListItem, ExerciseSummary, UpdateExerciseRequest},
        participant::{ParticipantSummary, UpdateParticipantStatusRequest},
        scores::LeaderboardResponse,
    },
    error::AppError,
    routes::identity::{AuthUser, require_user},
    services::{exercise_service, participant_service, scoring_service},
    state::SharedState,
};

/// Facilitator routes managing exercises, their roster and leaderboard.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/exercises", get(list_exercises).post(create_exercise))
        .route("/exercises/{id}", get(get_exercise).patch(update_exercise))
        .route("/exercises/{id}/participants", get(list_participants))
        .route(
            "/exercises/{id}/participants/{participant_id}/status",
            put(update_participant_status),
        )
        .route("/exercises/{id}/scores", get(leaderboard))
        .route_layer(middleware::from_fn(require_user))
}

#[utoipa::path(
    post,
    path = "/exercises",
    tag = "exercises",
    request_body = CreateExerciseRequest,
    params(("X-User-Id" = String, Header, description = "Facilitator identity")),
    responses(
        (status = 201, description = "Exercise created", body = ExerciseSummary),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Missing identity")
    )
)]
/// Create an exercise owned by the caller, with a fresh access code.
pub async fn create_exercise(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Valid(Json(payload)): Valid<Json<CreateExerciseRequest>>,
) -> Result<(StatusCode, Json<ExerciseSummary>), AppError> {
    let summary = exercise_service::create_exercise(&state, &user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[utoipa::path(
    get,
    path = "/exercises",
    tag = "exercises",
    params(("X-User-Id" = String, Header, description = "Facilitator identity")),
    responses((status = 200, description = "Exercises owned by the caller", body = [ExerciseListItem]))
)]
/// List the caller's exercises.
pub async fn list_exercises(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ExerciseListItem>>, AppError> {
    let exercises = exercise_service::list_exercises(&state, &user.id).await?;
    Ok(Json(exercises))
}

#[utoipa::path(
    get,
    path = "/exercises/{id}",
    tag = "exercises",
    params(
        ("id" = Uuid, Path, description = "Exercise identifier"),
        ("X-User-Id" = String, Header, description = "Facilitator identity")
    ),
    responses(
        (status = 200, description = "Exercise with its injects", body = ExerciseSummary),
        (status = 403, description = "Exercise owned by another facilitator"),
        (status = 404, description = "Unknown exercise")
    )
)]
pub async fn get_exercise(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExerciseSummary>, AppError> {
    let summary = exercise_service::get_exercise(&state, &user.id, id).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    patch,
    path = "/exercises/{id}",
    tag = "exercises",
    request_body = UpdateExerciseRequest,
    params(
        ("id" = Uuid, Path, description = "Exercise identifier"),
        ("X-User-Id" = String, Header, description = "Facilitator identity")
    ),
    responses(
        (status = 200, description = "Exercise updated", body = ExerciseSummary),
        (status = 403, description = "Exercise owned by another facilitator"),
        (status = 404, description = "Unknown exercise")
    )
)]
/// Update the title, description, status, capacity or settings of an exercise.
pub async fn update_exercise(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<UpdateExerciseRequest>>,
) -> Result<Json<ExerciseSummary>, AppError> {
    let summary = exercise_service::update_exercise(&state, &user.id, id, payload).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/exercises/{id}/participants",
    tag = "participants",
    params(
        ("id" = Uuid, Path, description = "Exercise identifier"),
        ("X-User-Id" = String, Header, description = "Facilitator identity")
    ),
    responses((status = 200, description = "Participants in join order", body = [ParticipantSummary]))
)]
/// List every participant of an exercise, whatever their status.
pub async fn list_participants(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ParticipantSummary>>, AppError> {
    let participants = participant_service::list_participants(&state, &user.id, id).await?;
    Ok(Json(participants))
}

#[utoipa::path(
    put,
    path = "/exercises/{id}/participants/{participant_id}/status",
    tag = "participants",
    request_body = UpdateParticipantStatusRequest,
    params(
        ("id" = Uuid, Path, description = "Exercise identifier"),
        ("participant_id" = Uuid, Path, description = "Participant identifier"),
        ("X-User-Id" = String, Header, description = "Facilitator identity")
    ),
    responses(
        (status = 200, description = "Participant status changed", body = ParticipantSummary),
        (status = 404, description = "Unknown exercise or participant")
    )
)]
pub async fn update_participant_status(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path((id, participant_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateParticipantStatusRequest>,
) -> Result<Json<ParticipantSummary>, AppError> {
    let summary = participant_service::set_participant_status(
        &state,
        &user.id,
        id,
        participant_id,
        payload.status,
    )
    .await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/exercises/{id}/scores",
    tag = "scores",
    params(
        ("id" = Uuid, Path, description = "Exercise identifier"),
        ("X-User-Id" = String, Header, description = "Facilitator identity")
    ),
    responses((status = 200, description = "Leaderboard of active participants", body = LeaderboardResponse))
)]
/// Rank the active participants of an exercise by total score.
pub async fn leaderboard(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let board = scoring_service::leaderboard(&state, &user.id, id).await?;
    Ok(Json(board))
}
