use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{patch, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::inject::{
        CreateInjectRequest, InjectSummary, PhaseLockRequest, ReleaseInjectRequest,
        ToggleResponsesRequest, UpdateInjectRequest,
    },
    error::AppError,
    routes::identity::{AuthUser, require_user},
    services::inject_service,
    state::SharedState,
};

/// Facilitator routes authoring injects and driving their lifecycle.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/exercises/{id}/injects", post(add_inject))
        .route("/exercises/{id}/injects/release", post(release_inject))
        .route("/exercises/{id}/injects/responses", post(toggle_responses))
        .route("/exercises/{id}/injects/phase-lock", post(toggle_phase_lock))
        .route("/exercises/{id}/injects/{inject_number}", patch(update_inject))
        .route_layer(middleware::from_fn(require_user))
}

#[utoipa::path(
    post,
    path = "/exercises/{id}/injects",
    tag = "injects",
    request_body = CreateInjectRequest,
    params(
        ("id" = Uuid, Path, description = "Exercise identifier"),
        ("X-User-Id" = String, Header, description = "Facilitator identity")
    ),
    responses(
        (status = 201, description = "Inject appended with the next number", body = InjectSummary),
        (status = 409, description = "Concurrent inject creation, retry")
    )
)]
/// Append an inject to the exercise; it starts unreleased.
pub async fn add_inject(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CreateInjectRequest>>,
) -> Result<(StatusCode, Json<InjectSummary>), AppError> {
    let inject = inject_service::add_inject(&state, &user.id, id, payload).await?;
    Ok((StatusCode::CREATED, Json(inject)))
}

#[utoipa::path(
    patch,
    path = "/exercises/{id}/injects/{inject_number}",
    tag = "injects",
    request_body = UpdateInjectRequest,
    params(
        ("id" = Uuid, Path, description = "Exercise identifier"),
        ("inject_number" = u32, Path, description = "1-based inject number"),
        ("X-User-Id" = String, Header, description = "Facilitator identity")
    ),
    responses(
        (status = 200, description = "Inject updated", body = InjectSummary),
        (status = 404, description = "Unknown exercise or inject")
    )
)]
pub async fn update_inject(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path((id, inject_number)): Path<(Uuid, u32)>,
    Valid(Json(payload)): Valid<Json<UpdateInjectRequest>>,
) -> Result<Json<InjectSummary>, AppError> {
    let inject =
        inject_service::update_inject(&state, &user.id, id, inject_number, payload).await?;
    Ok(Json(inject))
}

#[utoipa::path(
    post,
    path = "/exercises/{id}/injects/release",
    tag = "injects",
    request_body = ReleaseInjectRequest,
    params(
        ("id" = Uuid, Path, description = "Exercise identifier"),
        ("X-User-Id" = String, Header, description = "Facilitator identity")
    ),
    responses(
        (status = 200, description = "Inject released and participants moved to it", body = InjectSummary),
        (status = 404, description = "Unknown exercise or inject"),
        (status = 409, description = "Inject already released with responses open")
    )
)]
/// Release an inject to participants, opening responses and repositioning active participants.
pub async fn release_inject(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ReleaseInjectRequest>>,
) -> Result<Json<InjectSummary>, AppError> {
    let inject =
        inject_service::release_inject(&state, &user.id, id, payload.inject_number).await?;
    Ok(Json(inject))
}

#[utoipa::path(
    post,
    path = "/exercises/{id}/injects/responses",
    tag = "injects",
    request_body = ToggleResponsesRequest,
    params(
        ("id" = Uuid, Path, description = "Exercise identifier"),
        ("X-User-Id" = String, Header, description = "Facilitator identity")
    ),
    responses((status = 200, description = "Responses opened or closed", body = InjectSummary))
)]
pub async fn toggle_responses(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ToggleResponsesRequest>>,
) -> Result<Json<InjectSummary>, AppError> {
    let inject = inject_service::set_responses_open(
        &state,
        &user.id,
        id,
        payload.inject_number,
        payload.open,
    )
    .await?;
    Ok(Json(inject))
}

#[utoipa::path(
    post,
    path = "/exercises/{id}/injects/phase-lock",
    tag = "injects",
    request_body = PhaseLockRequest,
    params(
        ("id" = Uuid, Path, description = "Exercise identifier"),
        ("X-User-Id" = String, Header, description = "Facilitator identity")
    ),
    responses((status = 200, description = "Phase progression locked or unlocked", body = InjectSummary))
)]
pub async fn toggle_phase_lock(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<PhaseLockRequest>>,
) -> Result<Json<InjectSummary>, AppError> {
    let inject = inject_service::set_phase_progression_locked(
        &state,
        &user.id,
        id,
        payload.inject_number,
        payload.locked,
    )
    .await?;
    Ok(Json(inject))
}
