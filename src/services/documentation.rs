use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Tabletop Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::exercises::create_exercise,
        crate::routes::exercises::list_exercises,
        crate::routes::exercises::get_exercise,
        crate::routes::exercises::update_exercise,
        crate::routes::exercises::list_participants,
        crate::routes::exercises::update_participant_status,
        crate::routes::exercises::leaderboard,
        crate::routes::injects::add_inject,
        crate::routes::injects::update_inject,
        crate::routes::injects::release_inject,
        crate::routes::injects::toggle_responses,
        crate::routes::injects::toggle_phase_lock,
        crate::routes::participants::join_exercise,
        crate::routes::participants::get_participant,
        crate::routes::participants::submit_response,
        crate::routes::participants::advance_phase,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::exercise::CreateExerciseRequest,
            crate::dto::exercise::UpdateExerciseRequest,
            crate::dto::exercise::ExerciseSettingsDto,
            crate::dto::exercise::ExerciseSummary,
            crate::dto::exercise::ExerciseListItem,
            crate::dto::inject::ArtifactDto,
            crate::dto::inject::ResponseOptionDto,
            crate::dto::inject::PhaseDto,
            crate::dto::inject::CreateInjectRequest,
            crate::dto::inject::UpdateInjectRequest,
            crate::dto::inject::ReleaseInjectRequest,
            crate::dto::inject::ToggleResponsesRequest,
            crate::dto::inject::PhaseLockRequest,
            crate::dto::inject::InjectSummary,
            crate::dto::participant::JoinExerciseRequest,
            crate::dto::participant::JoinExerciseResponse,
            crate::dto::participant::SubmitResponseRequest,
            crate::dto::participant::UpdateParticipantStatusRequest,
            crate::dto::participant::ParticipantSummary,
            crate::dto::participant::ResponseSummary,
            crate::dto::scores::LeaderboardResponse,
            crate::dto::scores::LeaderboardEntry,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::RoomEvent,
            crate::dto::ws::RoomAck,
            crate::dto::events::InjectReleasedEvent,
            crate::dto::events::ResponsesToggledEvent,
            crate::dto::events::PhaseProgressionToggledEvent,
            crate::dto::events::ParticipantJoinedEvent,
            crate::dto::events::ResponseSubmittedEvent,
            crate::dto::events::ParticipantUpdatedEvent,
            crate::dao::models::ExerciseStatus,
            crate::dao::models::ParticipantStatus,
            crate::dao::models::ArtifactKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "exercises", description = "Facilitator exercise management"),
        (name = "injects", description = "Inject authoring and lifecycle"),
        (name = "participants", description = "Joining, responding and roster management"),
        (name = "scores", description = "Leaderboard"),
        (name = "realtime", description = "WebSocket rooms for exercises and participants"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/ws",
            "/exercises",
            "/exercises/{id}",
            "/exercises/{id}/injects/release",
            "/exercises/{id}/injects/{inject_number}",
            "/exercises/{id}/scores",
            "/join",
            "/participants/{id}/advance",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
