use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod exercises;
pub mod health;
pub mod identity;
pub mod injects;
pub mod participants;
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(websocket::router())
        .merge(exercises::router())
        .merge(injects::router())
        .merge(participants::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::ParticipantStatus,
        services::test_support::{self, FACILITATOR},
        state::AppState,
    };

    fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(identity::USER_ID_HEADER, user);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn facilitator_routes_require_identity() {
        let app = router(test_support::memory_state().await);

        let response = app
            .clone()
            .oneshot(request("GET", "/exercises", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(request("GET", "/exercises", Some("   "), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(json_body(response).await["message"].is_string());
    }

    #[tokio::test]
    async fn create_then_fetch_only_as_owner() {
        let app = router(test_support::memory_state().await);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/exercises",
                Some(FACILITATOR),
                Some(json!({"title": "Ransomware drill"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["facilitator"], FACILITATOR);
        assert_eq!(created["status"], "draft");
        let id = created["id"].as_str().unwrap().to_owned();

        let response = app
            .clone()
            .oneshot(request("GET", &format!("/exercises/{id}"), Some(FACILITATOR), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["title"], "Ransomware drill");

        let response = app
            .oneshot(request("GET", &format!("/exercises/{id}"), Some("intruder"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let app = router(test_support::memory_state().await);
        let response = app
            .oneshot(request(
                "POST",
                "/exercises",
                Some(FACILITATOR),
                Some(json!({"title": "  "})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn shrinking_capacity_below_roster_is_a_bad_request() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        for _ in 0..3 {
            test_support::participant(&state, exercise_id, ParticipantStatus::Active, 0).await;
        }
        let app = router(state);

        let response = app
            .oneshot(request(
                "PATCH",
                &format!("/exercises/{exercise_id}"),
                Some(FACILITATOR),
                Some(json!({"maxParticipants": 2})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["message"].is_string());
    }

    #[tokio::test]
    async fn release_flow_over_http() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        let inject_number = test_support::inject(&state, exercise_id, "Breach detected").await;
        let app = router(state);
        let release_uri = format!("/exercises/{exercise_id}/injects/release");

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &release_uri,
                Some(FACILITATOR),
                Some(json!({"injectNumber": inject_number})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let inject = json_body(response).await;
        assert_eq!(inject["isActive"], true);
        assert_eq!(inject["responsesOpen"], true);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &release_uri,
                Some(FACILITATOR),
                Some(json!({"injectNumber": inject_number})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(request(
                "POST",
                &release_uri,
                Some(FACILITATOR),
                Some(json!({"injectNumber": 42})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn participants_join_without_identity() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        let access_code = state
            .require_store()
            .await
            .unwrap()
            .find_exercise(exercise_id)
            .await
            .unwrap()
            .unwrap()
            .access_code;
        let app = router(state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/join",
                None,
                Some(json!({"accessCode": access_code.to_lowercase(), "name": "Alex"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let joined = json_body(response).await;
        assert_eq!(joined["exerciseTitle"], "Tabletop");
        let participant_id = joined["participant"]["id"].as_str().unwrap().to_owned();

        let response = app
            .oneshot(request(
                "GET",
                &format!("/participants/{participant_id}"),
                None,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["currentInject"], 0);
    }

    #[tokio::test]
    async fn degraded_mode_answers_service_unavailable() {
        let app = router(AppState::new(AppConfig::default()));

        let response = app
            .clone()
            .oneshot(request("GET", "/exercises", Some(FACILITATOR), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app
            .oneshot(request("GET", "/healthcheck", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "degraded");
    }
}
