//! Facilitator-facing exercise management: creation with a unique access code, listing,
//! retrieval and top-level patches, all gated on ownership.

use std::time::SystemTime;

use rand::{Rng, rng};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        exercise_store::ExerciseStore,
        models::{ExerciseEntity, ExercisePatch, ExerciseStatus},
        storage::StorageError,
    },
    dto::exercise::{
        CreateExerciseRequest, ExerciseListItem, ExerciseSummary, UpdateExerciseRequest,
    },
    error::ServiceError,
    state::SharedState,
};

/// Uppercase letters and digits without the easily confused `I`, `O`, `0` and `1`.
const ACCESS_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const MAX_ACCESS_CODE_ATTEMPTS: usize = 8;

/// Load an exercise and make sure `user_id` owns it.
pub(crate) async fn load_owned_exercise(
    store: &dyn ExerciseStore,
    exercise_id: Uuid,
    user_id: &str,
) -> Result<ExerciseEntity, ServiceError> {
    let Some(exercise) = store.find_exercise(exercise_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "exercise `{exercise_id}` not found"
        )));
    };

    if exercise.facilitator != user_id {
        return Err(ServiceError::Forbidden(format!(
            "exercise `{exercise_id}` belongs to another facilitator"
        )));
    }

    Ok(exercise)
}

fn generate_access_code(length: usize) -> String {
    let mut rng = rng();
    (0..length)
        .map(|_| ACCESS_CODE_ALPHABET[rng.random_range(0..ACCESS_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Insert `exercise` under a freshly drawn access code, drawing again whenever the store
/// reports the code as taken.
async fn insert_with_unique_code<F>(
    store: &dyn ExerciseStore,
    mut exercise: ExerciseEntity,
    mut draw: F,
) -> Result<ExerciseEntity, ServiceError>
where
    F: FnMut() -> String,
{
    for attempt in 0..MAX_ACCESS_CODE_ATTEMPTS {
        exercise.access_code = draw();
        match store.insert_exercise(exercise.clone()).await {
            Ok(()) => return Ok(exercise),
            Err(StorageError::AccessCodeTaken(code)) => {
                debug!(attempt, access_code = %code, "access code collision; drawing another");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::InvalidState(
        "could not allocate a unique access code".into(),
    ))
}

pub async fn create_exercise(
    state: &SharedState,
    user_id: &str,
    request: CreateExerciseRequest,
) -> Result<ExerciseSummary, ServiceError> {
    let store = state.require_store().await?;
    let config = state.config();

    let now = SystemTime::now();
    let exercise = ExerciseEntity {
        id: Uuid::new_v4(),
        title: request.title.trim().to_string(),
        description: request.description,
        facilitator: user_id.to_string(),
        access_code: String::new(),
        max_participants: request
            .max_participants
            .unwrap_or(config.default_max_participants()),
        settings: request
            .settings
            .map(Into::into)
            .unwrap_or(config.default_settings()),
        status: ExerciseStatus::Draft,
        injects: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let code_length = config.access_code_length();
    let exercise = insert_with_unique_code(store.as_ref(), exercise, || {
        generate_access_code(code_length)
    })
    .await?;
    info!(
        exercise_id = %exercise.id,
        facilitator = %user_id,
        access_code = %exercise.access_code,
        "exercise created"
    );
    Ok(exercise.into())
}

pub async fn list_exercises(
    state: &SharedState,
    user_id: &str,
) -> Result<Vec<ExerciseListItem>, ServiceError> {
    let store = state.require_store().await?;
    let exercises = store.list_exercises(user_id.to_string()).await?;
    Ok(exercises.into_iter().map(ExerciseListItem::from).collect())
}

pub async fn get_exercise(
    state: &SharedState,
    user_id: &str,
    exercise_id: Uuid,
) -> Result<ExerciseSummary, ServiceError> {
    let store = state.require_store().await?;
    let exercise = load_owned_exercise(store.as_ref(), exercise_id, user_id).await?;
    Ok(exercise.into())
}

pub async fn update_exercise(
    state: &SharedState,
    user_id: &str,
    exercise_id: Uuid,
    request: UpdateExerciseRequest,
) -> Result<ExerciseSummary, ServiceError> {
    let store = state.require_store().await?;
    load_owned_exercise(store.as_ref(), exercise_id, user_id).await?;

    if let Some(max_participants) = request.max_participants {
        let joined = store.count_participants(exercise_id).await?;
        if u64::from(max_participants) < joined {
            return Err(ServiceError::InvalidInput(format!(
                "maxParticipants {max_participants} is below the {joined} participants \
                 already joined"
            )));
        }
    }

    let patch = ExercisePatch::from(request);
    let updated = store
        .update_exercise(exercise_id, patch, SystemTime::now())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("exercise `{exercise_id}` not found")))?;

    info!(exercise_id = %exercise_id, status = ?updated.status, "exercise updated");
    Ok(updated.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::ParticipantStatus, dto::exercise::ExerciseSettingsDto,
        services::test_support,
    };

    fn create_request(title: &str) -> CreateExerciseRequest {
        CreateExerciseRequest {
            title: title.into(),
            description: String::new(),
            max_participants: None,
            settings: None,
        }
    }

    #[test]
    fn access_codes_use_the_unambiguous_alphabet() {
        let code = generate_access_code(32);
        assert_eq!(code.len(), 32);
        assert!(code.bytes().all(|c| ACCESS_CODE_ALPHABET.contains(&c)));
    }

    #[tokio::test]
    async fn create_applies_configured_defaults() {
        let state = test_support::memory_state().await;
        let summary = create_exercise(&state, "fac-1", create_request(" Ransomware "))
            .await
            .unwrap();

        assert_eq!(summary.title, "Ransomware");
        assert_eq!(summary.facilitator, "fac-1");
        assert_eq!(summary.status, ExerciseStatus::Draft);
        assert_eq!(summary.access_code.len(), 6);
        assert_eq!(summary.max_participants, 50);
        assert!(summary.settings.scoring_enabled);
        assert!(summary.injects.is_empty());
    }

    #[tokio::test]
    async fn list_only_returns_own_exercises() {
        let state = test_support::memory_state().await;
        create_exercise(&state, "fac-1", create_request("A")).await.unwrap();
        create_exercise(&state, "fac-2", create_request("B")).await.unwrap();

        let listed = list_exercises(&state, "fac-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "A");
    }

    #[tokio::test]
    async fn non_owner_cannot_read_or_update() {
        let state = test_support::memory_state().await;
        let summary = create_exercise(&state, "fac-1", create_request("A")).await.unwrap();

        assert!(matches!(
            get_exercise(&state, "intruder", summary.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            update_exercise(&state, "intruder", summary.id, UpdateExerciseRequest::default())
                .await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            get_exercise(&state, "fac-1", Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_patches_only_given_fields() {
        let state = test_support::memory_state().await;
        let summary = create_exercise(&state, "fac-1", create_request("A")).await.unwrap();

        let updated = update_exercise(
            &state,
            "fac-1",
            summary.id,
            UpdateExerciseRequest {
                status: Some(ExerciseStatus::Active),
                settings: Some(ExerciseSettingsDto {
                    scoring_enabled: false,
                    auto_release: false,
                    show_scores: true,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.title, "A");
        assert_eq!(updated.access_code, summary.access_code);
        assert_eq!(updated.status, ExerciseStatus::Active);
        assert!(!updated.settings.scoring_enabled);
        assert!(updated.settings.show_scores);
    }

    #[tokio::test]
    async fn taken_access_codes_are_drawn_again() {
        let state = test_support::memory_state().await;
        let store = state.require_store().await.unwrap();
        let first = create_exercise(&state, "fac-1", create_request("A")).await.unwrap();
        let mut template = store.find_exercise(first.id).await.unwrap().unwrap();
        template.id = Uuid::new_v4();

        let mut draws = vec![first.access_code.clone(), "FRESH7".to_string()].into_iter();
        let inserted = insert_with_unique_code(store.as_ref(), template.clone(), || {
            draws.next().unwrap()
        })
        .await
        .unwrap();
        assert_eq!(inserted.access_code, "FRESH7");
        assert!(store.find_exercise(template.id).await.unwrap().is_some());

        template.id = Uuid::new_v4();
        let taken = first.access_code.clone();
        let exhausted =
            insert_with_unique_code(store.as_ref(), template, || taken.clone()).await;
        assert!(matches!(exhausted, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn capacity_cannot_drop_below_joined_participants() {
        let state = test_support::memory_state().await;
        let exercise_id = test_support::exercise(&state).await;
        for _ in 0..2 {
            test_support::participant(&state, exercise_id, ParticipantStatus::Active, 0).await;
        }

        let shrink = |max_participants| UpdateExerciseRequest {
            max_participants: Some(max_participants),
            ..Default::default()
        };
        assert!(matches!(
            update_exercise(&state, test_support::FACILITATOR, exercise_id, shrink(1)).await,
            Err(ServiceError::InvalidInput(_))
        ));

        let updated = update_exercise(&state, test_support::FACILITATOR, exercise_id, shrink(2))
            .await
            .unwrap();
        assert_eq!(updated.max_participants, 2);
    }
}
